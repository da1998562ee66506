// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Natural-language review of a ledger through a chat-completion endpoint.
//!
//! [`Analyzer`] holds a single Idle / Pending / Resolved state. A call moves
//! it to Pending, runs the request on a worker thread and always ends in
//! Resolved, carrying either the reply text or a classified failure.

use reqwest::Url;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{LedgerSnapshot, TxKind};
use crate::settings::{Language, Settings};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Domain whose hosts take the credential as a `key` query parameter instead
/// of a bearer header.
const QUERY_KEY_DOMAIN: &str = "googleapis.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// A fully shaped outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCall {
    pub url: Url,
    /// Complete `Authorization` header value, when the endpoint uses one.
    pub authorization: Option<String>,
    pub body: ChatRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {code} {reason}")]
    Status { code: u16, reason: String },
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            }
        } else if e.is_connect() || e.is_request() {
            TransportError::Network(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Sends one completion request and returns the decoded response.
pub trait CompletionClient: Send + Sync + 'static {
    fn complete(&self, call: &CompletionCall) -> Result<ChatResponse, TransportError>;
}

pub struct HttpCompletionClient {
    client: reqwest::blocking::Client,
}

impl HttpCompletionClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(crate::utils::USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, call: &CompletionCall) -> Result<ChatResponse, TransportError> {
        let mut req = self.client.post(call.url.clone()).json(&call.body);
        if let Some(auth) = &call.authorization {
            req = req.header(AUTHORIZATION, auth);
        }
        let resp = req.send()?.error_for_status()?;
        Ok(resp.json::<ChatResponse>()?)
    }
}

/// User-facing failure categories.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisFailure {
    #[error("Request timed out. Check your network connection or try again later.")]
    Timeout,
    #[error("Network error: {0}")]
    Network(String),
    #[error("Authentication failed (401): the API key is invalid or expired.")]
    Unauthorized,
    #[error("Access denied (403): check the API key's permissions.")]
    Forbidden,
    #[error("Endpoint not found (404): check the API URL.")]
    NotFound,
    #[error("Too many requests (429): try again later.")]
    RateLimited,
    #[error("Server error ({0}): the service is temporarily unavailable.")]
    Server(u16),
    #[error("HTTP error ({code}): {reason}")]
    Http { code: u16, reason: String },
    #[error("The service returned no reply.")]
    EmptyReply,
    #[error("Analysis failed: {0}. Check that the API key and URL match.")]
    Other(String),
}

impl AnalysisFailure {
    pub fn message(&self, lang: Language) -> String {
        if lang == Language::English {
            return self.to_string();
        }
        match self {
            AnalysisFailure::Timeout => "请求超时，请检查网络连接或稍后重试。".into(),
            AnalysisFailure::Network(msg) => format!("网络错误: {}", msg),
            AnalysisFailure::Unauthorized => "认证失败 (401): API Key 无效或已过期。".into(),
            AnalysisFailure::Forbidden => "访问被拒绝 (403): 请检查 API Key 权限。".into(),
            AnalysisFailure::NotFound => "接口不存在 (404): 请检查 API URL 是否正确。".into(),
            AnalysisFailure::RateLimited => "请求过于频繁 (429): 请稍后重试。".into(),
            AnalysisFailure::Server(code) => {
                format!("服务器错误 ({}): 服务暂时不可用，请稍后重试。", code)
            }
            AnalysisFailure::Http { code, reason } => format!("HTTP 错误 ({}): {}", code, reason),
            AnalysisFailure::EmptyReply => "未获得AI回复".into(),
            AnalysisFailure::Other(msg) => {
                format!("分析出错: {}\n请检查 API Key 和 URL 是否匹配。", msg)
            }
        }
    }
}

pub fn classify(err: TransportError) -> AnalysisFailure {
    match err {
        TransportError::Timeout => AnalysisFailure::Timeout,
        TransportError::Network(msg) => AnalysisFailure::Network(msg),
        TransportError::Status { code, reason } => match code {
            401 => AnalysisFailure::Unauthorized,
            403 => AnalysisFailure::Forbidden,
            404 => AnalysisFailure::NotFound,
            429 => AnalysisFailure::RateLimited,
            500..=599 => AnalysisFailure::Server(code),
            _ => AnalysisFailure::Http { code, reason },
        },
        TransportError::Other(msg) => AnalysisFailure::Other(msg),
    }
}

/// System and user messages describing the ledger.
pub fn build_prompt(snapshot: &LedgerSnapshot, lang: Language) -> Vec<ChatMessage> {
    let ledger = &snapshot.ledger;
    let lines = snapshot
        .transactions
        .iter()
        .map(|t| match lang {
            Language::Chinese => format!(
                "- {}: ¥{}, 分类: {}, 备注: {}",
                lang.kind_label(t.kind),
                t.amount,
                t.category,
                t.note
            ),
            Language::English => format!(
                "- {}: {}, category: {}, note: {}",
                lang.kind_label(t.kind),
                t.amount,
                t.category,
                t.note
            ),
        })
        .collect::<Vec<_>>()
        .join("\n");
    let (system, user) = match lang {
        Language::Chinese => (
            "你是一个财务理财助手。".to_string(),
            format!(
                "你是一位专业的财务分析师。请分析我本周期的账单：\n账本名称：{}\n周期类型：{}\n总预算：¥{}\n净支出：¥{}\n详细流水如下：\n{}\n请给出简洁的分析结果，直接以纯文本格式回答，不要使用Markdown。",
                ledger.name, ledger.kind, ledger.total_budget, snapshot.net_spent, lines
            ),
        ),
        Language::English => (
            "You are a personal finance assistant.".to_string(),
            format!(
                "You are a professional financial analyst. Please review my spending for this period:\nLedger: {}\nType: {}\nTotal budget: {}\nNet spent: {}\nTransactions:\n{}\nGive a concise analysis as plain text, without Markdown.",
                ledger.name, ledger.kind, ledger.total_budget, snapshot.net_spent, lines
            ),
        ),
    };
    vec![
        ChatMessage {
            role: "system".into(),
            content: system,
        },
        ChatMessage {
            role: "user".into(),
            content: user,
        },
    ]
}

fn uses_query_key(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    host == QUERY_KEY_DOMAIN
        || host
            .strip_suffix(QUERY_KEY_DOMAIN)
            .is_some_and(|sub| sub.ends_with('.'))
}

/// Shape the request for the configured endpoint.
pub fn build_call(
    settings: &Settings,
    messages: Vec<ChatMessage>,
) -> Result<CompletionCall, AnalysisFailure> {
    let mut url = Url::parse(settings.api_url.trim())
        .map_err(|e| AnalysisFailure::Other(format!("invalid API URL: {}", e)))?;
    let key = settings.api_key.trim();
    let authorization = if uses_query_key(&url) {
        url.query_pairs_mut().append_pair("key", key);
        None
    } else {
        Some(format!("Bearer {}", key))
    };
    Ok(CompletionCall {
        url,
        authorization,
        body: ChatRequest {
            model: settings.api_model.trim().to_string(),
            messages,
        },
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AnalysisState {
    #[default]
    Idle,
    Pending,
    Resolved(Result<String, AnalysisFailure>),
}

impl AnalysisState {
    pub fn is_pending(&self) -> bool {
        matches!(self, AnalysisState::Pending)
    }
}

struct Slot {
    state: Mutex<AnalysisState>,
    changed: Condvar,
}

impl Slot {
    fn lock(&self) -> MutexGuard<'_, AnalysisState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn resolve(&self, result: Result<String, AnalysisFailure>) {
        if let Err(failure) = &result {
            warn!(%failure, "analysis failed");
        }
        *self.lock() = AnalysisState::Resolved(result);
        self.changed.notify_all();
    }
}

pub struct Analyzer {
    client: Arc<dyn CompletionClient>,
    slot: Arc<Slot>,
}

impl Analyzer {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            slot: Arc::new(Slot {
                state: Mutex::new(AnalysisState::Idle),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.slot.lock().clone()
    }

    /// Start an analysis of `snapshot`. Returns false, changing nothing, when
    /// the endpoint or key is blank or another analysis is still pending.
    pub fn analyze(&self, settings: &Settings, snapshot: &LedgerSnapshot) -> bool {
        if !settings.is_configured() {
            debug!("analysis skipped: endpoint or key not configured");
            return false;
        }
        {
            let mut state = self.slot.lock();
            if state.is_pending() {
                debug!("analysis skipped: one is already pending");
                return false;
            }
            *state = AnalysisState::Pending;
        }

        let call = match build_call(settings, build_prompt(snapshot, settings.language)) {
            Ok(call) => call,
            Err(failure) => {
                self.slot.resolve(Err(failure));
                return true;
            }
        };
        debug!(
            host = call.url.host_str().unwrap_or_default(),
            model = %call.body.model,
            "sending analysis request"
        );

        let client = Arc::clone(&self.client);
        let slot = Arc::clone(&self.slot);
        std::thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| client.complete(&call)));
            let result = match outcome {
                Ok(Ok(resp)) => resp
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or(AnalysisFailure::EmptyReply),
                Ok(Err(err)) => Err(classify(err)),
                Err(_) => Err(AnalysisFailure::Other("analysis worker panicked".into())),
            };
            slot.resolve(result);
        });
        true
    }

    /// Block until the state leaves Pending or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> AnalysisState {
        let guard = self.slot.lock();
        let (guard, _) = self
            .slot
            .changed
            .wait_timeout_while(guard, timeout, |s| s.is_pending())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Forget a resolved result. Pending analyses are left alone.
    pub fn clear(&self) {
        let mut state = self.slot.lock();
        if !state.is_pending() {
            *state = AnalysisState::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> Settings {
        Settings {
            api_url: url.into(),
            api_key: "secret".into(),
            ..Settings::default()
        }
    }

    #[test]
    fn google_hosts_take_key_in_query() {
        let call = build_call(
            &settings("https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(call.authorization, None);
        assert_eq!(call.url.query(), Some("key=secret"));
    }

    #[test]
    fn existing_query_is_extended() {
        let call = build_call(
            &settings("https://generativelanguage.googleapis.com/v1/chat?alt=json"),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(call.url.query(), Some("alt=json&key=secret"));
    }

    #[test]
    fn lookalike_hosts_use_bearer_header() {
        for url in [
            "https://evilgoogleapis.com/v1/chat",
            "https://googleapis.com.example.net/v1/chat",
        ] {
            let call = build_call(&settings(url), Vec::new()).unwrap();
            assert_eq!(call.authorization.as_deref(), Some("Bearer secret"), "{url}");
            assert_eq!(call.url.query(), None, "{url}");
        }
        let bare = build_call(&settings("https://googleapis.com/v1/chat"), Vec::new()).unwrap();
        assert_eq!(bare.url.query(), Some("key=secret"));
    }

    #[test]
    fn other_hosts_use_bearer_header() {
        let call = build_call(
            &settings("https://api.openai.com/v1/chat/completions"),
            Vec::new(),
        )
        .unwrap();
        assert_eq!(call.authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(call.url.query(), None);
    }

    #[test]
    fn status_codes_map_to_categories() {
        let status = |code| TransportError::Status {
            code,
            reason: "x".into(),
        };
        assert_eq!(classify(status(401)), AnalysisFailure::Unauthorized);
        assert_eq!(classify(status(403)), AnalysisFailure::Forbidden);
        assert_eq!(classify(status(404)), AnalysisFailure::NotFound);
        assert_eq!(classify(status(429)), AnalysisFailure::RateLimited);
        assert_eq!(classify(status(503)), AnalysisFailure::Server(503));
        assert_eq!(
            classify(status(418)),
            AnalysisFailure::Http {
                code: 418,
                reason: "x".into()
            }
        );
        assert_eq!(classify(TransportError::Timeout), AnalysisFailure::Timeout);
    }

    #[test]
    fn unparsable_url_is_a_configuration_failure() {
        let err = build_call(&settings("not a url"), Vec::new()).unwrap_err();
        assert!(matches!(err, AnalysisFailure::Other(_)));
    }
}
