// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::Result;
use std::sync::Arc;

use crate::analysis::{AnalysisState, Analyzer, HttpCompletionClient, REQUEST_TIMEOUT};
use crate::repository::Repository;
use crate::settings::Settings;

pub fn handle(repo: &Repository) -> Result<()> {
    let analyzer = Analyzer::new(Arc::new(HttpCompletionClient::new()?));
    let settings = Settings::load(repo.store())?;
    println!("{}", run(repo, &analyzer, &settings)?);
    Ok(())
}

/// Analyze the active ledger and wait for the result, rendered for display.
pub fn run(repo: &Repository, analyzer: &Analyzer, settings: &Settings) -> Result<String> {
    if !settings.is_configured() {
        return Ok("Set an API URL and key first: budgetpace config set --url .. --key ..".into());
    }
    let Some(snapshot) = repo.active_snapshot()? else {
        return Ok("No active ledger to analyze.".into());
    };
    if !analyzer.analyze(settings, &snapshot) {
        return Ok("An analysis is already running.".into());
    }
    let text = match analyzer.wait(REQUEST_TIMEOUT * 2) {
        AnalysisState::Resolved(Ok(text)) => text,
        AnalysisState::Resolved(Err(failure)) => failure.message(settings.language),
        AnalysisState::Pending | AnalysisState::Idle => "Analysis is still running.".into(),
    };
    Ok(text)
}
