// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::Local;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::models::{Transaction, TxKind};
use crate::settings::Language;

/// Byte-order mark so spreadsheet tools detect UTF-8.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static UNSAFE_FILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\\/:*?"<>|]"#).expect("static regex"));

/// Default export file name for a ledger.
pub fn safe_file_name(ledger_name: &str) -> String {
    format!("{}.csv", UNSAFE_FILE_CHARS.replace_all(ledger_name, "_"))
}

fn header(lang: Language) -> [&'static str; 5] {
    match lang {
        Language::Chinese => ["日期", "类型", "分类", "金额", "备注"],
        Language::English => ["Date", "Type", "Category", "Amount", "Note"],
    }
}

fn signed(t: &Transaction) -> String {
    match t.kind {
        TxKind::Expense => format!("-{}", t.amount),
        TxKind::Income => format!("+{}", t.amount),
    }
}

/// Write `transactions` as CSV: BOM, header, then one `\n`-terminated row each.
/// Every field is quoted, with embedded quotes doubled.
pub fn write_transactions<W: Write>(
    mut out: W,
    transactions: &[Transaction],
    lang: Language,
) -> Result<()> {
    out.write_all(UTF8_BOM)?;
    let mut wtr = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .quote_style(QuoteStyle::Always)
        .from_writer(out);
    wtr.write_record(header(lang))?;
    for t in transactions {
        wtr.write_record([
            t.date.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            lang.kind_label(t.kind).to_string(),
            t.category.clone(),
            signed(t),
            t.note.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_to_path(path: &Path, transactions: &[Transaction], lang: Language) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    write_transactions(file, transactions, lang)
}
