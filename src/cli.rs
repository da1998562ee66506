// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, crate_version, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .conflicts_with("jsonl")
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print as JSON lines"),
    )
}

pub fn build_cli() -> Command {
    Command::new("budgetpace")
        .version(crate_version!())
        .about("Period ledgers, spend pacing, and AI-assisted spending review")
        .subcommand(Command::new("init").about("Create or migrate the database"))
        .subcommand(
            Command::new("ledger")
                .about("Manage ledgers")
                .subcommand(
                    Command::new("new")
                        .about("Start a new ledger and make it active")
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .default_value("daily")
                                .help("daily|temporary|special"),
                        )
                        .arg(Arg::new("budget").long("budget").required(true))
                        .arg(
                            Arg::new("period")
                                .long("period")
                                .default_value("month")
                                .help("week|month|quarter|year"),
                        )
                        .arg(
                            Arg::new("end")
                                .long("end")
                                .help("Custom end date YYYY-MM-DD (temporary ledgers)"),
                        )
                        .arg(
                            Arg::new("fixed")
                                .long("fixed")
                                .action(ArgAction::Append)
                                .help("Fixed expense LABEL=AMOUNT, repeatable"),
                        ),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List ledgers")
                        .arg(
                            Arg::new("archived")
                                .long("archived")
                                .action(ArgAction::SetTrue)
                                .conflicts_with("open"),
                        )
                        .arg(Arg::new("open").long("open").action(ArgAction::SetTrue)),
                ))
                .subcommand(
                    Command::new("switch")
                        .about("Make a ledger the active one")
                        .arg(
                            Arg::new("id")
                                .required(true)
                                .value_parser(value_parser!(i64)),
                        ),
                )
                .subcommand(json_flags(
                    Command::new("status").about("Budget pace of the active ledger"),
                ))
                .subcommand(Command::new("archive").about("Close ledgers past their end date")),
        )
        .subcommand(
            Command::new("tx")
                .about("Record and list transactions")
                .subcommand(
                    Command::new("add")
                        .about("Add a transaction to the active ledger")
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("category").long("category").required(true))
                        .arg(Arg::new("note").long("note").default_value(""))
                        .arg(
                            Arg::new("income")
                                .long("income")
                                .action(ArgAction::SetTrue)
                                .help("Record income instead of an expense"),
                        ),
                )
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List transactions, newest first")
                        .arg(
                            Arg::new("ledger")
                                .long("ledger")
                                .value_parser(value_parser!(i64))
                                .help("Ledger id (defaults to the active ledger)"),
                        ),
                ))
                .subcommand(
                    Command::new("rm").about("Delete a transaction").arg(
                        Arg::new("id")
                            .required(true)
                            .value_parser(value_parser!(i64)),
                    ),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export the active ledger's transactions as CSV")
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value(".")
                        .help("Output file, or a directory for the default file name"),
                ),
        )
        .subcommand(
            Command::new("analyze")
                .about("Ask the configured completion service to review the active ledger"),
        )
        .subcommand(
            Command::new("config")
                .about("Show or change settings")
                .subcommand(json_flags(Command::new("show")))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("url").long("url"))
                        .arg(Arg::new("key").long("key"))
                        .arg(Arg::new("model").long("model"))
                        .arg(Arg::new("language").long("language").help("zh|en")),
                ),
        )
}
