// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, crate_version};

fn group_arg() -> Arg {
    Arg::new("group")
        .long("group")
        .required(true)
        .help("Account group id")
}

fn order_arg() -> Arg {
    Arg::new("order")
        .long("order")
        .required(true)
        .help("Purchase order id (UUID)")
}

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Print JSON instead of a table")
}

fn amount_arg() -> Arg {
    Arg::new("amount")
        .long("amount")
        .required(true)
        .allow_hyphen_values(true)
        .help("Token amount")
}

pub fn build_cli() -> Command {
    Command::new("tokenledger")
        .about("Append-only token ledger with daily and subscription refills")
        .version(crate_version!())
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Economy config JSON (default: $TOKENLEDGER_CONFIG or platform config dir)"),
        )
        .subcommand(Command::new("init").about("Create the database and schema"))
        .subcommand(
            Command::new("group")
                .about("Manage account groups")
                .subcommand(Command::new("add").arg(group_arg()))
                .subcommand(Command::new("block").arg(group_arg()))
                .subcommand(Command::new("unblock").arg(group_arg()))
                .subcommand(Command::new("delete").arg(group_arg()))
                .subcommand(
                    Command::new("transactions")
                        .about("List a group's ledger rows")
                        .arg(group_arg())
                        .arg(json_flag()),
                ),
        )
        .subcommand(
            Command::new("order")
                .about("Receipt-validated purchase orders")
                .subcommand(
                    Command::new("record")
                        .arg(order_arg())
                        .arg(group_arg())
                        .arg(Arg::new("product").long("product").required(true)),
                )
                .subcommand(Command::new("refund").arg(order_arg())),
        )
        .subcommand(
            Command::new("balance")
                .about("Show one group's balance")
                .arg(group_arg())
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("balances")
                .about("Show balances for several groups")
                .arg(
                    Arg::new("groups")
                        .long("groups")
                        .required(true)
                        .help("Comma-separated group ids"),
                )
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("refill").about("Token refills").subcommand(
                Command::new("daily")
                    .about("Refill daily tokens (all eligible groups unless --group)")
                    .arg(Arg::new("group").long("group"))
                    .arg(
                        Arg::new("force")
                            .long("force")
                            .action(ArgAction::SetTrue)
                            .conflicts_with("group")
                            .help("Ignore the daily cutoff"),
                    )
                    .arg(json_flag()),
            ),
        )
        .subcommand(
            Command::new("subscription")
                .about("Subscription lifecycle")
                .subcommand(
                    Command::new("activate")
                        .arg(order_arg())
                        .arg(Arg::new("product").long("product").required(true))
                        .arg(json_flag()),
                )
                .subcommand(
                    Command::new("renew")
                        .about("Renew due subscriptions (all groups unless --group)")
                        .arg(Arg::new("group").long("group"))
                        .arg(json_flag()),
                )
                .subcommand(Command::new("cancel").arg(group_arg()))
                .subcommand(Command::new("list").arg(group_arg()).arg(json_flag())),
        )
        .subcommand(
            Command::new("grant")
                .about("Credit tokens")
                .subcommand(
                    Command::new("purchase")
                        .arg(group_arg())
                        .arg(amount_arg())
                        .arg(
                            Arg::new("list-price")
                                .long("list-price")
                                .help("Amount before discount (defaults to --amount)"),
                        ),
                )
                .subcommand(
                    Command::new("admin")
                        .about("Signed adjustment; negative amounts debit")
                        .arg(group_arg())
                        .arg(amount_arg()),
                ),
        )
        .subcommand(
            Command::new("consume")
                .about("Spend tokens for feature usage")
                .arg(group_arg())
                .arg(amount_arg()),
        )
        .subcommand(
            Command::new("export").about("Export data").subcommand(
                Command::new("ledger")
                    .about("Write a group's ledger rows as CSV")
                    .arg(group_arg())
                    .arg(Arg::new("out").long("out").required(true)),
            ),
        )
}
