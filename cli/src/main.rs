// Copyright (c) 2026 vvcoin contributors. MIT License.
// See LICENSE for details.

//! # vvc
//!
//! Entry point for the `vvc` wallet binary. Parses CLI arguments,
//! initializes logging, and dispatches to the command handlers.
//!
//! - `wallet`: show, create, list, rename, remove, select and update wallets
//! - `send`  : transfer vvc to another account
//! - `debug` : issuance and raw event dumps for development networks

mod cli;
mod commands;
mod display;
mod logging;
mod profile;

use anyhow::Result;
use clap::Parser;

use cli::{Commands, VvcCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VvcCli::parse();
    logging::init(cli.global.log_format, cli.global.verbose)?;

    let ctx = commands::Context::new(&cli.global)?;
    match cli.command {
        Commands::Wallet(args) => commands::wallet(&ctx, args).await,
        Commands::Send(args) => commands::send(&ctx, args).await,
        Commands::Debug { command } => commands::debug(&ctx, command).await,
    }
}
