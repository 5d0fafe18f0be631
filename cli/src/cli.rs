//! # CLI Interface
//!
//! Defines the command-line argument structure for `vvc` using `clap`
//! derive. Three command groups: `wallet`, `send` and `debug`.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// vvcoin, the virtual-virtual coin.
///
/// A wallet for a toy currency whose ledger lives on Nostr relays. Balances
/// are reconciled from signed events; there is no server to trust or to
/// break.
#[derive(Parser, Debug)]
#[command(
    name = "vvc",
    about = "vvcoin is a virtual-virtual coin wallet",
    version,
    propagate_version = true
)]
pub struct VvcCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Path to the profile file.
    ///
    /// Defaults to `<data dir>/vvcoin/config.json`.
    #[arg(long, global = true, env = "VVC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Relay URL to use instead of the profile's list. Repeatable, or comma
    /// separated in the environment variable.
    #[arg(long = "relay", global = true, env = "VVC_RELAYS", value_delimiter = ',')]
    pub relays: Vec<String>,

    /// Per-relay request timeout in seconds.
    #[arg(long, global = true, env = "VVC_TIMEOUT_SECS", default_value_t = 15)]
    pub timeout_secs: u64,

    /// Log format on stderr.
    #[arg(long, global = true, env = "VVC_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// More diagnostics on stderr. Repeat for more detail.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show or manage wallets.
    Wallet(WalletArgs),
    /// Send vvc to another account.
    Send(SendArgs),
    /// Development helpers. Do not use.
    Debug {
        #[command(subcommand)]
        command: DebugCommands,
    },
}

/// Arguments for `wallet`. Without a subcommand, shows one wallet.
#[derive(Args, Debug)]
pub struct WalletArgs {
    /// Wallet name. Defaults to the default wallet.
    #[arg(short, long)]
    pub wallet: Option<String>,

    /// Print the secret key instead of a mask.
    #[arg(short = 's', long)]
    pub show_secret: bool,

    /// Reconcile incoming transfers before showing the balance.
    #[arg(short = 'u', long)]
    pub update: bool,

    #[command(subcommand)]
    pub command: Option<WalletCommands>,
}

#[derive(Subcommand, Debug)]
pub enum WalletCommands {
    /// Generate a new wallet. The first one becomes the default.
    Create {
        name: String,
        /// Print the secret key instead of a mask.
        #[arg(short = 's', long)]
        show_secret: bool,
    },
    /// List wallet names.
    List,
    /// Rename a wallet.
    Config {
        wallet: String,
        /// New name.
        #[arg(short = 'n', long = "name")]
        new_name: String,
    },
    /// Delete a wallet from the profile.
    Remove { wallet: String },
    /// Make a wallet the default.
    Set { wallet: String },
    /// Reconcile incoming transfers.
    Update {
        /// Wallet name. Defaults to the default wallet.
        #[arg(short, long)]
        wallet: Option<String>,
        /// Reconcile every wallet in the profile.
        #[arg(short, long, conflicts_with = "wallet")]
        all: bool,
    },
}

/// Arguments for `send`.
#[derive(Args, Debug)]
pub struct SendArgs {
    /// Recipient public key, `npub1...` or hex.
    pub target: String,

    /// Amount in vvc.
    pub amount: u64,

    /// Wallet to send from. Defaults to the default wallet.
    #[arg(short, long)]
    pub wallet: Option<String>,

    /// Note attached to the transfer. Public.
    #[arg(short, long)]
    pub memo: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum DebugCommands {
    /// Overwrite a wallet's balance.
    Cheat {
        amount: u64,
        #[arg(short, long)]
        wallet: Option<String>,
    },
    /// Dump vvcoin events the relays know about as JSON.
    Events(EventsArgs),
}

/// Narrowing for `debug events`. With no options, everything is dumped.
#[derive(Args, Debug, Default)]
pub struct EventsArgs {
    /// Only events signed by this account (`npub1...` or hex).
    #[arg(long)]
    pub author: Option<String>,

    /// Only events tagged with this account.
    #[arg(long = "to")]
    pub addressed_to: Option<String>,

    /// Only checkpoints absorbing this transfer id.
    #[arg(long)]
    pub referencing: Option<String>,

    /// Only events created at or after this unix time.
    #[arg(long)]
    pub since: Option<u64>,

    /// Only events created at or before this unix time.
    #[arg(long)]
    pub until: Option<u64>,

    /// At most this many events per relay, newest first.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VvcCli::command().debug_assert();
    }

    #[test]
    fn parses_send_with_memo() {
        let cli = VvcCli::parse_from(["vvc", "send", "npub1xyz", "30", "-m", "rent", "-w", "main"]);
        match cli.command {
            Commands::Send(args) => {
                assert_eq!(args.target, "npub1xyz");
                assert_eq!(args.amount, 30);
                assert_eq!(args.memo.as_deref(), Some("rent"));
                assert_eq!(args.wallet.as_deref(), Some("main"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn relay_override_is_repeatable() {
        let cli = VvcCli::parse_from([
            "vvc",
            "--relay",
            "wss://a.example",
            "--relay",
            "wss://b.example",
            "wallet",
            "list",
        ]);
        assert_eq!(cli.global.relays, vec!["wss://a.example", "wss://b.example"]);
    }

    #[test]
    fn global_logging_flags() {
        let cli = VvcCli::parse_from(["vvc", "wallet", "list", "-vv", "--log-format", "json"]);
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.log_format, LogFormat::Json);

        let quiet = VvcCli::parse_from(["vvc", "wallet", "list"]);
        assert_eq!(quiet.global.verbose, 0);
        assert_eq!(quiet.global.log_format, LogFormat::Text);
    }

    #[test]
    fn events_filters() {
        let cli = VvcCli::parse_from([
            "vvc", "debug", "events", "--referencing", "abcd", "--since", "10", "--until", "20",
        ]);
        match cli.command {
            Commands::Debug {
                command: DebugCommands::Events(args),
            } => {
                assert_eq!(args.referencing.as_deref(), Some("abcd"));
                assert_eq!(args.since, Some(10));
                assert_eq!(args.until, Some(20));
                assert_eq!(args.author, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn update_all_conflicts_with_wallet() {
        assert!(VvcCli::try_parse_from(["vvc", "wallet", "update", "-a", "-w", "x"]).is_err());
    }
}
