use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{bail, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use message_saver_core::{AccountRef, ConnectStatus, Network};

use crate::bridge::MessageSaverBridge;

#[derive(Parser)]
#[command(name = "message-saver")]
#[command(about = "Store and read messages on the Hedera message contract")]
pub struct Cli {
    /// Network to pair on (defaults to HEDERA_NETWORK)
    #[arg(long, global = true)]
    pub network: Option<Network>,

    /// Use this account id instead of pairing a wallet
    #[arg(long, global = true, value_name = "ACCOUNT_ID", conflicts_with = "injected")]
    pub account: Option<String>,

    /// Connect through the EIP-1193 provider instead of HashConnect
    #[arg(long, global = true)]
    pub injected: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the session and print the wallet state
    Status,
    /// Pair with HashPack and wait for the recovery cascade to settle
    Connect,
    /// Store a message on the contract
    Store {
        #[arg(value_name = "CONTENT")]
        content: String,
    },
    /// Print the number of stored messages
    Count,
    /// Print one message by id
    Get {
        #[arg(value_name = "ID")]
        id: u64,
    },
    /// Print the most recent messages
    Recent {
        #[arg(short, long)]
        count: Option<u64>,
    },
    /// Print the message ids stored by an address
    UserMessages {
        #[arg(value_name = "ADDRESS")]
        user: Address,
    },
    /// Print the HBAR balance of an account (defaults to the session account)
    Balance {
        #[arg(value_name = "ACCOUNT_ID")]
        account: Option<String>,
    },
    /// Run a read-only contract function
    Query {
        #[arg(value_name = "FUNCTION")]
        function: String,
        /// Arguments as JSON values; bare words are passed as strings
        #[arg(value_name = "ARGS")]
        args: Vec<String>,
    },
    /// Submit a state-changing contract function
    Execute {
        #[arg(value_name = "FUNCTION")]
        function: String,
        #[arg(value_name = "ARGS")]
        args: Vec<String>,
        #[arg(long)]
        gas: Option<u64>,
    },
}

pub async fn run(cli: Cli, bridge: MessageSaverBridge) -> Result<()> {
    let _subscription = bridge.on_state_change(|state| {
        info!(
            connected = state.connected,
            account = ?state.account_id,
            "wallet state changed"
        );
    });
    bridge.initialize().await?;

    match cli.command {
        Commands::Status => {
            if let Some(operator) = bridge.operator_label() {
                info!(operator, "configured operator account");
            }
            print_json(&bridge.wallet_state())
        }
        Commands::Connect => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            print_json(&bridge.wallet_state())
        }
        Commands::Store { content } => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            let outcome = bridge.store_message(&content).await;
            print_json(&outcome)?;
            if !outcome.success {
                bail!(
                    "store failed: {}",
                    outcome.error.unwrap_or_else(|| "unknown error".to_owned())
                );
            }
            Ok(())
        }
        Commands::Count => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            println!("{}", bridge.message_count().await);
            Ok(())
        }
        Commands::Get { id } => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            match bridge.message(id).await {
                Some(message) => print_json(&message),
                None => bail!("message {id} not found"),
            }
        }
        Commands::Recent { count } => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            print_json(&bridge.recent_messages(count).await)
        }
        Commands::UserMessages { user } => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            let ids = bridge.user_messages(user).await;
            let total = bridge.user_message_count(user).await;
            print_json(&serde_json::json!({ "user": user, "count": total, "ids": ids }))
        }
        Commands::Balance { account } => {
            match bridge.balance(account.map(AccountRef::new)).await {
                Some(balance) => {
                    println!("{balance}");
                    Ok(())
                }
                None => bail!("no account: pass one or set HEDERA_ACCOUNT_ID"),
            }
        }
        Commands::Query { function, args } => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            let result = bridge.query(&function, &parse_args(&args)).await?;
            print_json(&result)
        }
        Commands::Execute {
            function,
            args,
            gas,
        } => {
            open_session(&bridge, &cli.account, cli.injected, cli.network).await?;
            let outcome = bridge.execute(&function, &parse_args(&args), gas).await?;
            print_json(&outcome)
        }
    }
}

async fn open_session(
    bridge: &MessageSaverBridge,
    account: &Option<String>,
    injected: bool,
    network: Option<Network>,
) -> Result<()> {
    if bridge.wallet_state().connected {
        return Ok(());
    }
    if let Some(account) = account {
        bridge.connect_manual(account)?;
        return Ok(());
    }
    if injected {
        if !bridge.restore_injected().await? {
            bridge.connect_injected().await?;
        }
        return Ok(());
    }

    match bridge.connect(network).await? {
        ConnectStatus::AlreadyConnected => {}
        ConnectStatus::AlreadyConnecting(attempt) => {
            warn!(attempt, "another connect attempt is in flight");
        }
        ConnectStatus::Requested(pending) => {
            info!(
                attempt = pending.attempt,
                topic = ?pending.topic,
                "pairing requested, approve it in HashPack"
            );
            bridge.await_pairing(pending).await?;
        }
    }
    Ok(())
}

fn parse_args(raw: &[String]) -> Vec<Value> {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_words_become_strings() {
        let args = parse_args(&["7".to_owned(), "hello".to_owned(), "\"quoted\"".to_owned()]);
        assert_eq!(
            args,
            vec![
                serde_json::json!(7),
                Value::String("hello".to_owned()),
                Value::String("quoted".to_owned()),
            ]
        );
    }

    #[test]
    fn global_flags_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "message-saver",
            "get",
            "3",
            "--account",
            "0.0.4821",
            "--network",
            "mainnet",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Commands::Get { id: 3 }));
        assert_eq!(cli.account.as_deref(), Some("0.0.4821"));
        assert_eq!(cli.network, Some(Network::Mainnet));
    }

    #[test]
    fn account_and_injected_conflict() {
        let parsed =
            Cli::try_parse_from(["message-saver", "count", "--account", "0.0.1", "--injected"]);
        assert!(parsed.is_err());
    }
}
