//! chainsync CLI
//!
//! Query, watch and fund Bitcoin addresses through an Electrum server.
//!
//! Configuration comes from `CHAINSYNC_*` environment variables (a `.env`
//! file is loaded if present); see `chainsync config`.

use std::time::Duration;

use chainsync::types::{parse_amount, sats_to_display};
use chainsync::{ChainSync, ConfirmationPolicy, FundingState, SyncConfig, Utxo};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chainsync")]
#[command(about = "Bitcoin address sync over Electrum", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List unspent outputs of an address
    Utxos {
        address: String,
    },

    /// Show confirmed and unconfirmed balance
    Balance {
        address: String,
    },

    /// Print the unspent set on every change until Ctrl-C
    Watch {
        address: String,
    },

    /// Wait until an address holds at least AMOUNT
    Fund {
        address: String,

        /// Target amount (sats, or e.g. 0.001btc)
        amount: String,

        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Only count confirmed outputs
        #[arg(long)]
        confirmed_only: bool,
    },

    /// Print an explorer link for an address or txid
    Link {
        value: String,
    },

    /// Request test coins from the configured faucet
    Faucet {
        address: String,

        /// Amount to request (sats, or e.g. 0.001btc)
        #[arg(short, long)]
        amount: Option<String>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = SyncConfig::from_env()?;
    chainsync::common::init_from_config(&config)?;

    let sync = ChainSync::new(config);
    let result = run(&sync, cli.command).await;
    sync.shutdown().await;
    result
}

async fn run(sync: &ChainSync, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Utxos { address } => {
            let utxos = sync.fetch_utxos(&address).await?;
            print_utxos(&utxos);
        }

        Commands::Balance { address } => {
            let totals = sync.fetch_balance(&address).await?;
            println!("Confirmed:   {}", sats_to_display(totals.confirmed));
            println!("Unconfirmed: {}", sats_to_display(totals.unconfirmed));
            println!("Total:       {}", sats_to_display(totals.total()));
        }

        Commands::Watch { address } => {
            let subscription = sync
                .subscribe_to_address(&address, |utxos| {
                    println!("--- {} ---", chrono::Utc::now().format("%H:%M:%S"));
                    print_utxos(&utxos);
                })
                .await?;

            println!("Watching {} (Ctrl-C to stop)", address);
            tokio::signal::ctrl_c().await?;
            subscription.unsubscribe();
        }

        Commands::Fund {
            address,
            amount,
            timeout_ms,
            confirmed_only,
        } => {
            let required = parse_amount(&amount).ok_or_else(|| format!("invalid amount: {}", amount))?;

            let mut request = sync.funding_request(&address, required);
            if let Some(ms) = timeout_ms {
                request = request.with_timeout(Duration::from_millis(ms));
            }
            if confirmed_only {
                request = request.with_policy(ConfirmationPolicy::ConfirmedOnly);
            }

            println!(
                "Waiting for {} at {} ({}, timeout {} s)",
                sats_to_display(required),
                address,
                request.policy,
                request.timeout.as_secs()
            );

            let outcome = sync
                .watch_funding(request)?
                .finish(|status| {
                    if status.status == FundingState::Monitoring {
                        match &status.error {
                            Some(error) => println!("  monitoring: retrying after error: {}", error),
                            None => println!("  monitoring: {}", sats_to_display(status.total_value)),
                        }
                    }
                })
                .await;

            match outcome {
                Ok(status) => {
                    println!("Funded: {}", sats_to_display(status.total_value));
                    if let Some(txid) = &status.txid {
                        println!("{}", sync.explorer_link(txid));
                    }
                }
                Err(status) => {
                    return Err(format!(
                        "{}: {}",
                        status.status,
                        status.error.unwrap_or_default()
                    )
                    .into());
                }
            }
        }

        Commands::Link { value } => {
            println!("{}", sync.explorer_link(&value));
        }

        Commands::Faucet { address, amount } => {
            let amount = match amount {
                Some(raw) => Some(parse_amount(&raw).ok_or_else(|| format!("invalid amount: {}", raw))?),
                None => None,
            };
            let receipt = sync.request_faucet_funds(&address, amount).await?;
            match (&receipt.txid, &receipt.message) {
                (Some(txid), _) => println!("Faucet sent {}\n{}", txid, sync.explorer_link(txid)),
                (None, Some(message)) => println!("Faucet: {}", message),
                (None, None) => println!("Faucet request accepted"),
            }
        }

        Commands::Config => sync.config().print_summary(),
    }

    Ok(())
}

fn print_utxos(utxos: &[Utxo]) {
    if utxos.is_empty() {
        println!("(no unspent outputs)");
        return;
    }

    for utxo in utxos {
        let height = if utxo.is_confirmed() {
            utxo.height.to_string()
        } else {
            "mempool".to_string()
        };
        println!("{}  {:>20}  {}", utxo.outpoint(), sats_to_display(utxo.value), height);
    }
}
