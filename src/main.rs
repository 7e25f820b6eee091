//! Headless wallet CLI
//!
//! Runs the JSON-RPC server or performs one-shot wallet operations.

use clap::{Parser, Subcommand};
use headless_wallet::cli;
use headless_wallet::config::{WalletConfig, DEFAULT_DATA_DIR};
use headless_wallet::wallet::WalletSecrets;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "headless-wallet")]
#[command(version)]
#[command(about = "Headless HD wallet with a JSON-RPC command surface", long_about = None)]
struct Cli {
    /// Data directory for wallets, outputs and the outbox
    #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the JSON-RPC server
    Serve {
        /// Interface to bind (overrides conf.json)
        #[arg(long)]
        interface: Option<String>,

        /// Port to listen on (overrides conf.json)
        #[arg(short, long)]
        port: Option<u16>,

        /// Wallet file to unlock at startup
        #[arg(short, long)]
        wallet_file: Option<PathBuf>,
    },

    /// Generate a new wallet and print its record
    CreateWallet {
        /// Optional BIP39 passphrase
        #[arg(long, default_value = "")]
        passphrase: String,

        /// Also save the record as a wallet file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check an address checksum
    ValidateAddress {
        address: String,
    },

    /// Show the public key and address at a derivation path
    Derive {
        /// Derivation path, e.g. m/44'/0'/0'/0/0
        #[arg(short, long)]
        path: String,

        /// Wallet file holding the mnemonic
        #[arg(short, long, conflicts_with = "phrase")]
        wallet_file: Option<PathBuf>,

        /// Mnemonic phrase given directly
        #[arg(long)]
        phrase: Option<String>,

        /// Passphrase used with --phrase
        #[arg(long, default_value = "")]
        passphrase: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            interface,
            port,
            wallet_file,
        } => {
            let mut config = WalletConfig::load(&cli.data_dir)?;
            if let Some(interface) = interface {
                config.rpc_interface = interface;
            }
            if let Some(port) = port {
                config.rpc_port = port;
            }
            if wallet_file.is_some() {
                config.wallet_file = wallet_file;
            }
            config.validate()?;

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cli::cmd_serve(config))?;
        }

        Commands::CreateWallet { passphrase, output } => {
            cli::cmd_create_wallet(&passphrase, output.as_deref())?;
        }

        Commands::ValidateAddress { address } => {
            cli::cmd_validate_address(&address)?;
        }

        Commands::Derive {
            path,
            wallet_file,
            phrase,
            passphrase,
        } => {
            let wallet = match (wallet_file, phrase) {
                (Some(file), _) => cli::load_wallet_file(&file)?,
                (None, Some(mnemonic_phrase)) => WalletSecrets {
                    mnemonic_phrase,
                    passphrase,
                },
                (None, None) => return Err("derive needs --wallet-file or --phrase".into()),
            };
            cli::cmd_derive(&wallet, &path)?;
        }
    }

    Ok(())
}
