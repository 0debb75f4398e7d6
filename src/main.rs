use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tokenledger::config::load_config;
use tokenledger::storage::SledStorage;
use tokenledger::{Address, Coins, Command, Runtime};

#[derive(Parser)]
#[command(author, version, about = "Free/locked token ledger", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "tokenledger.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Credit the configured genesis balances
    Init,
    /// Mint coins to an address, e.g. `mint <hex> 100coin`
    Mint { address: String, coins: String },
    /// Burn coins from an address's free balance
    Burn { address: String, coins: String },
    /// Move coins from free to locked balance
    Lock { address: String, coins: String },
    /// Move coins from locked back to free balance
    Unlock { address: String, coins: String },
    /// Show the free balance of an address
    Balance { address: String },
    /// Show the locked balance of an address
    Locked { address: String },
    /// Generate a new ed25519 key and print its address
    Keys,
}

fn parse_command(make: fn(Address, Coins) -> Command, address: &str, coins: &str) -> Result<Command, Box<dyn std::error::Error>> {
    Ok(make(address.parse()?, coins.parse()?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)))
        .init();

    if let Commands::Keys = cli.command {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&secret);
        println!("address: {}", Address::from_public_key(&signing_key.verifying_key()));
        println!("secret:  {}", hex::encode(secret));
        return Ok(());
    }

    let runtime = Runtime::new(SledStorage::new(&config.storage.path)?);

    let command = match &cli.command {
        Commands::Init => {
            runtime.apply_genesis(&config.genesis_accounts()?)?;
            println!("Genesis applied ({} accounts).", config.genesis.len());
            None
        }
        Commands::Mint { address, coins } => Some(parse_command(Command::mint, address, coins)?),
        Commands::Burn { address, coins } => Some(parse_command(Command::burn, address, coins)?),
        Commands::Lock { address, coins } => Some(parse_command(Command::lock, address, coins)?),
        Commands::Unlock { address, coins } => Some(parse_command(Command::unlock, address, coins)?),
        Commands::Balance { address } => {
            println!("{}", runtime.balance(address)?);
            None
        }
        Commands::Locked { address } => {
            println!("{}", runtime.locked(address)?);
            None
        }
        Commands::Keys => None,
    };

    if let Some(command) = command {
        let result = runtime.deliver(&command)?;
        println!("{} {} for {}", result.kind, result.amount, result.owner);
    }

    runtime.storage().flush()?;
    Ok(())
}
