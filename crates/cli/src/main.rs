//! Command-line host for ringkey group key agreement.
//!
//! This binary provides commands for:
//! - Simulating a full session between N in-process participants
//! - Inspecting the group parameters
//! - Deriving, generating and using AES-128-CTR session keys

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rand::rngs::OsRng;
use tracing::info;

use ringkey_cli::config::modp_group;
use ringkey_cli::{run_simulation, SimulationConfig};
use ringkey_crypto::{derive_session_key, AesCtrCipher, SessionKey, SymmetricCapability};

#[derive(Parser)]
#[command(name = "ringkey")]
#[command(about = "Burmester-Desmedt group key agreement")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a complete key agreement between in-process participants
    Simulate {
        /// JSON file with simulation settings, flags take precedence
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of participants
        #[arg(short = 'n', long)]
        participants: Option<u32>,

        /// Label the session id is derived from
        #[arg(long)]
        label: Option<String>,

        /// Message to encrypt under the agreed key
        #[arg(long)]
        message: Option<String>,

        /// Built-in RFC 3526 group: 2048 or 3072
        #[arg(long)]
        modp_bits: Option<u32>,

        /// Seed for reproducible secrets (testing only)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show group parameters and their fingerprint
    Params {
        /// Built-in RFC 3526 group: 2048 or 3072
        #[arg(long, default_value = "3072")]
        modp_bits: u32,

        /// Also print the modulus
        #[arg(long)]
        show_modulus: bool,
    },

    /// Generate a random session key
    Keygen,

    /// Derive a session key from a hex-encoded shared secret
    DeriveKey {
        /// Shared secret (hex)
        #[arg(long)]
        secret_hex: String,
    },

    /// Encrypt a message under a session key
    Encrypt {
        /// Session key (hex)
        #[arg(long)]
        key_hex: String,

        /// Plaintext message
        #[arg(long)]
        message: String,
    },

    /// Decrypt `nonce || ciphertext` under a session key
    Decrypt {
        /// Session key (hex)
        #[arg(long)]
        key_hex: String,

        /// Nonce and ciphertext (hex)
        #[arg(long)]
        data_hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ringkey=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            participants,
            label,
            message,
            modp_bits,
            seed,
        } => {
            let file = match &config {
                Some(path) => SimulationConfig::load(path)?,
                None => SimulationConfig::default(),
            };
            let flags = SimulationConfig {
                participants,
                label,
                message,
                modp_bits,
                seed,
                ..Default::default()
            };
            let options = file.merge(flags).into_options()?;

            let report = run_simulation(options).await?;

            println!("session:     {}", report.session_id);
            println!("participants: {}", report.participants);
            println!("key id:      {}", report.key_id);
            println!("transcript:  {}", hex::encode(report.transcript_hash));
            println!("ciphertext:  {}", hex::encode(&report.ciphertext));
            println!("recovered:   {}", report.recovered);
            println!("elapsed:     {} ms", report.elapsed_ms);
        }

        Commands::Params {
            modp_bits,
            show_modulus,
        } => {
            let params = modp_group(modp_bits)?;
            println!("modulus bits:  {}", params.modulus_bits());
            println!("element bytes: {}", params.modulus_len());
            println!("generator:     {}", params.generator());
            println!("exponent len:  {} bytes", params.exponent_len());
            println!("fingerprint:   {}", hex::encode(params.fingerprint().0));
            if show_modulus {
                println!("modulus:       {}", params.modulus().to_str_radix(16));
            }
        }

        Commands::Keygen => {
            let key = SessionKey::generate(&mut OsRng)?;
            info!(key_id = %key.key_id(), "Generated session key");
            println!("{}", key.to_hex()?);
        }

        Commands::DeriveKey { secret_hex } => {
            let secret = hex::decode(secret_hex.trim())
                .map_err(|e| anyhow!("Invalid secret hex: {}", e))?;
            let key = derive_session_key(&AesCtrCipher, &secret)?;
            info!(key_id = %key.key_id(), "Derived session key");
            println!("{}", key.to_hex()?);
        }

        Commands::Encrypt { key_hex, message } => {
            let key = SessionKey::from_hex(&key_hex, false)?;
            let data = AesCtrCipher.encrypt(&key, message.as_bytes(), &mut OsRng)?;
            println!("{}", hex::encode(data));
        }

        Commands::Decrypt { key_hex, data_hex } => {
            let key = SessionKey::from_hex(&key_hex, false)?;
            let data = hex::decode(data_hex.trim())
                .map_err(|e| anyhow!("Invalid data hex: {}", e))?;
            let plaintext = AesCtrCipher.decrypt(&key, &data)?;
            println!("{}", String::from_utf8_lossy(&plaintext));
        }
    }

    Ok(())
}
