use clap::Parser;
use dotenvy::dotenv;
use pdf_compression_service::config::{TierConfig, TokenTable};
use pdf_compression_service::services::credentials::CredentialResolver;
use pdf_compression_service::services::encryption::EncryptionService;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Produces the stored form of an organization bearer token.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bearer token issued by the callback endpoint
    #[arg(long, env = "BEARER_TOKEN")]
    token: String,

    /// Base64 AES key (16 or 32 bytes). A new 256-bit key is generated when omitted.
    #[arg(long, env = "DECRYPT_KEY")]
    key: Option<String>,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "encrypt_token=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("🔐 Encrypting organization token...");

    let key = match args.key {
        Some(key) => key,
        None => {
            info!("🔑 No key given, generating a new 256-bit key");
            EncryptionService::new_base64_secret_256()
        }
    };

    let stored = match EncryptionService::encrypt(&EncryptionService::encode_base64(&args.token), &key) {
        Ok(stored) => stored,
        Err(e) => {
            error!("❌ Failed to encrypt token: {}", e);
            std::process::exit(1);
        }
    };

    // Resolve it back the way a job will, before handing it out
    let check = CredentialResolver::new(TokenTable {
        dev: TierConfig {
            organization_id: Some("check".to_string()),
            token: Some(stored.clone()),
        },
        ..TokenTable::default()
    })
    .resolve("check", &key)?;

    if check.as_ref().map(|t| t.as_str()) != Some(args.token.as_str()) {
        error!("❌ Round-trip check failed, not printing the token");
        std::process::exit(1);
    }

    info!("✅ Token encrypted. Send the key as the Decrypt-Key header of each job.");
    println!("DECRYPT_KEY={}", key);
    println!("CALLBACK_<TIER>_TOKEN={}", stored);

    Ok(())
}
