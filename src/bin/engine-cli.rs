use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};

use http_engine::security::{
    Credentials, PasswordEncoder, Pbkdf2Sha256Encoder, TokenError, TokenSigner,
};

#[derive(Parser)]
#[command(name = "engine-cli")]
#[command(about = "Password and token tooling for the HTTP engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a stored password form for the `users` table
    HashPassword {
        password: String,
        #[arg(long, default_value_t = Pbkdf2Sha256Encoder::DEFAULT_ITERATIONS)]
        iterations: u32,
    },
    /// Check a password against a stored form
    VerifyPassword { password: String, stored: String },
    /// Sign an access token
    IssueToken {
        username: String,
        #[arg(short, long)]
        secret: String,
        /// Role to grant; repeatable
        #[arg(short, long = "role")]
        roles: Vec<String>,
        /// Lifetime in seconds; 0 issues a token without expiry
        #[arg(long, default_value_t = 0)]
        lifetime: u64,
    },
    /// Verify a token and print its payload
    InspectToken {
        token: String,
        #[arg(short, long)]
        secret: String,
    },
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::HashPassword { password, iterations } => {
            println!("{}", Pbkdf2Sha256Encoder::new(iterations).encode(&password));
        }
        Commands::VerifyPassword { password, stored } => {
            if Pbkdf2Sha256Encoder::default().matches(&password, &stored) {
                println!("ok");
            } else {
                eprintln!("password does not match");
                std::process::exit(1);
            }
        }
        Commands::IssueToken {
            username,
            secret,
            roles,
            lifetime,
        } => {
            let mut credentials = Credentials::new(username).with_roles(roles);
            let now = now_secs();
            credentials.iat = Some(now);
            if lifetime > 0 {
                credentials.exp = Some(now + lifetime);
            }
            println!("{}", TokenSigner::new(secret).issue(&credentials)?);
        }
        Commands::InspectToken { token, secret } => {
            let signer = TokenSigner::new(secret);
            let credentials = signer.validate(&token)?;
            println!("{}", serde_json::to_string_pretty(&credentials)?);
            if let Err(e @ TokenError::Expired) = signer.validate_at(&token, now_secs()) {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
