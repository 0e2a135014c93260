//! Keyward CLI Client
//!
//! Command-line interface for managing keyfiles on a Keyward server.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keyward::protocol::{AuthError, Response, SessionType};
use keyward::{Client, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Keyward CLI
#[derive(Parser, Debug)]
#[command(name = "keyward-cli")]
#[command(about = "CLI for the Keyward keyfile server")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9999")]
    server: String,

    /// Open a boot session (only `get` is allowed)
    #[arg(long)]
    boot: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch the keyfile stored under a key
    Get {
        key: String,
    },

    /// Store a keyfile under a new key
    Create {
        key: String,
        keyfile: String,
    },

    /// Replace the keyfile stored under a key
    ChangeKeyfile {
        key: String,
        keyfile: String,
    },

    /// Move a keyfile to a new key
    ChangeKey {
        old_key: String,
        new_key: String,
    },

    /// Move a keyfile to a new key and replace its contents
    Replace {
        old_key: String,
        new_key: String,
        keyfile: String,
    },

    /// Delete a keyfile
    Delete {
        key: String,
    },

    /// Check whether a key exists
    Exists {
        key: String,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Returns whether the server reported success
fn run(args: &Args) -> Result<bool> {
    let client = Client::connect(&args.server)?;
    let session_type = if args.boot { SessionType::Boot } else { SessionType::Auth };
    client.start(session_type)?;

    let ok = match &args.command {
        Commands::Get { key } => {
            let resp = client.get_keyfile(key.as_bytes())?;
            if resp.is_ok() {
                println!("{}", String::from_utf8_lossy(resp.result.as_bytes()));
            }
            report(&resp)
        }
        Commands::Create { key, keyfile } => {
            report(&client.create_keyfile(key.as_bytes(), keyfile.as_bytes())?)
        }
        Commands::ChangeKeyfile { key, keyfile } => {
            report(&client.change_keyfile(key.as_bytes(), keyfile.as_bytes())?)
        }
        Commands::ChangeKey { old_key, new_key } => {
            report(&client.change_key(old_key.as_bytes(), new_key.as_bytes())?)
        }
        Commands::Replace { old_key, new_key, keyfile } => report(&client.replace_keyfile(
            old_key.as_bytes(),
            new_key.as_bytes(),
            keyfile.as_bytes(),
        )?),
        Commands::Delete { key } => report(&client.delete_keyfile(key.as_bytes())?),
        Commands::Exists { key } => {
            let exists = client.key_exists(key.as_bytes())?;
            println!("{}", if exists { "yes" } else { "no" });
            exists
        }
    };

    client.finish()?;
    Ok(ok)
}

fn report(resp: &Response) -> bool {
    match resp.error {
        AuthError::Nil => true,
        other => {
            eprintln!("server: {:?}", other);
            false
        }
    }
}
