//! Keeper CLI: command-line client for the Keeper secrets vault.
//!
//! Talks to the server over HTTP only. Payloads are encrypted here, with a
//! secret that never leaves this machine.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod client;
mod credentials;
mod envelope;
mod payload;

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::client::{Item, KeeperClient};
use crate::credentials::Credentials;
use crate::payload::{ItemKind, PayloadArgs, Prompter};

/// Shortest secret accepted at registration, in bytes.
const MIN_SECRET_LEN: usize = 4;

/// Keeper: a personal secrets vault with client-side encryption.
#[derive(Parser)]
#[command(
    name = "keeper",
    version,
    about = "Keeper CLI: store passwords, notes, cards and files, encrypted before they leave your machine",
    long_about = None,
    after_help = "Environment variables:\n  \
         KEEPER_ADDR         Server address (default: http://127.0.0.1:3200)\n  \
         KEEPER_CREDENTIALS  Credentials file (default: .credentials)\n  \
         KEEPER_TIMEOUT_MS   Per-call deadline in milliseconds\n\n\
         Examples:\n  \
         keeper register --login alice\n  \
         keeper add mail password --user alice@example.com --meta site=mail.example.com\n  \
         keeper get mail"
)]
struct Cli {
    /// Keeper server address.
    #[arg(long, env = "KEEPER_ADDR", default_value = "http://127.0.0.1:3200")]
    addr: String,

    /// Where the token and encryption secret are kept.
    #[arg(long, env = "KEEPER_CREDENTIALS", default_value = ".credentials")]
    credentials: PathBuf,

    /// Per-call deadline in milliseconds.
    #[arg(long, env = "KEEPER_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AccountArgs {
    #[arg(long)]
    login: Option<String>,
    #[arg(long, env = "KEEPER_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Encryption secret. Never sent to the server.
    #[arg(long, env = "KEEPER_SECRET", hide_env_values = true)]
    secret: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and store its credentials locally.
    Register(AccountArgs),
    /// Log in and store fresh credentials locally.
    Login(AccountArgs),
    /// List item names.
    Ls,
    /// Show a decrypted item.
    Get {
        name: String,
        /// Where to write a binary item (default: ./<name>).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Add a new item.
    Add {
        name: String,
        #[arg(value_enum)]
        kind: ItemKind,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// Replace an existing item's payload and metadata.
    Edit {
        name: String,
        #[arg(value_enum)]
        kind: ItemKind,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    /// Delete an item.
    Del { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = KeeperClient::new(&cli.addr, cli.timeout_ms.map(Duration::from_millis));

    match run(&client, &cli.credentials, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: &KeeperClient, creds_path: &Path, command: Commands) -> Result<()> {
    let stdin = io::stdin();
    let terminal = stdin.is_terminal();
    let mut input = stdin.lock();
    let mut prompt_out = io::stderr();
    let mut prompt = Prompter::new(&mut input, &mut prompt_out).on_terminal(terminal);

    match command {
        Commands::Register(args) => {
            let (login, password, secret) = account(&args, &mut prompt)?;
            if secret.len() < MIN_SECRET_LEN {
                bail!("secret: length should be greater or equal {MIN_SECRET_LEN}");
            }
            let token = client.register(&login, &password).await?;
            Credentials { token, secret }.save(creds_path)?;
            println!("Registered as {login}");
        }
        Commands::Login(args) => {
            let (login, password, secret) = account(&args, &mut prompt)?;
            let token = client.login(&login, &password).await?;
            Credentials { token, secret }.save(creds_path)?;
            println!("Logged in as {login}");
        }
        Commands::Ls => {
            let creds = Credentials::load(creds_path)?;
            let names = client.list(&creds.token).await?;
            if names.is_empty() {
                println!("No items");
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Get { name, out } => {
            let creds = Credentials::load(creds_path)?;
            let item = client.get(&creds.token, &creds.secret, &name).await?;
            payload::render(&item, out.as_deref(), &mut io::stdout())?;
        }
        Commands::Add {
            name,
            kind,
            payload,
        } => {
            let creds = Credentials::load(creds_path)?;
            let item = gather(name, kind, &payload, &mut prompt)?;
            client.create(&creds.token, &creds.secret, &item).await?;
            println!("Item '{}' added", item.name);
        }
        Commands::Edit {
            name,
            kind,
            payload,
        } => {
            let creds = Credentials::load(creds_path)?;
            let item = gather(name, kind, &payload, &mut prompt)?;
            client.update(&creds.token, &creds.secret, &item).await?;
            println!("Item '{}' updated", item.name);
        }
        Commands::Del { name } => {
            let creds = Credentials::load(creds_path)?;
            client.delete(&creds.token, &name).await?;
            println!("Item '{name}' deleted");
        }
    }
    Ok(())
}

fn account(args: &AccountArgs, prompt: &mut Prompter<'_>) -> Result<(String, String, String)> {
    Ok((
        prompt.value(args.login.as_deref(), "Login")?,
        prompt.secret(args.password.as_deref(), "Password")?,
        prompt.secret(args.secret.as_deref(), "Secret for encryption")?,
    ))
}

fn gather(
    name: String,
    kind: ItemKind,
    args: &PayloadArgs,
    prompt: &mut Prompter<'_>,
) -> Result<Item> {
    let data = payload::build(kind, args, prompt)?;
    Ok(Item {
        name,
        kind: kind.as_str().to_owned(),
        data,
        metadata: args.meta.clone(),
    })
}
