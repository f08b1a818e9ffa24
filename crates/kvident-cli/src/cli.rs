use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kvident_store::{Claim, Login};

#[derive(Parser)]
#[command(
    name = "kvident",
    about = "kvident: account records over a key-value store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Data file of the key-value store
    #[arg(long, global = true, default_value = "kvident.json")]
    pub data: PathBuf,

    /// Key namespace prefix (overrides the config file)
    #[arg(long, global = true)]
    pub namespace: Option<String>,

    /// TOML config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an account
    Create(CreateArgs),
    /// Look up an account by id, username, or login
    Show(ShowArgs),
    /// Change an account's username, keeping its id
    Rename(RenameArgs),
    /// Delete an account and its login index entries
    Delete(DeleteArgs),
    /// Add or remove external logins
    Login(LoginArgs),
    /// Add or remove roles
    Role(RoleArgs),
    /// Add or remove claims
    Claim(ClaimArgs),
    /// Finish journaled writes left by an interrupted run
    Recover,
}

#[derive(Args)]
pub struct CreateArgs {
    pub username: String,
    #[arg(long)]
    pub password_hash: Option<String>,
    #[arg(long)]
    pub stamp: Option<String>,
    /// External login as provider:key (repeatable)
    #[arg(long = "login", value_parser = parse_login)]
    pub logins: Vec<Login>,
    /// Role name (repeatable)
    #[arg(long = "role")]
    pub roles: Vec<String>,
    /// Claim as type=value (repeatable)
    #[arg(long = "claim", value_parser = parse_claim)]
    pub claims: Vec<Claim>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct ShowArgs {
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub username: Option<String>,
    /// External login as provider:key
    #[arg(long, value_parser = parse_login)]
    pub login: Option<Login>,
}

#[derive(Args)]
pub struct RenameArgs {
    pub id: String,
    pub username: String,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: String,
}

#[derive(Args)]
pub struct LoginArgs {
    #[command(subcommand)]
    pub action: LoginAction,
}

#[derive(Subcommand)]
pub enum LoginAction {
    Add {
        id: String,
        #[arg(value_parser = parse_login)]
        login: Login,
    },
    Remove {
        id: String,
        #[arg(value_parser = parse_login)]
        login: Login,
    },
}

#[derive(Args)]
pub struct RoleArgs {
    #[command(subcommand)]
    pub action: RoleAction,
}

#[derive(Subcommand)]
pub enum RoleAction {
    Add { id: String, role: String },
    Remove { id: String, role: String },
}

#[derive(Args)]
pub struct ClaimArgs {
    #[command(subcommand)]
    pub action: ClaimAction,
}

#[derive(Subcommand)]
pub enum ClaimAction {
    Add {
        id: String,
        #[arg(value_parser = parse_claim)]
        claim: Claim,
    },
    Remove {
        id: String,
        #[arg(value_parser = parse_claim)]
        claim: Claim,
    },
}

/// `provider:key`. The provider may not contain `:`; the key may.
pub fn parse_login(raw: &str) -> Result<Login, String> {
    match raw.split_once(':') {
        Some((provider, key)) if !provider.is_empty() && !key.is_empty() => {
            Ok(Login::new(provider, key))
        }
        _ => Err(format!("expected provider:key, got {raw:?}")),
    }
}

/// `type=value`.
pub fn parse_claim(raw: &str) -> Result<Claim, String> {
    match raw.split_once('=') {
        Some((claim_type, value)) if !claim_type.is_empty() => Ok(Claim::new(claim_type, value)),
        _ => Err(format!("expected type=value, got {raw:?}")),
    }
}
