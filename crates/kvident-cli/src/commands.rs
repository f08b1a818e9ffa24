use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use kvident_kv::FileKvBackend;
use kvident_store::{
    Account, AccountStore, StoreConfig, UserClaimStore, UserLoginStore, UserRoleStore, UserStore,
};

use crate::cli::*;

type Store = AccountStore<FileKvBackend>;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let store = open_store(&cli)?;
    let format = cli.format;
    let result = match cli.command {
        Command::Create(args) => cmd_create(&store, args, format).await,
        Command::Show(args) => cmd_show(&store, args, format).await,
        Command::Rename(args) => cmd_rename(&store, args, format).await,
        Command::Delete(args) => cmd_delete(&store, args).await,
        Command::Login(args) => cmd_login(&store, args, format).await,
        Command::Role(args) => cmd_role(&store, args, format).await,
        Command::Claim(args) => cmd_claim(&store, args, format).await,
        Command::Recover => cmd_recover(&store).await,
    };
    store.dispose()?;
    result
}

fn open_store(cli: &Cli) -> anyhow::Result<Store> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if let Some(namespace) = &cli.namespace {
        config.namespace = namespace.clone();
    }
    let backend = FileKvBackend::open(&cli.data)
        .with_context(|| format!("opening {}", cli.data.display()))?;
    tracing::debug!(data = %cli.data.display(), namespace = %config.namespace, "store opened");
    Ok(AccountStore::with_config(Arc::new(backend), config))
}

async fn load(store: &Store, id: &str) -> anyhow::Result<Account> {
    match store.find_by_id(id).await? {
        Some(account) => Ok(account),
        None => bail!("no account with id {id}"),
    }
}

fn print_account(account: &Account, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(account)?),
        OutputFormat::Text => {
            println!(
                "{} {}",
                account.username.bold(),
                format!("(id {})", account.id).dimmed()
            );
            let password = if account.password_hash.is_some() {
                "set".green()
            } else {
                "none".yellow()
            };
            println!("  Password: {password}");
            if let Some(stamp) = &account.security_stamp {
                println!("  Stamp: {}", stamp.cyan());
            }
            for login in &account.logins {
                println!("  Login: {}:{}", login.provider.blue(), login.provider_key);
            }
            for claim in &account.claims {
                println!("  Claim: {} = {}", claim.claim_type.blue(), claim.value);
            }
            if !account.roles.is_empty() {
                println!("  Roles: {}", account.roles.join(", ").yellow());
            }
        }
    }
    Ok(())
}

async fn cmd_create(store: &Store, args: CreateArgs, format: OutputFormat) -> anyhow::Result<()> {
    if let Some(existing) = store.find_by_username(&args.username).await? {
        bail!("username {} is taken by id {}", args.username, existing.id);
    }
    let mut account = Account::new(args.username);
    account.password_hash = args.password_hash;
    account.security_stamp = args.stamp;
    for login in args.logins {
        store.add_login(&mut account, login).await?;
    }
    for role in &args.roles {
        store.add_to_role(&mut account, role).await?;
    }
    for claim in args.claims {
        store.add_claim(&mut account, claim).await?;
    }
    let account = store.create(account).await?;
    println!(
        "{} Created account {} (id {})",
        "✓".green().bold(),
        account.username.bold(),
        account.id
    );
    print_account(&account, format)
}

async fn cmd_show(store: &Store, args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let found = if let Some(id) = &args.id {
        store.find_by_id(id).await?
    } else if let Some(username) = &args.username {
        store.find_by_username(username).await?
    } else if let Some(login) = &args.login {
        store.find_by_login(login).await?
    } else {
        bail!("one of --id, --username or --login is required");
    };
    match found {
        Some(account) => print_account(&account, format),
        None => {
            println!("{}", "No matching account.".yellow());
            Ok(())
        }
    }
}

async fn cmd_rename(store: &Store, args: RenameArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut account = load(store, &args.id).await?;
    if let Some(existing) = store.find_by_username(&args.username).await? {
        if existing.id != account.id {
            bail!("username {} is taken by id {}", args.username, existing.id);
        }
    }
    let old = std::mem::replace(&mut account.username, args.username);
    let account = store.update(account).await?;
    println!(
        "{} Renamed {} → {}",
        "✓".green().bold(),
        old.yellow(),
        account.username.yellow().bold()
    );
    print_account(&account, format)
}

async fn cmd_delete(store: &Store, args: DeleteArgs) -> anyhow::Result<()> {
    let account = load(store, &args.id).await?;
    store.delete(&account).await?;
    println!(
        "{} Deleted account {} (id {})",
        "✓".green().bold(),
        account.username.bold(),
        account.id
    );
    Ok(())
}

async fn cmd_login(store: &Store, args: LoginArgs, format: OutputFormat) -> anyhow::Result<()> {
    let account = match args.action {
        LoginAction::Add { id, login } => {
            let mut account = load(store, &id).await?;
            store.add_login(&mut account, login).await?;
            account
        }
        LoginAction::Remove { id, login } => {
            let mut account = load(store, &id).await?;
            // Dropped from the index when update() removes the stored record.
            store.remove_login(&mut account, &login).await?;
            account
        }
    };
    let account = store.update(account).await?;
    print_account(&account, format)
}

async fn cmd_role(store: &Store, args: RoleArgs, format: OutputFormat) -> anyhow::Result<()> {
    let account = match args.action {
        RoleAction::Add { id, role } => {
            let mut account = load(store, &id).await?;
            store.add_to_role(&mut account, &role).await?;
            account
        }
        RoleAction::Remove { id, role } => {
            let mut account = load(store, &id).await?;
            store.remove_from_role(&mut account, &role).await?;
            account
        }
    };
    let account = store.update(account).await?;
    print_account(&account, format)
}

async fn cmd_claim(store: &Store, args: ClaimArgs, format: OutputFormat) -> anyhow::Result<()> {
    let account = match args.action {
        ClaimAction::Add { id, claim } => {
            let mut account = load(store, &id).await?;
            store.add_claim(&mut account, claim).await?;
            account
        }
        ClaimAction::Remove { id, claim } => {
            let mut account = load(store, &id).await?;
            store.remove_claim(&mut account, &claim).await?;
            account
        }
    };
    let account = store.update(account).await?;
    print_account(&account, format)
}

async fn cmd_recover(store: &Store) -> anyhow::Result<()> {
    let recovered = store.recover().await?;
    if recovered == 0 {
        println!("{} Nothing to recover.", "✓".green());
    } else {
        println!("{} Replayed {} unfinished write(s).", "✓".green().bold(), recovered);
    }
    Ok(())
}
