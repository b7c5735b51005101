use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bundle_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub backup_interval: Duration,
    pub backup_retain: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Welding gun inventory and attachment bundles")]
pub struct Args {
    /// Database URL (overrides GUN_INVENTORY_DATABASE_URL)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Directory holding attachment bundles (overrides GUN_INVENTORY_BUNDLE_DIR)
    #[arg(long, global = true)]
    pub bundle_dir: Option<PathBuf>,

    /// Directory for database backups (overrides GUN_INVENTORY_BACKUP_DIR)
    #[arg(long, global = true)]
    pub backup_dir: Option<PathBuf>,

    /// Number of backups to keep (overrides GUN_INVENTORY_BACKUP_RETAIN)
    #[arg(long, global = true)]
    pub backup_retain: Option<usize>,

    /// Account performing the command
    #[arg(long, short, global = true, default_value = "administrator")]
    pub user: String,

    /// Password of the account; omit for passwordless accounts
    #[arg(long, short, global = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema and first-run accounts
    Migrate {
        /// Also insert the sample guns into an empty table
        #[arg(long)]
        with_samples: bool,
    },
    /// List all guns ordered by name
    List,
    /// Search name, type, model and location
    Search { term: String },
    /// Show one gun
    Show { id: i64 },
    /// Status and type totals
    Stats,
    /// Register a gun (admin)
    Add(GunFields),
    /// Replace every field of a gun (admin)
    Update {
        id: i64,
        #[command(flatten)]
        fields: GunFields,
    },
    /// Delete a gun row; its bundles stay on disk (admin)
    Delete { id: i64 },
    /// Attachment bundles
    #[command(subcommand)]
    Bundle(BundleCommand),
    /// Back up the database once, or repeatedly with --every
    Backup {
        /// Seconds between backups (overrides GUN_INVENTORY_BACKUP_INTERVAL when given)
        #[arg(long)]
        every: Option<u64>,
        /// Keep running on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
    /// Accounts
    #[command(subcommand)]
    Users(UserCommand),
    /// Parameter presets per gun type
    #[command(subcommand)]
    Presets(PresetCommand),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GunFields {
    #[arg(long)]
    pub name: String,
    #[arg(long = "type")]
    pub gun_type: Option<String>,
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub serial: Option<String>,
    /// active, maintenance, inactive or scrap
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub location: Option<String>,
    #[arg(long)]
    pub last_maintenance: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum BundleCommand {
    /// Create a bundle from a stored gun
    Create { gun_id: i64 },
    /// Copy a file into a bundle: KIND is 3d, 2d, image, signature or dwg
    Attach {
        bundle: PathBuf,
        kind: String,
        file: PathBuf,
    },
    /// Zip a bundle next to its folder
    Archive { bundle: PathBuf },
    /// List bundles, newest first
    List,
    /// Show the newest bundle with this name
    Show { name: String },
    /// Delete the newest bundle with this name and its archive (admin)
    Delete { name: String },
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// List accounts
    List,
    /// Create an account (admin)
    Add {
        username: String,
        #[arg(long)]
        new_password: Option<String>,
        #[arg(long, default_value = "user")]
        role: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Fill missing full names from usernames
    Backfill,
}

#[derive(Subcommand, Debug)]
pub enum PresetCommand {
    /// List presets ordered by name
    List,
    /// Show one preset
    Show { id: i64 },
    /// Create a preset (admin)
    Add {
        name: String,
        #[arg(long = "type")]
        gun_type: String,
        /// Parameters as a JSON document, `{}` when omitted
        #[arg(long)]
        parameters: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the parsed args.
    pub fn from_env_and_args() -> Result<(Self, Args)> {
        let args = Args::parse();
        let cfg = Self::merge(&args)?;
        Ok((cfg, args))
    }

    /// CLI flags win over environment variables, which win over defaults.
    pub fn merge(args: &Args) -> Result<Self> {
        let env_db = env::var("GUN_INVENTORY_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/welding_gun.db".into());
        let env_bundles =
            env::var("GUN_INVENTORY_BUNDLE_DIR").unwrap_or_else(|_| "./uploaded_guns".into());
        let env_backups =
            env::var("GUN_INVENTORY_BACKUP_DIR").unwrap_or_else(|_| "./backups".into());
        let env_interval: u64 = parse_env("GUN_INVENTORY_BACKUP_INTERVAL", 3600)?;
        let env_retain: usize = parse_env("GUN_INVENTORY_BACKUP_RETAIN", 5)?;

        let every = match &args.command {
            Command::Backup { every, .. } => *every,
            _ => None,
        };

        Ok(Self {
            database_url: args.database_url.clone().unwrap_or(env_db),
            bundle_dir: args.bundle_dir.clone().unwrap_or_else(|| env_bundles.into()),
            backup_dir: args.backup_dir.clone().unwrap_or_else(|| env_backups.into()),
            backup_interval: Duration::from_secs(every.unwrap_or(env_interval).max(1)),
            backup_retain: args.backup_retain.unwrap_or(env_retain).max(1),
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
