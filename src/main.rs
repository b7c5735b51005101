use anyhow::Result;
use gun_inventory::{commands, config, services::Inventory};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // --- Parse config + command ---
    let (cfg, args) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting gun-inventory with config: {:?}", cfg);

    // --- Open database and bundle root ---
    let inventory = Inventory::open(&cfg).await?;

    commands::run(
        &inventory,
        &cfg,
        &args.user,
        args.password.as_deref(),
        args.command,
    )
    .await
}
