//! Command dispatch for the `gun-inventory` binary.
//!
//! Each command authenticates the caller first, checks the admin gate for
//! writes, delegates to the services and prints JSON on stdout.

use crate::{
    config::{AppConfig, BundleCommand, Command, GunFields, PresetCommand, UserCommand},
    db,
    errors::InventoryError,
    models::{
        gun::{GunDraft, GunStatus},
        manifest::{AttachmentKind, GunSnapshot},
        preset::PresetDraft,
        user::{NewUser, Role, User},
    },
    services::{Inventory, user_service::require_admin},
};
use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::json;

/// Run one parsed command against an opened inventory.
pub async fn run(
    inventory: &Inventory,
    cfg: &AppConfig,
    user: &str,
    password: Option<&str>,
    command: Command,
) -> Result<()> {
    if let Command::Migrate { with_samples } = command {
        db::seed_defaults(&inventory.guns.db, with_samples).await?;
        return print(&json!({ "migrated": true, "samples": with_samples }));
    }

    let actor = login(inventory, user, password).await?;

    match command {
        Command::Migrate { .. } => Ok(()),
        Command::List => print(&inventory.guns.list().await?),
        Command::Search { term } => print(&inventory.guns.search(&term).await?),
        Command::Show { id } => {
            let gun = inventory
                .guns
                .get(id)
                .await?
                .ok_or(InventoryError::GunNotFound(id))?;
            print(&gun)
        }
        Command::Stats => print(&inventory.guns.statistics().await?),
        Command::Add(fields) => {
            require_admin(&actor, "add guns")?;
            let mut draft = draft_from(fields)?;
            draft.created_by = Some(actor.username.clone());
            print(&inventory.guns.create(draft).await?)
        }
        Command::Update { id, fields } => {
            require_admin(&actor, "edit guns")?;
            print(&inventory.guns.update(id, draft_from(fields)?).await?)
        }
        Command::Delete { id } => {
            require_admin(&actor, "delete guns")?;
            inventory.guns.delete(id).await?;
            print(&json!({ "deleted": id }))
        }
        Command::Bundle(cmd) => bundle(inventory, &actor, cmd).await,
        Command::Backup { watch, .. } => {
            require_admin(&actor, "back up the database")?;
            let path = inventory.backups.backup_now().await?;
            print(&json!({ "backup": path }))?;
            if watch {
                let handle = inventory.backups.clone().spawn_periodic(cfg.backup_interval);
                tracing::info!(every = ?cfg.backup_interval, "automatic backups running; Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                handle.abort();
            }
            Ok(())
        }
        Command::Users(cmd) => users(inventory, &actor, cmd).await,
        Command::Presets(cmd) => presets(inventory, &actor, cmd).await,
    }
}

async fn login(inventory: &Inventory, user: &str, password: Option<&str>) -> Result<User> {
    inventory
        .users
        .authenticate(user, password)
        .await?
        .ok_or_else(|| anyhow!("login failed for `{user}`"))
}

async fn bundle(inventory: &Inventory, actor: &User, cmd: BundleCommand) -> Result<()> {
    match cmd {
        BundleCommand::Create { gun_id } => {
            let gun = inventory
                .guns
                .get(gun_id)
                .await?
                .ok_or(InventoryError::GunNotFound(gun_id))?;
            let path = inventory.bundler.create_bundle(&GunSnapshot::from(&gun)).await?;
            print(&json!({ "bundle": path }))
        }
        BundleCommand::Attach { bundle, kind, file } => {
            let kind: AttachmentKind = kind.parse()?;
            let saved = inventory.bundler.attach_file(&bundle, &file, kind).await?;
            print(&json!({ "saved": saved }))
        }
        BundleCommand::Archive { bundle } => {
            let archive = inventory.bundler.archive_bundle(&bundle).await?;
            print(&json!({ "archive": archive }))
        }
        BundleCommand::List => print(&inventory.catalog.list_all().await?),
        BundleCommand::Show { name } => {
            let summary = inventory
                .catalog
                .get_by_name(&name)
                .await?
                .ok_or(InventoryError::BundleNotFound(name))?;
            print(&summary)
        }
        BundleCommand::Delete { name } => {
            require_admin(actor, "delete bundles")?;
            let removed = inventory.catalog.delete(&name).await?;
            print(&json!({ "deleted": removed.folder_path }))
        }
    }
}

async fn users(inventory: &Inventory, actor: &User, cmd: UserCommand) -> Result<()> {
    match cmd {
        UserCommand::List => print(&inventory.users.list().await?),
        UserCommand::Add {
            username,
            new_password,
            role,
            full_name,
            email,
        } => {
            let user = NewUser::new(username, new_password, role.parse::<Role>()?, full_name, email)?;
            print(&inventory.users.create(actor, user).await?)
        }
        UserCommand::Backfill => {
            require_admin(actor, "edit users")?;
            let touched = inventory.users.backfill_full_names().await?;
            print(&json!({ "updated": touched }))
        }
    }
}

async fn presets(inventory: &Inventory, actor: &User, cmd: PresetCommand) -> Result<()> {
    match cmd {
        PresetCommand::List => print(&inventory.presets.list().await?),
        PresetCommand::Show { id } => {
            let preset = inventory
                .presets
                .get(id)
                .await?
                .ok_or(InventoryError::PresetNotFound(id))?;
            print(&preset)
        }
        PresetCommand::Add {
            name,
            gun_type,
            parameters,
            description,
        } => {
            require_admin(actor, "add presets")?;
            let parameters = parameters
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()?;
            let draft = PresetDraft {
                parameters,
                description,
                ..PresetDraft::new(name, gun_type)
            };
            print(&inventory.presets.create(draft).await?)
        }
    }
}

fn draft_from(fields: GunFields) -> Result<GunDraft> {
    let status = fields.status.as_deref().map(str::parse::<GunStatus>).transpose()?;
    Ok(GunDraft {
        name: Some(fields.name),
        gun_type: fields.gun_type,
        model: fields.model,
        serial_number: fields.serial,
        status,
        location: fields.location,
        last_maintenance: fields.last_maintenance,
        notes: fields.notes,
        created_at: None,
        created_by: None,
    })
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
