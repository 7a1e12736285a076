#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::pedantic
)]
#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use permkeeper::{
    service::{GroupId, Operation, TemplateId, UserId},
    tokio, tracing,
};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

mod commands;
mod config;

pub(crate) use config::CONFIG_BIN;
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate the database
    Migrate {},
    /// Replace the grants of entities with the grants of a permission template
    ApplyTemplate {
        #[clap(long, help = "Id of the permission template to apply.")]
        template_id: TemplateId,
        #[clap(long, help = "JSON file containing an array of entities.")]
        entities: PathBuf,
    },
    /// Apply the template governing a newly created entity
    ApplyDefaultTemplate {
        #[clap(long, help = "JSON file describing the entity.")]
        entity: PathBuf,
        #[clap(long, help = "User that created the entity.")]
        creator: Option<UserId>,
    },
    /// Grant or revoke a single permission
    Change {
        #[clap(long, help = "`grant` or `revoke`.")]
        operation: Operation,
        #[clap(long)]
        permission: String,
        #[clap(long, conflicts_with_all = ["group", "anyone"])]
        user: Option<UserId>,
        #[clap(long, conflicts_with = "anyone")]
        group: Option<GroupId>,
        #[clap(long, default_value = "false", help = "Change the permission of the Anyone group.")]
        anyone: bool,
        #[clap(long, help = "JSON file describing the entity. Omit for global permissions.")]
        entity: Option<PathBuf>,
    },
    /// Print the version
    Version {},
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_file(CONFIG_BIN.debug.extended_logs)
        .with_line_number(CONFIG_BIN.debug.extended_logs)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    match cli.command {
        Commands::Migrate {} => {
            tracing::info!("permkeeper version {VERSION}");
            commands::migrate().await?;
        }
        Commands::ApplyTemplate {
            template_id,
            entities,
        } => commands::apply_template(template_id, &entities).await?,
        Commands::ApplyDefaultTemplate { entity, creator } => {
            commands::apply_default_template(&entity, creator).await?;
        }
        Commands::Change {
            operation,
            permission,
            user,
            group,
            anyone,
            entity,
        } => {
            let grantee = commands::grantee_from_args(user, group, anyone)?;
            commands::change(operation, permission, grantee, entity.as_deref()).await?;
        }
        Commands::Version {} => {
            println!("{VERSION}");
        }
    }

    Ok(())
}
