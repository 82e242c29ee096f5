// Operator CLI: Index Sync
//
// Inspects and maintains the versioned indices and the reindex queue described
// by a JSON configuration file. Rebuilds are only requested here; the host's
// reindex workers perform them against the primary store.

use anyhow::{Context, Result, bail};
use kodegen_tools_indexsync::{IndexSync, ReindexJob, SyncConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: kodegen-indexsync <config.json> <command> [entity-type]

commands:
  versions <entity-type>   list index versions, newest first
  prune <entity-type>      delete every version except the current one
  optimize <entity-type>   merge the current version's segments
  refresh <entity-type>    make pending writes searchable
  drop <entity-type>       delete the index and all of its versions
  rebuild <entity-type>    queue a full rebuild
  queue-len                number of queued reindex jobs";

enum Command {
    Versions(String),
    Prune(String),
    Optimize(String),
    Refresh(String),
    Drop(String),
    Rebuild(String),
    QueueLen,
}

impl Command {
    fn parse(name: &str, entity_type: Option<String>) -> Result<Self> {
        let entity = || entity_type.clone().with_context(|| format!("'{name}' needs an entity type\n\n{USAGE}"));
        Ok(match name {
            "versions" => Self::Versions(entity()?),
            "prune" => Self::Prune(entity()?),
            "optimize" => Self::Optimize(entity()?),
            "refresh" => Self::Refresh(entity()?),
            "drop" => Self::Drop(entity()?),
            "rebuild" => Self::Rebuild(entity()?),
            "queue-len" => Self::QueueLen,
            other => bail!("unknown command '{other}'\n\n{USAGE}"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(command)) = (args.next(), args.next()) else {
        bail!("{USAGE}");
    };
    let command = Command::parse(&command, args.next())?;

    let config = SyncConfig::from_json_file(PathBuf::from(&config_path))
        .with_context(|| format!("loading configuration from {config_path}"))?;
    let sync = IndexSync::open(&config)
        .await
        .context("opening index sync components")?;

    match command {
        Command::Versions(entity_type) => {
            let entity = sync.registry.get(&entity_type)?;
            let versions = sync.versions.list_versions(&entity).await?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }
        Command::Prune(entity_type) => {
            let entity = sync.registry.get(&entity_type)?;
            let report = sync.versions.prune_versions(&entity).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Optimize(entity_type) => {
            sync.search.optimize_index(&entity_type).await?;
            println!("optimized {entity_type}");
        }
        Command::Refresh(entity_type) => {
            sync.search.refresh_index(&entity_type).await?;
            println!("refreshed {entity_type}");
        }
        Command::Drop(entity_type) => {
            let deleted = sync.search.drop_index(&entity_type).await?;
            println!("dropped {entity_type} ({deleted} versions)");
        }
        Command::Rebuild(entity_type) => {
            let entity = sync.registry.get(&entity_type)?;
            sync.queue.enqueue(ReindexJob::rebuild(entity.name())).await?;
            println!("queued rebuild of {entity_type}");
        }
        Command::QueueLen => {
            println!("{}", sync.queue.len().await?);
        }
    }

    Ok(())
}
