// src/main.rs
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dedupe_lib::clustering::create_clusters::run_duplicate_detection;
use dedupe_lib::matching::single_target::inspect_record;
use dedupe_lib::matching::similarity::Algorithm;
use dedupe_lib::merging::resolver::MergeResolver;
use dedupe_lib::models::requests::{BatchMergeRequest, MergeOperation};
use dedupe_lib::storage::{CatalogStore, InMemoryCatalog, PgCatalog};
use dedupe_lib::utils::db_connect::{connect, get_pool_status};
use dedupe_lib::utils::dedupe_config::DedupeConfig;
use dedupe_lib::utils::env::{load_env, load_env_from_file};
use dedupe_lib::utils::progress_config::ProgressConfig;
use dedupe_lib::RecordId;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Work against a JSON catalog snapshot instead of PostgreSQL
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Write the snapshot back after a successful write command
    #[arg(long, global = true, requires = "snapshot")]
    write_back: bool,

    /// Extra env file loaded before the environment is read
    #[arg(long, global = true)]
    env_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cluster likely duplicates across the candidate pool
    Batch {
        /// Restrict the pass to one area slug
        #[arg(long)]
        area: Option<String>,
        #[arg(long)]
        min_similarity: Option<i32>,
        #[arg(long)]
        grade_tolerance: Option<i32>,
        /// ratio or token_sort
        #[arg(long)]
        algorithm: Option<String>,
        /// Compare across sites instead of within each site
        #[arg(long)]
        no_group_by_site: bool,
    },
    /// List likely duplicates of one record
    Find {
        record_id: RecordId,
        #[arg(long)]
        min_similarity: Option<i32>,
        #[arg(long)]
        grade_tolerance: Option<i32>,
        #[arg(long)]
        algorithm: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Mark records as duplicates of a target
    Merge {
        #[arg(long)]
        target: RecordId,
        #[arg(long, value_delimiter = ',', required = true)]
        duplicates: Vec<RecordId>,
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<RecordId>,
    },
    /// Apply a JSON file of merge operations ({"merges": [...]})
    MergeBatch { file: PathBuf },
    /// Make records independent again
    Unmark {
        #[arg(required = true)]
        record_ids: Vec<RecordId>,
    },
    /// Move ascents from one record to another
    MoveAscents {
        #[arg(long)]
        source: RecordId,
        #[arg(long)]
        destination: RecordId,
    },
    /// Move the ascents of every duplicate onto its main record
    MoveAscentsAll,
}

impl Command {
    fn writes(&self) -> bool {
        !matches!(self, Command::Batch { .. } | Command::Find { .. })
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    load_env();
    if let Some(path) = &cli.env_file {
        load_env_from_file(path);
    }

    let config = DedupeConfig::from_env();
    config.log_config();
    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    let snapshot_store = match &cli.snapshot {
        Some(path) => Some(Arc::new(
            InMemoryCatalog::load_json(path)
                .await
                .context("Failed to load catalog snapshot")?,
        )),
        None => None,
    };
    let store: Arc<dyn CatalogStore> = match &snapshot_store {
        Some(snapshot) => snapshot.clone() as Arc<dyn CatalogStore>,
        None => {
            let pool = connect().await.context("Failed to connect to database")?;
            let (total, idle, in_use) = get_pool_status(&pool);
            info!(
                "Database pool ready: {} connections ({} idle, {} in use)",
                total, idle, in_use
            );
            Arc::new(PgCatalog::new(pool))
        }
    };

    let start = Instant::now();
    let writes = cli.command.writes();
    let mut batch_outcome = Ok(());
    match cli.command {
        Command::Batch {
            area,
            min_similarity,
            grade_tolerance,
            algorithm,
            no_group_by_site,
        } => {
            let mut params = config.batch.clone();
            params.area_slug = area;
            if let Some(v) = min_similarity {
                params.min_similarity = v;
            }
            if let Some(v) = grade_tolerance {
                params.grade_tolerance = v;
            }
            if let Some(name) = algorithm {
                params.algorithm = Algorithm::from(name);
            }
            if no_group_by_site {
                params.group_by_site = false;
            }
            let multi_progress = progress_config.create_multi_progress();
            let partition_progress = progress_config.partition_progress(multi_progress.as_ref());
            let response = run_duplicate_detection(
                store.as_ref(),
                &params,
                &config,
                multi_progress,
                partition_progress,
            )
            .await?;
            print_json(&response)?;
        }
        Command::Find {
            record_id,
            min_similarity,
            grade_tolerance,
            algorithm,
            max_results,
        } => {
            let mut params = config.single_target.clone();
            if let Some(v) = min_similarity {
                params.min_similarity = v;
            }
            if let Some(v) = grade_tolerance {
                params.grade_tolerance = v;
            }
            if let Some(name) = algorithm {
                params.algorithm = Algorithm::from(name);
            }
            if let Some(v) = max_results {
                params.max_results = v;
            }
            let response = inspect_record(store.as_ref(), record_id, &params).await?;
            print_json(&response)?;
        }
        Command::Merge {
            target,
            duplicates,
            ignore,
        } => {
            let resolver = MergeResolver::new(store.clone());
            let op = MergeOperation {
                target_id: target,
                duplicate_ids: duplicates,
                ignore_ids: ignore,
            };
            let result = resolver.merge(&op).await?;
            print_json(&result)?;
        }
        Command::MergeBatch { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read merge file {}", file.display()))?;
            let request: BatchMergeRequest =
                serde_json::from_str(&raw).context("Failed to parse merge file")?;
            let resolver = MergeResolver::new(store.clone());
            let response = resolver.merge_batch(&request).await;
            print_json(&response)?;
            batch_outcome = response.ensure_all_succeeded();
        }
        Command::Unmark { record_ids } => {
            let resolver = MergeResolver::new(store.clone());
            let response = resolver.unmark(&record_ids).await?;
            print_json(&response)?;
        }
        Command::MoveAscents {
            source,
            destination,
        } => {
            let resolver = MergeResolver::new(store.clone());
            let response = resolver.move_ascents(source, destination).await?;
            print_json(&response)?;
        }
        Command::MoveAscentsAll => {
            let resolver = MergeResolver::new(store.clone());
            let response = resolver.resolve_all_duplicate_pointers().await?;
            print_json(&response)?;
        }
    }

    if writes && cli.write_back {
        if let (Some(snapshot), Some(path)) = (&snapshot_store, &cli.snapshot) {
            snapshot
                .save_json(path)
                .await
                .context("Failed to write catalog snapshot back")?;
            info!("Wrote catalog snapshot to {}", path.display());
        }
    }
    info!("Completed in {:.2?}", start.elapsed());
    // Partially failed batches still write back the operations that succeeded.
    batch_outcome?;
    Ok(())
}
