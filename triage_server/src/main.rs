//! webcompat-triage — command line for the report triage engine.
//!
//! Imports reports, manages buckets, and runs reassignment and signature
//! optimization against the PostgreSQL store. Every command prints JSON on
//! stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use triage_core::Signature;

use triage_server::config::TriageConfig;
use triage_server::events::{EventSink, TracingSink};
use triage_server::services::lookup_service::DomainCache;
use triage_server::services::reassign_service::{self, ReassignOptions};
use triage_server::services::{
    bucket_service, bug_service, entry_service, hit_service, optimize_service,
};
use triage_server::store::{PgStore, TriageStore};

/// Page size for `reassign --all` without `--limit`.
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Parser)]
#[command(name = "webcompat-triage", about = "Web-compat report triage")]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the triage tables
    Migrate,
    /// Import newline-delimited JSON report rows
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// Move matching entries into a bucket and non-matching ones out
    Reassign {
        #[arg(long)]
        bucket: i64,
        /// Apply the changes instead of previewing them
        #[arg(long)]
        submit: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        /// Process every page while holding the bucket's reassign flag
        #[arg(long, conflicts_with = "offset")]
        all: bool,
    },
    /// Propose a broader signature absorbing an unbucketed entry
    Optimize {
        #[arg(long)]
        bucket: i64,
        /// Number of recent unbucketed entries to consider
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
    /// Bucket management
    Bucket {
        #[command(subcommand)]
        action: BucketCommand,
    },
    /// Re-check an entry against its bucket's signature
    Revalidate {
        #[arg(long)]
        entry: i64,
    },
    /// Compare hit counters with bucketed entries
    CheckHits,
    /// Register a bug tracker
    AddProvider {
        #[arg(long)]
        classname: String,
        #[arg(long)]
        hostname: String,
        #[arg(long, default_value = "")]
        url_template: String,
    },
    /// Link a bucket to an external bug
    LinkBug {
        #[arg(long)]
        bucket: i64,
        #[arg(long)]
        provider: i64,
        #[arg(long)]
        external_id: String,
    },
}

#[derive(Subcommand)]
enum BucketCommand {
    Create {
        #[arg(long)]
        description: String,
        /// Signature JSON
        #[arg(long)]
        signature: String,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        priority: i32,
        #[arg(long)]
        bug: Option<i64>,
    },
    Show {
        #[arg(long)]
        id: i64,
    },
    SetPriority {
        #[arg(long)]
        id: i64,
        #[arg(long, allow_hyphen_values = true)]
        priority: i32,
    },
    SetSignature {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        signature: String,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let mut config = TriageConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    if config.metrics_enabled {
        triage_server::metrics::init_metrics();
    }

    let store = PgStore::connect(&config.database_url, config.max_pool_size)?;
    let cache = DomainCache::new(config.domain_cache_capacity);
    let sink = TracingSink;

    match cli.command {
        Command::Migrate => {
            tracing::info!("Running triage migration...");
            store.migrate().await?;
            tracing::info!("Triage migration completed.");
            print_json(&json!({ "migrated": true }))
        }
        Command::Import { file } => {
            let input = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let summary = entry_service::import_reports(&store, &cache, &sink, &input).await?;
            print_json(&summary)
        }
        Command::Reassign {
            bucket,
            submit,
            limit,
            offset,
            all,
        } => {
            let sizes = config.batch_sizes();
            if all {
                let page_size = limit.unwrap_or(DEFAULT_PAGE_SIZE);
                let summary = reassign_service::run_full_reassignment(
                    &store, &sink, bucket, submit, page_size, sizes,
                )
                .await?;
                return print_json(&summary);
            }

            let bucket = bucket_service::get_bucket(&store, bucket).await?;
            let options = ReassignOptions {
                submit,
                limit,
                offset,
            };
            let outcome =
                reassign_service::reassign(&store, &sink, &bucket, options, sizes).await?;
            print_json(&outcome)
        }
        Command::Optimize { bucket, limit } => {
            let bucket = bucket_service::get_bucket(&store, bucket).await?;
            let entries = store.unbucketed_entries(limit).await?;
            let result = optimize_service::optimize_signature(&store, &bucket, &entries).await?;
            print_json(&result)
        }
        Command::Bucket { action } => run_bucket_command(&store, &cache, action).await,
        Command::Revalidate { entry } => {
            let events = entry_service::revalidate_entry(&store, entry).await?;
            sink.dispatch_all(&events);
            print_json(&json!({ "entry": entry, "unbucketed": !events.is_empty() }))
        }
        Command::CheckHits => {
            let consistent = hit_service::is_consistent(&store).await?;
            print_json(&json!({
                "consistent": consistent,
                "hits": store.total_hits().await?,
                "bucketed_entries": store.count_bucketed_entries().await?,
            }))
        }
        Command::AddProvider {
            classname,
            hostname,
            url_template,
        } => {
            let provider =
                bug_service::register_provider(&store, &classname, &hostname, &url_template)
                    .await?;
            print_json(&provider)
        }
        Command::LinkBug {
            bucket,
            provider,
            external_id,
        } => {
            let bug = bug_service::create_bug(&store, provider, &external_id).await?;
            let bucket = bucket_service::link_bug(&store, bucket, bug.id).await?;
            let url = bug_service::bug_url(&store, bug.id).await?;
            print_json(&json!({ "bucket": bucket, "bug": bug, "url": url }))
        }
    }
}

async fn run_bucket_command(
    store: &PgStore,
    cache: &DomainCache,
    action: BucketCommand,
) -> anyhow::Result<()> {
    match action {
        BucketCommand::Create {
            description,
            signature,
            priority,
            bug,
        } => {
            let signature = Signature::parse(&signature)?;
            let bucket =
                bucket_service::create_bucket(store, cache, &description, &signature, priority, bug)
                    .await?;
            print_json(&bucket)
        }
        BucketCommand::Show { id } => {
            let bucket = bucket_service::get_bucket(store, id).await?;
            let hits = store.bucket_hits(id).await?;
            let bug_url = match bucket.bug_id {
                Some(bug_id) => Some(bug_service::bug_url(store, bug_id).await?),
                None => None,
            };
            print_json(&json!({ "bucket": bucket, "hits": hits, "bug_url": bug_url }))
        }
        BucketCommand::SetPriority { id, priority } => {
            let bucket = bucket_service::set_priority(store, id, priority).await?;
            print_json(&bucket)
        }
        BucketCommand::SetSignature { id, signature } => {
            let signature = Signature::parse(&signature)?;
            let bucket = bucket_service::update_signature(store, cache, id, &signature).await?;
            print_json(&bucket)
        }
        BucketCommand::Delete { id } => {
            bucket_service::delete_bucket(store, cache, id).await?;
            print_json(&json!({ "deleted": id }))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
