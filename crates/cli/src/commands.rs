//! Subcommands and their JSON reports.

use clap::{Parser, Subcommand};
use posa_client::FrappeClient;
use posa_offline_core::{AppConfig, OfflineCache, QueueKind, SyncTotals};
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Parser, Debug)]
#[command(name = "posa-offline")]
#[command(about = "Inspect and maintain the offline cache of a POS terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Show cache readiness, queue lengths and the last sync outcome
    Status,
    /// Estimate storage usage
    Usage,
    /// Drain the queues to the backend (customers, then invoices, then payments)
    Sync {
        /// Treat the backend as unreachable and only report pending counts
        #[arg(long)]
        offline: bool,
    },
    /// Reload the local stock projection for every cached item
    RefreshStock,
    /// Trim every queue to its most recent entries
    Purge {
        /// Entries to keep per queue (default: max_queue_items from config)
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete all cached data, including unsynced queues
    Clear {
        /// Skip the health check and the eager reopen of the store
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Serialize)]
struct StatusReport {
    ready: bool,
    cache_version: u32,
    manual_offline: bool,
    pending_invoices: usize,
    pending_customers: usize,
    pending_payments: usize,
    over_limit: bool,
    last_sync: SyncTotals,
}

#[derive(Debug, Serialize)]
struct SyncReport {
    customers: SyncTotals,
    invoices: SyncTotals,
    payments: SyncTotals,
}

/// Run `command` against the cache described by `config` and return its report.
pub async fn run(command: Command, config: &AppConfig) -> anyhow::Result<Value> {
    let cache = OfflineCache::open(config).await;
    let report = execute(&cache, command, config).await;
    cache.shutdown().await;
    report
}

async fn execute(cache: &OfflineCache, command: Command, config: &AppConfig) -> anyhow::Result<Value> {
    let report = match command {
        Command::Status => serde_json::to_value(StatusReport {
            ready: cache.is_cache_ready(),
            cache_version: cache.snapshot().cache_version,
            manual_offline: cache.is_manual_offline(),
            pending_invoices: cache.pending_count(QueueKind::Invoices),
            pending_customers: cache.pending_count(QueueKind::Customers),
            pending_payments: cache.pending_count(QueueKind::Payments),
            over_limit: cache.queue_health_check(config.max_queue_items),
            last_sync: cache.last_sync_totals(),
        })?,
        Command::Usage => serde_json::to_value(cache.cache_usage_estimate().await)?,
        Command::Sync { offline } => {
            let backend = FrappeClient::from_app_config(config)?;
            let connected = !offline;
            let customers = cache.sync_offline_customers(&backend, &connected).await;
            let invoices = cache.sync_offline_invoices(&backend, &connected).await;
            let payments = cache.sync_offline_payments(&backend, &connected).await;
            serde_json::to_value(SyncReport { customers, invoices, payments })?
        }
        Command::RefreshStock => {
            let backend = FrappeClient::from_app_config(config)?;
            let Some(pos_profile) = config.pos_profile.as_deref() else {
                anyhow::bail!("pos_profile is not configured; set POSA_OFFLINE_POS_PROFILE");
            };
            let codes: Vec<String> = cache.items_storage().into_iter().map(|i| i.item_code).collect();
            let refreshed = cache.initialize_stock_cache(&backend, &codes, pos_profile).await;
            json!({ "items": codes.len(), "refreshed": refreshed, "stocked": cache.local_stock_cache().len() })
        }
        Command::Purge { limit } => {
            let limit = limit.unwrap_or(config.max_queue_items);
            let dropped = cache.purge_old_queue_entries(limit);
            json!({ "limit": limit, "dropped": dropped })
        }
        Command::Clear { force } => {
            if force {
                cache.force_clear_all_cache().await?;
            } else {
                cache.clear_all_cache().await?;
            }
            json!({ "cleared": true, "forced": force })
        }
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Command {
        Cli::try_parse_from(args).unwrap().command
    }

    fn temp_config(dir: &tempfile::TempDir) -> AppConfig {
        AppConfig {
            db_path: dir.path().join("cache.sqlite"),
            fallback_path: dir.path().join("fallback.json"),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_subcommands() {
        assert_eq!(parse(&["posa-offline", "status"]), Command::Status);
        assert_eq!(parse(&["posa-offline", "sync", "--offline"]), Command::Sync { offline: true });
        assert_eq!(parse(&["posa-offline", "purge", "--limit", "10"]), Command::Purge { limit: Some(10) });
        assert_eq!(parse(&["posa-offline", "clear"]), Command::Clear { force: false });
        assert_eq!(parse(&["posa-offline", "refresh-stock"]), Command::RefreshStock);
        assert!(Cli::try_parse_from(["posa-offline", "purge", "--limit", "x"]).is_err());
    }

    #[tokio::test]
    async fn test_status_after_purge() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        {
            let cache = OfflineCache::open(&config).await;
            for n in 0..4 {
                cache.save_offline_payment(json!({"n": n}));
            }
            cache.shutdown().await;
        }

        let purged = run(Command::Purge { limit: Some(1) }, &config).await.unwrap();
        assert_eq!(purged, json!({"limit": 1, "dropped": 3}));

        let status = run(Command::Status, &config).await.unwrap();
        assert_eq!(status["ready"], json!(true));
        assert_eq!(status["pending_payments"], json!(1));
        assert_eq!(status["over_limit"], json!(false));
    }

    #[tokio::test]
    async fn test_sync_requires_backend_settings() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(Command::Sync { offline: true }, &temp_config(&dir)).await;
        assert!(result.is_err());
    }
}
