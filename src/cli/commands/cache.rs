use anyhow::Result;

use super::Command;
use crate::cli::context::AppContext;
use crate::cli::CacheAction;

pub struct CacheCommand {
    pub action: CacheAction,
}

impl CacheCommand {
    pub fn new(action: CacheAction) -> Self {
        Self { action }
    }
}

impl Command for CacheCommand {
    async fn execute(&self, ctx: &AppContext) -> Result<()> {
        let store = ctx.store();
        match &self.action {
            CacheAction::List => {
                let keys = store.list_keys().await?;
                if keys.is_empty() {
                    println!("📭 Cache is empty");
                }
                for key in keys {
                    let marker = if store.has(&key).await? { "  " } else { "⌛" };
                    println!("{marker} {key}");
                }
            }
            CacheAction::PurgeExpired => {
                let evicted = store.clear_expired().await?;
                println!("🧹 Evicted {evicted} expired entries");
            }
            CacheAction::Clear { yes } => {
                if !yes {
                    println!("⚠️  This removes every cached plan and progress. Re-run with --yes");
                    return Ok(());
                }
                ctx.cache.clear_everything().await?;
                println!("🗑️  Cache cleared");
            }
        }
        Ok(())
    }
}
