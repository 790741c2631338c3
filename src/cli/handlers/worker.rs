//! Worker command handler
//!
//! Runs the dispatch loop without the HTTP API, either until a shutdown
//! signal or for a single pass.

use tokio_util::sync::CancellationToken;

use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::queue::PassSummary;
use crate::server::{build_repositories, build_worker, shutdown_signal};

pub struct WorkerCommandHandler {
    config: Settings,
}

impl WorkerCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    pub async fn execute(&self, once: bool) -> AppResult<()> {
        if once {
            let summary = self.run_single_pass().await?;
            print_summary(&summary);
            return Ok(());
        }

        let (repos, _pool) = build_repositories(&self.config).await?;
        let worker = build_worker(&self.config, &repos);
        let shutdown = CancellationToken::new();

        let token = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            token.cancel();
        });

        worker.run(shutdown).await;
        Ok(())
    }

    pub async fn run_single_pass(&self) -> AppResult<PassSummary> {
        let (repos, _pool) = build_repositories(&self.config).await?;
        build_worker(&self.config, &repos).run_once().await
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

fn print_summary(summary: &PassSummary) {
    println!("Dispatch pass finished");
    println!("  claimed:   {}", summary.claimed);
    println!("  sent:      {}", summary.sent);
    println!("  failed:    {}", summary.failed);
    println!("  stale:     {}", summary.stale);
    println!("  conflicts: {}", summary.conflicts);
    if summary.errors > 0 {
        println!("  errors:    {}", summary.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;

    #[tokio::test]
    async fn test_single_pass_on_empty_memory_store() {
        let mut config = Settings::default();
        config.dispatch.store = StoreBackend::Memory;
        let handler = WorkerCommandHandler::new(config);

        let summary = handler.run_single_pass().await.unwrap();
        assert_eq!(summary, PassSummary::default());
        assert!(handler.execute(true).await.is_ok());
    }
}
