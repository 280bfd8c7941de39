//! vulnpost-daemon entry point.
//!
//! Wires the configuration, store, distributed lock, and update manager
//! together, then runs the periodic update loop until a shutdown signal
//! arrives.

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use vulnpost_core::config::VulnpostConfig;
use vulnpost_store::{LeaseLock, SqliteStore};
use vulnpost_updater::{ManagerBuilder, Registry};

use crate::cli::DaemonCli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonCli::parse();

    let mut config = VulnpostConfig::load(&args.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    if let Some(level) = args.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.general.log_format = format;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if args.validate {
        println!("configuration OK: {}", args.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!("vulnpost-daemon starting");

    // 스토어 연결. 스키마 소유권을 외부 마이그레이션 드라이버에 두는
    // 배포에서는 migrate 토글을 끕니다.
    let store = Arc::new(
        SqliteStore::connect(&config.database.conn_string, config.database.max_pool_size)
            .await
            .map_err(|e| anyhow::anyhow!("failed to connect to store: {}", e))?,
    );
    if config.database.migrate {
        store
            .ensure_schema()
            .await
            .map_err(|e| anyhow::anyhow!("failed to set up schema: {}", e))?;
        tracing::info!("store schema ensured");
    }

    let lock = Arc::new(LeaseLock::new(store.pool().clone()));

    // 업데이터 계열 팩토리는 여기서 등록됩니다. 배포마다 제공되는
    // 계열이 다르므로 기본 빌드는 비어 있습니다.
    let registry = Registry::new();

    let manager = Arc::new(
        ManagerBuilder::new()
            .store(Arc::clone(&store))
            .lock(lock)
            .registry(registry)
            .workers(config.effective_workers())
            .interval(config.update_interval())
            .enabled(config.updates.enabled_sets.clone())
            .build()
            .await
            .map_err(|e| anyhow::anyhow!("failed to build update manager: {}", e))?,
    );

    tracing::info!(
        workers = manager.workers(),
        interval_secs = manager.interval().as_secs(),
        factories = manager.factory_names().len(),
        "update manager initialized"
    );

    let token = CancellationToken::new();

    if args.once {
        // 단발 실행 모드: 한 번의 업데이트 패스 후 종료
        manager
            .run(&token)
            .await
            .map_err(|e| anyhow::anyhow!("update pass failed: {}", e))?;
        tracing::info!("single update pass finished");
        return Ok(());
    }

    let update_task = if config.updates.disable_background {
        tracing::warn!("background updates disabled, store will not refresh");
        None
    } else {
        let manager = Arc::clone(&manager);
        let token = token.clone();
        Some(tokio::spawn(async move { manager.start(&token).await }))
    };

    let signal = wait_for_shutdown_signal().await?;
    tracing::info!(signal = signal, "shutdown signal received");

    token.cancel();
    if let Some(task) = update_task {
        // start는 취소 에러로 끝나는 것이 정상 경로입니다
        let _ = task.await;
    }

    tracing::info!("vulnpost-daemon shut down");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}
