//! sqlexec CLI entry point
//!
//! Runs one-shot query/modify requests against a SQLite database, or serves
//! JSON-lines requests from stdin until EOF or a termination signal.

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlexec_driver_sqlite::{SqliteDatabase, SqliteOptions};
use sqlexec_services::{
    LifeManager, MODIFY_ROUTE, QUERY_ROUTE, Router, ServiceConfig, SqlExecutorService,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, BufReader};

mod logging;
mod serve;

#[derive(Debug, Parser)]
#[command(name = "sqlexec", version, about = "Concurrent, retry-aware SQL transaction executor")]
struct Cli {
    /// Configuration file (defaults to <config dir>/sqlexec/config.toml)
    #[arg(long, global = true, env = "SQLEXEC_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the configuration
    #[arg(long, global = true)]
    database: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single SELECT and print the response
    Query {
        #[arg(long)]
        sql: String,

        /// Retries after the first failed attempt
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        retry: i64,
    },

    /// Run a batch of transactions read from a JSON modify request
    Modify {
        /// Request file; stdin when omitted
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Serve JSON-lines requests from stdin
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database.path = Some(database);
    }

    let mut logging_config = logging::LoggingConfig::from_service(&config.logging);
    if cli.verbose {
        logging_config = logging_config.verbose();
    }
    let _log_guard = logging::init(logging_config)?;

    let router = build_router(&config)?;

    match cli.command {
        Commands::Query { sql, retry } => {
            let response = router
                .dispatch(QUERY_ROUTE, serde_json::json!({ "sql": sql, "retry": retry }))
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Modify { file } => {
            let body = read_request(file).await?;
            let response = router.dispatch(MODIFY_ROUTE, body).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Serve => {
            let stdin = BufReader::new(tokio::io::stdin());
            serve::serve(router, stdin, tokio::io::stdout(), shutdown_signal()).await?;
        }
    }

    Ok(())
}

fn build_router(config: &ServiceConfig) -> anyhow::Result<Router> {
    let path = config.database_path()?;
    let database = SqliteDatabase::open_with_options(
        path,
        SqliteOptions {
            busy_timeout: config.busy_timeout(),
        },
    )
    .with_context(|| format!("failed to open database {}", path))?;

    let lifecycle = Arc::new(LifeManager::new(config.shutdown_grace()));
    let service = SqlExecutorService::new(Arc::new(database), config, lifecycle)?;
    Ok(Router::new(service))
}

async fn read_request(file: Option<PathBuf>) -> anyhow::Result<serde_json::Value> {
    let content = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut content = String::new();
            tokio::io::stdin().read_to_string(&mut content).await?;
            content
        }
    };
    serde_json::from_str(&content).context("modify request is not valid JSON")
}

/// Resolves on Ctrl-C, or on SIGTERM, SIGHUP or SIGQUIT on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::SignalKind;

        tokio::select! {
            _ = wait_for_signal(SignalKind::terminate()) => {}
            _ = wait_for_signal(SignalKind::hangup()) => {}
            _ = wait_for_signal(SignalKind::quit()) => {}
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl-C"),
        _ = terminate => tracing::info!("received termination signal"),
    }
}

#[cfg(unix)]
async fn wait_for_signal(kind: tokio::signal::unix::SignalKind) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to install signal handler");
            std::future::pending::<()>().await;
        }
    }
}
