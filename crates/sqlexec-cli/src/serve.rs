//! JSON-lines request loop
//!
//! Each input line is an envelope `{"id": ..., "route": "...", "body": {...}}`.
//! Requests run concurrently and every one produces exactly one output line
//! `{"id": ..., "response": {...}}`, in completion order. `id` is optional and
//! echoed back untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlexec_services::{ErrorResponse, Router};
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<Json>,
    route: String,
    #[serde(default)]
    body: Json,
}

#[derive(Debug, Serialize)]
struct Reply {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Json>,
    response: Json,
}

/// Counters reported when the loop exits
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServeStats {
    pub received: usize,
    pub malformed: usize,
}

/// Serve requests from `input` until EOF or `shutdown` resolves.
///
/// Once reading stops, the router's lifecycle is shut down: new work is
/// refused, in-flight requests finish and the grace period elapses. All
/// responses are flushed to `output` before returning.
pub async fn serve<R, W, S>(router: Router, input: R, output: W, shutdown: S) -> anyhow::Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
    S: Future<Output = ()>,
{
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(rx, output));

    let mut stats = ServeStats::default();
    let mut requests = JoinSet::new();
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => {
                tracing::info!("shutdown requested, no longer reading requests");
                break;
            }
        };
        let Some(line) = line else {
            tracing::info!("input closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        stats.received += 1;

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                stats.malformed += 1;
                tracing::warn!(error = %e, "malformed request line");
                let response = ErrorResponse::parameter_error(format!("malformed request: {}", e));
                send(&tx, Reply { id: None, response: serde_json::to_value(response)? });
                continue;
            }
        };

        // Register before spawning so a shutdown that starts right after
        // this line still waits for the request.
        let guard = router.service().lifecycle().enter();
        let router = router.clone();
        let tx = tx.clone();
        requests.spawn(async move {
            let response = match guard {
                Ok(guard) => router.dispatch_guarded(guard, &envelope.route, envelope.body).await,
                Err(e) => {
                    tracing::warn!(error = %e, "request refused");
                    router.dispatch(&envelope.route, envelope.body).await
                }
            };
            send(&tx, Reply { id: envelope.id, response });
        });

        // Reap finished requests so the set does not grow unbounded
        while let Some(result) = requests.try_join_next() {
            if let Err(e) = result {
                tracing::error!(error = %e, "request task failed");
            }
        }
    }

    router.service().lifecycle().shutdown().await;

    while let Some(result) = requests.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "request task failed");
        }
    }

    drop(tx);
    writer.await??;

    tracing::info!(received = stats.received, malformed = stats.malformed, "serve loop finished");
    Ok(stats)
}

fn send(tx: &mpsc::UnboundedSender<String>, reply: Reply) {
    match serde_json::to_string(&reply) {
        Ok(line) => {
            if tx.send(line).is_err() {
                tracing::error!("response writer stopped, dropping response");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode response"),
    }
}

async fn write_lines<W>(mut rx: mpsc::UnboundedReceiver<String>, mut output: W) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        output.write_all(line.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    output.shutdown().await?;
    Ok(())
}
