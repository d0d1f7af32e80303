//! Concurrent racing of one query against a pool of upstream clients.

use crate::client::DnsClient;
use crate::context::QueryContext;
use hickory_proto::op::Message;
use janus_dns_domain::ForwardError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Ceiling on the whole race, independent of per-client timeouts.
pub const RACE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends `query` to every client concurrently and returns the first
/// success. Losers share a child cancellation token that is cancelled as
/// soon as a winner lands, so they stop at their next suspension point; a
/// loser finishing late cannot affect the returned value.
pub async fn race(
    query: &Message,
    clients: &[Arc<dyn DnsClient>],
    ctx: &QueryContext,
) -> Result<Message, ForwardError> {
    if clients.is_empty() {
        return Err(ForwardError::NoUpstreamsConfigured);
    }

    let child = ctx.child();
    // Any exit path cancels the siblings.
    let _guard = child.cancel.clone().drop_guard();

    let (tx, mut rx) = mpsc::channel(clients.len());
    for client in clients {
        let client = Arc::clone(client);
        let attempt = query.clone();
        let attempt_ctx = child.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = client.resolve(attempt, &attempt_ctx).await;
            let _ = tx.send(result).await;
        });
    }
    drop(tx);

    let ceiling = Instant::now() + RACE_TIMEOUT;
    let mut last_error: Option<ForwardError> = None;

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(ForwardError::Cancelled),
            _ = tokio::time::sleep_until(ctx.deadline) => return Err(ForwardError::DeadlineExceeded),
            _ = tokio::time::sleep_until(ceiling) => return Err(ForwardError::RaceTimeout),
            received = rx.recv() => match received {
                Some(Ok(response)) => {
                    child.cancel.cancel();
                    debug!(clients = clients.len(), "race won, cancelling siblings");
                    return Ok(response);
                }
                Some(Err(err)) => {
                    // A sibling's post-cancel error must not mask the wire
                    // error that actually failed the race.
                    if !err.is_cancellation() || last_error.is_none() {
                        last_error = Some(err);
                    }
                }
                None => break,
            }
        }
    }

    let last = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no responses received".to_string());
    Err(ForwardError::AllUpstreamsFailed(last))
}
