//! Live search pipeline: queries → debounce → dedupe → switch-to-latest → results.
//!
//! Each stage is a Tokio task between two mpsc channels, so stages compose
//! and can be tested alone. The last stage runs at most one search at a time;
//! a new query cancels the running one (token + generation guard) and its
//! result is dropped, so results are delivered in query order and a stale
//! result never follows a newer one.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error, info};

use super::{SearchEngine, SearchState};
use crate::cancellation::{GenerationGuard, TaskGeneration};
use crate::metrics::metric_names;

const STAGE_CAPACITY: usize = 32;

/// Wire the full pipeline over `queries`, debounced by the engine's
/// configured quiet period. The result channel closes once `queries` ends
/// and the last search has been delivered.
pub fn spawn<S>(engine: Arc<SearchEngine>, queries: S) -> mpsc::Receiver<SearchState>
where
    S: Stream<Item = String> + Send + 'static,
{
    let quiet = engine.config().debounce();
    let raw = forward(queries);
    switch_latest(engine, dedupe(debounce(raw, quiet)))
}

/// Channel-fed session: push keystrokes into the sender, read results from
/// the receiver. Dropping the sender ends the session.
pub fn session(engine: Arc<SearchEngine>) -> (mpsc::Sender<String>, mpsc::Receiver<SearchState>) {
    let (tx, rx) = mpsc::channel::<String>(STAGE_CAPACITY);
    let queries = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|query| (query, rx))
    });
    (tx, spawn(engine, queries))
}

/// Pump a stream into a channel.
fn forward<S>(queries: S) -> mpsc::Receiver<String>
where
    S: Stream<Item = String> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    tokio::spawn(async move {
        let mut queries = Box::pin(queries);
        while let Some(query) = queries.next().await {
            if tx.send(query).await.is_err() {
                break;
            }
        }
    });
    rx
}

/// Emit a value only after `quiet` has passed with no newer value. When the
/// input closes, a pending value is flushed before the output closes.
pub fn debounce(mut input: mpsc::Receiver<String>, quiet: Duration) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    tokio::spawn(async move {
        let mut pending: Option<String> = None;
        let timer = tokio::time::sleep(quiet);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                msg = input.recv() => match msg {
                    Some(query) => {
                        pending = Some(query);
                        timer.as_mut().reset(Instant::now() + quiet);
                    }
                    None => {
                        if let Some(query) = pending.take() {
                            let _ = tx.send(query).await;
                        }
                        break;
                    }
                },
                () = &mut timer, if pending.is_some() => {
                    if let Some(query) = pending.take() {
                        if tx.send(query).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });
    rx
}

/// Drop values equal to the previous one, ignoring surrounding whitespace
/// the way the search itself does.
pub fn dedupe(mut input: mpsc::Receiver<String>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    tokio::spawn(async move {
        let mut last: Option<String> = None;
        while let Some(query) = input.recv().await {
            let trimmed = query.trim();
            if last.as_deref() == Some(trimmed) {
                continue;
            }
            last = Some(trimmed.to_string());
            if tx.send(query).await.is_err() {
                break;
            }
        }
    });
    rx
}

struct InFlight {
    query: String,
    guard: GenerationGuard,
    handle: JoinHandle<Option<SearchState>>,
}

/// Search each query, cancelling the previous search when a new one arrives.
pub fn switch_latest(
    engine: Arc<SearchEngine>,
    mut input: mpsc::Receiver<String>,
) -> mpsc::Receiver<SearchState> {
    let (tx, rx) = mpsc::channel(STAGE_CAPACITY);
    tokio::spawn(async move {
        let generations = TaskGeneration::new();
        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                biased;

                next = input.recv() => match next {
                    Some(query) => {
                        if let Some(stale) = in_flight.take() {
                            stale.handle.abort();
                            engine.metrics.increment(metric_names::SEARCH_SUPERSEDED);
                            debug!(query = %stale.query, generation = stale.guard.my_generation(), "search superseded");
                        }
                        let guard = generations.cancel_and_advance();
                        in_flight = Some(start_search(Arc::clone(&engine), query, guard));
                    }
                    None => {
                        if let Some(InFlight { query, guard, handle }) = in_flight.take() {
                            deliver(handle.await, &query, &guard, &tx).await;
                        }
                        break;
                    }
                },

                result = join(&mut in_flight), if in_flight.is_some() => {
                    if let Some(done) = in_flight.take() {
                        if !deliver(result, &done.query, &done.guard, &tx).await {
                            break;
                        }
                    }
                }
            }
        }

        generations.cancel_all();
        info!("search pipeline closed");
    });
    rx
}

fn start_search(engine: Arc<SearchEngine>, query: String, guard: GenerationGuard) -> InFlight {
    let token = guard.token().clone();
    let task_query = query.clone();
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => None,
            state = engine.search(&task_query) => Some(state),
        }
    });
    InFlight {
        query,
        guard,
        handle,
    }
}

async fn join(in_flight: &mut Option<InFlight>) -> Result<Option<SearchState>, JoinError> {
    match in_flight {
        Some(flight) => (&mut flight.handle).await,
        None => std::future::pending().await,
    }
}

/// Forward a finished search if it is still current. Returns false once the
/// consumer has gone away.
async fn deliver(
    result: Result<Option<SearchState>, JoinError>,
    query: &str,
    guard: &GenerationGuard,
    tx: &mpsc::Sender<SearchState>,
) -> bool {
    let state = match result {
        Ok(Some(state)) => state,
        Ok(None) => return true,
        Err(e) if e.is_cancelled() => return true,
        Err(e) => {
            error!(query, error = %e, "search task panicked");
            SearchState::Error {
                query: query.to_string(),
                message: "search task failed".to_string(),
            }
        }
    };
    if !guard.should_continue() {
        debug!(query, "dropping stale search result");
        return true;
    }
    tx.send(state).await.is_ok()
}
