//! WebSocket progress stream with backpressure support.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tracing::{debug, info, warn};

use shortsmith_models::{RunEvent, RunId, RunReport, RunState};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::runs::RunHandle;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const ENDPOINT: &str = "runs";

/// Send an event with backpressure handling.
async fn send_event(tx: &mpsc::Sender<Message>, event: &RunEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    metrics::record_ws_message_sent(ENDPOINT, event.type_name());

    match tx.try_send(Message::Text(json)) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

/// Stream a run's events: finished rows first, then live events until the run ends.
pub async fn ws_run(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> ApiResult<Response> {
    let run_id = RunId::from_string(run_id);
    let handle = state
        .runs
        .get(&run_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("run {run_id}")))?;

    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection(ENDPOINT);

    Ok(ws
        .on_upgrade(move |socket| async move {
            handle_run_socket(socket, run_id, handle).await;
            let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_ws_active_connections(count);
        })
        .into_response())
}

async fn handle_run_socket(socket: WebSocket, run_id: RunId, handle: Arc<RunHandle>) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        ws_sender
    });

    // Subscribe before the snapshot so nothing falls between the two
    let mut events = handle.subscribe();
    let report = handle.snapshot().await;
    info!(run_id = %run_id, state = report.state.as_str(), "WebSocket subscribed");

    let mut replayed = HashSet::new();
    let mut open = true;
    for row in &report.rows {
        replayed.insert(row.index);
        if !send_event(&tx, &RunEvent::RowFinished { report: row.clone() }).await {
            open = false;
            break;
        }
    }

    if open && report.state.is_terminal() {
        send_event(&tx, &terminal_event(&report)).await;
        open = false;
    }

    if open {
        let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(RunEvent::RowFinished { report }) if replayed.contains(&report.index) => {}
                        Ok(event) => {
                            if !send_event(&tx, &event).await {
                                warn!(run_id = %run_id, "WebSocket send failed, client disconnected");
                                break;
                            }
                            if event.is_final() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(run_id = %run_id, "WebSocket subscriber lagged, {} events dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {
                            debug!(run_id = %run_id, "WebSocket closed by client");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                _ = heartbeat.tick() => {
                    if tx.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    drop(tx);
    if let Ok(mut ws_sender) = send_task.await {
        let _ = ws_sender.close().await;
    }
}

/// Closing event for a run that already finished.
fn terminal_event(report: &RunReport) -> RunEvent {
    match report.state {
        RunState::Error => RunEvent::error(
            report
                .error
                .clone()
                .unwrap_or_else(|| "run failed".to_string()),
        ),
        state => RunEvent::Done {
            state,
            uploaded: report.uploaded(),
            failed: report.failed(),
            skipped: report.skipped(),
        },
    }
}
