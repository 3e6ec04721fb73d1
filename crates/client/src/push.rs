//! Push-channel subscriber: one WebSocket connection, one decoded
//! [`PushEvent`] per text frame, reconnect with capped backoff.

use std::time::Duration;

use futures::StreamExt;
use metrics::counter;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use gatedeck_api::{CancelHandle, PushEvent, StreamHandle};

fn backoff_max_secs() -> u64 {
    std::env::var("GATEDECK_PUSH_BACKOFF_MAX_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30)
}

/// Spawn the subscriber task. The stream stays open across reconnects
/// and ends only when cancelled or the receiver is dropped.
pub(crate) fn subscribe(url: Url) -> StreamHandle<PushEvent> {
    let cap = std::env::var("GATEDECK_PUSH_QUEUE_CAP")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1024);
    let (tx, rx) = mpsc::channel::<PushEvent>(cap);
    let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
    let cancel = CancelHandle::new(cancel_tx);

    tokio::spawn(async move {
        let mut backoff = Duration::from_secs(1);
        let max = Duration::from_secs(backoff_max_secs());
        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    info!("push subscriber cancelled");
                    return;
                }
                conn = connect_async(url.as_str()) => {
                    match conn {
                        Ok((ws, _resp)) => {
                            info!(url = %url, "push channel connected");
                            backoff = Duration::from_secs(1);
                            let closed = pump_frames(ws, &tx, &mut cancel_rx).await;
                            if closed {
                                return;
                            }
                            warn!("push channel dropped; reconnecting");
                        }
                        Err(e) => {
                            warn!(error = %e, next_retry_secs = backoff.as_secs(), "push connect failed");
                        }
                    }
                }
            }
            tokio::select! {
                _ = &mut cancel_rx => { return; }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(max);
        }
    });

    StreamHandle { rx, cancel }
}

/// Read frames until the socket drops. Returns true when the task
/// should stop for good (cancel or closed receiver).
async fn pump_frames<S>(
    mut ws: S,
    tx: &mpsc::Sender<PushEvent>,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> bool
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = &mut *cancel_rx => { return true; }
            frame = ws.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match decode_frame(&text) {
                            Some(ev) => {
                                if tx.send(ev).await.is_err() {
                                    // console went away; no point reconnecting
                                    return true;
                                }
                            }
                            None => {
                                counter!("push_frames_dropped_total", 1u64);
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return false,
                    Some(Ok(_)) => {} // ping/pong/binary: not ours
                    Some(Err(e)) => {
                        warn!(error = %e, "push frame error");
                        return false;
                    }
                }
            }
        }
    }
}

/// One bad frame never kills the subscriber: decode failures are
/// logged and skipped.
pub fn decode_frame(text: &str) -> Option<PushEvent> {
    match serde_json::from_str::<PushEvent>(text) {
        Ok(ev) => Some(ev),
        Err(e) => {
            debug!(error = %e, frame = %text.chars().take(120).collect::<String>(), "undecodable push frame; skipping");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tolerates_garbage_and_unknown_events() {
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame(r#"{"event":"brand_new_thing"}"#).is_none());
        assert!(decode_frame(r#"{"event":"connect"}"#).is_some());
    }

    #[test]
    fn decode_qr_frame() {
        let ev = decode_frame(r#"{"event":"qr","account_id":"a1","artifact":"xyz"}"#).unwrap();
        assert_eq!(ev.account_id(), Some("a1"));
    }
}
