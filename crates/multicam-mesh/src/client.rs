//! WebSocket client for the signaling relay, with heartbeat and
//! auto-reconnect.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use multicam_common::protocol::SignalMessage;
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{MeshError, Result};

const DEFAULT_RELAY: &str = "ws://localhost:4000/socket";
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Relay connection that survives disconnects.
///
/// The last `join-room` sent through it is replayed after every reconnect,
/// and a `leave-room` clears it.
///
/// ```rust,no_run
/// use multicam_common::protocol::SignalMessage;
/// use multicam_mesh::client::SignalingClient;
/// use tokio::sync::mpsc;
///
/// #[tokio::main]
/// async fn main() -> multicam_mesh::Result<()> {
///     let (out_tx, out_rx) = mpsc::channel(64);
///     let (in_tx, mut in_rx) = mpsc::channel(64);
///     tokio::spawn(SignalingClient::new(None).run(out_rx, in_tx));
///
///     out_tx
///         .send(SignalMessage::JoinRoom { peer_id: "cam-1".into(), room: None })
///         .await
///         .ok();
///     while let Some(event) = in_rx.recv().await {
///         println!("{}", event.event_name());
///     }
///     Ok(())
/// }
/// ```
pub struct SignalingClient {
    url: String,
    heartbeat_interval: Duration,
    max_reconnect: u32,
    backoff_base: Duration,
}

enum Disconnect {
    /// The local side is done; stop for good.
    Shutdown,
    /// The relay went away; try again.
    Lost,
}

impl SignalingClient {
    pub fn new(url: Option<&str>) -> Self {
        Self {
            url: url.unwrap_or(DEFAULT_RELAY).to_owned(),
            heartbeat_interval: Duration::from_secs(25),
            max_reconnect: 10,
            backoff_base: Duration::from_secs(1),
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_max_reconnect(mut self, attempts: u32) -> Self {
        self.max_reconnect = attempts;
        self
    }

    /// Delay unit for reconnects: attempt `n` waits `base * 2^n`, capped
    /// at 30 seconds.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Pump `outbound` to the relay and relay events into `inbound` until
    /// either channel closes or reconnect attempts run out.
    pub async fn run(
        self,
        mut outbound: mpsc::Receiver<SignalMessage>,
        inbound: mpsc::Sender<SignalMessage>,
    ) -> Result<()> {
        let mut attempts = 0u32;
        let mut joined: Option<SignalMessage> = None;

        loop {
            let outcome = run_once(
                &self.url,
                self.heartbeat_interval,
                &mut outbound,
                &inbound,
                &mut joined,
                &mut attempts,
            )
            .await;

            let reason = match outcome {
                Ok(Disconnect::Shutdown) => return Ok(()),
                Ok(Disconnect::Lost) => "connection closed".to_string(),
                Err(e) => e.to_string(),
            };

            attempts += 1;
            if attempts > self.max_reconnect {
                warn!(url = %self.url, "Signaling: giving up after {} attempts", attempts - 1);
                return Err(MeshError::ReconnectExhausted {
                    attempts: attempts - 1,
                });
            }
            let delay = backoff_delay(self.backoff_base, attempts);
            warn!("Signaling: disconnected ({reason}), reconnecting in {delay:?} (attempt {attempts})");
            sleep(delay).await;
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

async fn run_once(
    url: &str,
    hb_interval: Duration,
    outbound: &mut mpsc::Receiver<SignalMessage>,
    inbound: &mpsc::Sender<SignalMessage>,
    joined: &mut Option<SignalMessage>,
    attempts: &mut u32,
) -> Result<Disconnect> {
    let (ws, _) = connect_async(url).await?;
    *attempts = 0;
    info!(url = %url, "Signaling: connected");
    let (mut sink, mut stream) = ws.split();

    if let Some(join) = joined.as_ref() {
        sink.send(Message::Text(join.to_json()?.into())).await?;
    }

    let mut heartbeat = interval_at(Instant::now() + hb_interval, hb_interval);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let Some(msg) = msg else { return Ok(Disconnect::Lost) };
                let text = match msg? {
                    Message::Text(t) => t,
                    Message::Close(_) => return Ok(Disconnect::Lost),
                    _ => continue,
                };
                match serde_json::from_str::<SignalMessage>(text.as_str()) {
                    Ok(event) => {
                        if inbound.send(event).await.is_err() {
                            let _ = sink.send(Message::Close(None)).await;
                            return Ok(Disconnect::Shutdown);
                        }
                    }
                    Err(e) => debug!(error = %e, "Signaling: ignoring unparseable frame"),
                }
            }
            out = outbound.recv() => {
                let Some(message) = out else {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(Disconnect::Shutdown);
                };
                match &message {
                    SignalMessage::JoinRoom { .. } => *joined = Some(message.clone()),
                    SignalMessage::LeaveRoom => *joined = None,
                    _ => {}
                }
                sink.send(Message::Text(message.to_json()?.into())).await?;
            }
            _ = heartbeat.tick() => {
                let beat = SignalMessage::Heartbeat {
                    timestamp: chrono::Utc::now().timestamp_millis(),
                };
                sink.send(Message::Text(beat.to_json()?.into())).await?;
            }
        }
    }
}
