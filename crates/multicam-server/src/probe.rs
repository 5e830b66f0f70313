//! Connectivity check: can this machine open WebSockets to the SFU and to
//! the signaling relay?

use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_tungstenite::connect_async;

pub const LIVEKIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const SIGNALING_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub target: &'static str,
    pub url: String,
    pub success: bool,
    pub latency_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub success: bool,
    pub results: Vec<ProbeResult>,
}

pub async fn run(livekit_url: &str, signaling_url: &str) -> ProbeReport {
    let results = vec![
        probe("livekit", livekit_url, LIVEKIT_TIMEOUT).await,
        probe("signaling", signaling_url, SIGNALING_TIMEOUT).await,
    ];
    ProbeReport {
        success: results.iter().all(|r| r.success),
        results,
    }
}

async fn probe(target: &'static str, url: &str, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    let outcome = match url::Url::parse(url) {
        Err(e) => Err(format!("invalid URL: {e}")),
        Ok(_) => match tokio::time::timeout(timeout, connect_async(url)).await {
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
            Ok(Err(e)) => Err(e.to_string()),
            Ok(Ok((mut ws, _))) => {
                let _ = ws.close(None).await;
                Ok(())
            }
        },
    };

    match outcome {
        Ok(()) => {
            tracing::info!(target_name = target, url = %url, "WebSocket reachable");
            ProbeResult {
                target,
                url: url.to_string(),
                success: true,
                latency_ms: Some(started.elapsed().as_millis()),
                error: None,
            }
        }
        Err(error) => {
            tracing::warn!(target_name = target, url = %url, %error, "WebSocket unreachable");
            ProbeResult {
                target,
                url: url.to_string(),
                success: false,
                latency_ms: None,
                error: Some(error),
            }
        }
    }
}
