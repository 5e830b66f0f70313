//! Inbound video statistics pulled from a WebRTC stats report.
//!
//! Reports arrive as the JSON form of a W3C `RTCStatsReport`: a flat list of
//! objects keyed by `id` and discriminated by `type`.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStats {
    /// Bits per second since the previous sample. Absent on the first one.
    pub bitrate: Option<f64>,
    pub bytes_received: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Codec mime type, e.g. `video/VP8`.
    pub codec: Option<String>,
    pub frames_per_second: Option<f64>,
    pub frames_decoded: Option<u64>,
    pub frames_dropped: Option<u64>,
    pub jitter: Option<f64>,
    pub packets_lost: Option<i64>,
    pub packets_received: Option<u64>,
    /// Mean decode time per frame in seconds.
    pub frame_delay: Option<f64>,
}

impl VideoStats {
    pub fn from_report(report: &[Value]) -> Self {
        let mut stats = VideoStats::default();
        let mut codec_id = None;

        for s in report {
            match s.get("type").and_then(Value::as_str) {
                Some("inbound-rtp") if s.get("kind").and_then(Value::as_str) == Some("video") => {
                    set_u64(&mut stats.bytes_received, s, "bytesReceived");
                    set_f64(&mut stats.jitter, s, "jitter");
                    if let Some(v) = s.get("packetsLost").and_then(Value::as_i64) {
                        stats.packets_lost = Some(v);
                    }
                    set_u64(&mut stats.packets_received, s, "packetsReceived");
                    if let Some(id) = s.get("codecId").and_then(Value::as_str) {
                        codec_id = Some(id.to_string());
                    }
                    stats.apply_frame_fields(s);
                }
                Some("track") => stats.apply_frame_fields(s),
                _ => {}
            }
        }

        if let Some(codec_id) = codec_id {
            stats.codec = report
                .iter()
                .find(|s| s.get("id").and_then(Value::as_str) == Some(codec_id.as_str()))
                .and_then(|s| s.get("mimeType"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        stats
    }

    fn apply_frame_fields(&mut self, s: &Value) {
        if let (Some(w), Some(h)) = (
            s.get("frameWidth").and_then(Value::as_u64),
            s.get("frameHeight").and_then(Value::as_u64),
        ) {
            self.width = u32::try_from(w).ok();
            self.height = u32::try_from(h).ok();
        }
        set_f64(&mut self.frames_per_second, s, "framesPerSecond");
        set_u64(&mut self.frames_decoded, s, "framesDecoded");
        set_u64(&mut self.frames_dropped, s, "framesDropped");

        let decoded = s.get("framesDecoded").and_then(Value::as_u64).unwrap_or(0);
        if let Some(total) = s.get("totalDecodeTime").and_then(Value::as_f64) {
            if decoded > 0 {
                self.frame_delay = Some(total / decoded as f64);
            }
        }
    }
}

fn set_u64(field: &mut Option<u64>, s: &Value, key: &str) {
    if let Some(v) = s.get(key).and_then(Value::as_u64) {
        *field = Some(v);
    }
}

fn set_f64(field: &mut Option<f64>, s: &Value, key: &str) {
    if let Some(v) = s.get(key).and_then(Value::as_f64) {
        *field = Some(v);
    }
}

/// Turns cumulative `bytes_received` counters into a bitrate per peer.
#[derive(Debug, Default)]
pub struct BitrateTracker {
    last: HashMap<String, (u64, Instant)>,
}

impl BitrateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in `stats.bitrate` from the previous sample of `peer_id`.
    pub fn update(&mut self, peer_id: &str, stats: &mut VideoStats, at: Instant) {
        let Some(bytes) = stats.bytes_received else {
            stats.bitrate = None;
            return;
        };

        stats.bitrate = match self.last.get(peer_id) {
            Some(&(prev_bytes, prev_at)) if bytes >= prev_bytes => {
                let elapsed = at.saturating_duration_since(prev_at).as_secs_f64();
                (elapsed > 0.0).then(|| (bytes - prev_bytes) as f64 * 8.0 / elapsed)
            }
            // Counter went backwards: the peer connection was replaced.
            _ => None,
        };

        self.last.insert(peer_id.to_string(), (bytes, at));
    }

    pub fn forget(&mut self, peer_id: &str) {
        self.last.remove(peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn chrome_report() -> Vec<Value> {
        vec![
            json!({
                "id": "IT01V", "type": "inbound-rtp", "kind": "video",
                "bytesReceived": 250_000, "codecId": "CIT01_96", "jitter": 0.012,
                "packetsLost": 3, "packetsReceived": 900
            }),
            json!({
                "id": "IT01A", "type": "inbound-rtp", "kind": "audio",
                "bytesReceived": 9_000, "codecId": "CIT01_111"
            }),
            json!({
                "id": "DEPRECATED_TI1", "type": "track", "kind": "video",
                "frameWidth": 640, "frameHeight": 360, "framesPerSecond": 29.5,
                "framesDecoded": 600, "framesDropped": 4, "totalDecodeTime": 3.0
            }),
            json!({ "id": "CIT01_96", "type": "codec", "mimeType": "video/VP8" }),
            json!({ "id": "CIT01_111", "type": "codec", "mimeType": "audio/opus" }),
        ]
    }

    #[test]
    fn extracts_video_fields() {
        let stats = VideoStats::from_report(&chrome_report());

        assert_eq!(stats.bytes_received, Some(250_000));
        assert_eq!(stats.codec.as_deref(), Some("video/VP8"));
        assert_eq!(stats.jitter, Some(0.012));
        assert_eq!(stats.packets_lost, Some(3));
        assert_eq!(stats.packets_received, Some(900));
        assert_eq!((stats.width, stats.height), (Some(640), Some(360)));
        assert_eq!(stats.frames_per_second, Some(29.5));
        assert_eq!(stats.frames_decoded, Some(600));
        assert_eq!(stats.frames_dropped, Some(4));
        assert_eq!(stats.frame_delay, Some(0.005));
        assert_eq!(stats.bitrate, None);
    }

    #[test]
    fn empty_report_yields_nothing() {
        assert_eq!(VideoStats::from_report(&[]), VideoStats::default());
    }

    #[test]
    fn no_frame_delay_without_decoded_frames() {
        let report = vec![json!({
            "id": "T", "type": "track", "framesDecoded": 0, "totalDecodeTime": 1.0
        })];
        assert_eq!(VideoStats::from_report(&report).frame_delay, None);
    }

    #[test]
    fn bitrate_comes_from_byte_delta() {
        let mut tracker = BitrateTracker::new();
        let t0 = Instant::now();

        let mut first = VideoStats {
            bytes_received: Some(100_000),
            ..Default::default()
        };
        tracker.update("a", &mut first, t0);
        assert_eq!(first.bitrate, None);

        let mut second = VideoStats {
            bytes_received: Some(175_000),
            ..Default::default()
        };
        tracker.update("a", &mut second, t0 + Duration::from_secs(2));
        assert_eq!(second.bitrate, Some(300_000.0));
    }

    #[test]
    fn counter_reset_drops_bitrate() {
        let mut tracker = BitrateTracker::new();
        let t0 = Instant::now();
        let mut s = VideoStats {
            bytes_received: Some(50_000),
            ..Default::default()
        };
        tracker.update("a", &mut s, t0);

        s.bytes_received = Some(1_000);
        tracker.update("a", &mut s, t0 + Duration::from_secs(2));
        assert_eq!(s.bitrate, None);

        tracker.forget("a");
        s.bytes_received = Some(2_000);
        tracker.update("a", &mut s, t0 + Duration::from_secs(4));
        assert_eq!(s.bitrate, None);
    }
}
