//! Microphone levels and loudest-speaker detection.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Analyser FFT size 256 gives this many frequency bins.
pub const FREQUENCY_BIN_COUNT: usize = 128;

/// Weight of the previous smoothed value.
pub const SMOOTHING_FACTOR: f32 = 0.8;

/// Smoothed volumes at or below this count as silence.
pub const SILENCE_THRESHOLD: f32 = 5.0;

/// Smoothed volume a stream needs before it can take over the microphone.
pub const AUTO_SWITCH_THRESHOLD: f32 = 30.0;

/// How long a new candidate must stay loudest before the switch happens.
pub const AUTO_SWITCH_DELAY: Duration = Duration::from_secs(1);

/// Mean of byte frequency magnitudes, 0..=255.
pub fn audio_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / bins.len() as f32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamVolume {
    pub volume: f32,
    pub smoothed: f32,
}

/// Tracks a smoothed volume per stream (remote peers plus `local`) and picks
/// the loudest one that is not silent.
#[derive(Debug)]
pub struct LoudestMicrophone {
    streams: BTreeMap<String, StreamVolume>,
    smoothing: f32,
    threshold: f32,
}

impl Default for LoudestMicrophone {
    fn default() -> Self {
        Self::new(SMOOTHING_FACTOR, SILENCE_THRESHOLD)
    }
}

impl LoudestMicrophone {
    pub fn new(smoothing: f32, threshold: f32) -> Self {
        Self {
            streams: BTreeMap::new(),
            smoothing,
            threshold,
        }
    }

    pub fn track(&mut self, stream_id: &str) {
        self.streams
            .entry(stream_id.to_string())
            .or_insert(StreamVolume {
                volume: 0.0,
                smoothed: 0.0,
            });
    }

    pub fn untrack(&mut self, stream_id: &str) {
        self.streams.remove(stream_id);
    }

    pub fn stream_ids(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    pub fn volume(&self, stream_id: &str) -> Option<StreamVolume> {
        self.streams.get(stream_id).copied()
    }

    /// Feed one sample for a tracked stream and return its smoothed volume.
    pub fn update(&mut self, stream_id: &str, bins: &[u8]) -> Option<f32> {
        let smoothing = self.smoothing;
        let entry = self.streams.get_mut(stream_id)?;
        let level = audio_level(bins);
        entry.volume = level;
        entry.smoothed = smoothing * entry.smoothed + (1.0 - smoothing) * level;
        Some(entry.smoothed)
    }

    pub fn loudest(&self) -> Option<&str> {
        self.loudest_above(self.threshold).map(|(id, _)| id)
    }

    /// Loudest stream whose smoothed volume exceeds `threshold`.
    pub fn loudest_above(&self, threshold: f32) -> Option<(&str, f32)> {
        self.streams
            .iter()
            .filter(|(_, v)| v.smoothed > threshold)
            .max_by(|(_, a), (_, b)| a.smoothed.total_cmp(&b.smoothed))
            .map(|(id, v)| (id.as_str(), v.smoothed))
    }
}

/// Debounced "loudest microphone wins" policy.
///
/// A stream becomes the active microphone once it has been the loudest one
/// above the threshold for the whole switch delay. A different candidate, or
/// no candidate at all, restarts the wait.
#[derive(Debug)]
pub struct MicAutoSwitch {
    threshold: f32,
    delay: Duration,
    active: Option<String>,
    pending: Option<(String, Instant)>,
}

impl Default for MicAutoSwitch {
    fn default() -> Self {
        Self::new(AUTO_SWITCH_THRESHOLD, AUTO_SWITCH_DELAY)
    }
}

impl MicAutoSwitch {
    pub fn new(threshold: f32, delay: Duration) -> Self {
        Self {
            threshold,
            delay,
            active: None,
            pending: None,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Feed the current loudest stream and its level. Returns the stream id
    /// when it has just become the active microphone.
    pub fn observe(&mut self, candidate: Option<(&str, f32)>, now: Instant) -> Option<String> {
        let Some((id, level)) = candidate.filter(|(_, level)| *level > self.threshold) else {
            self.pending = None;
            return None;
        };
        if self.active.as_deref() == Some(id) {
            self.pending = None;
            return None;
        }

        match &self.pending {
            Some((pending, since)) if pending == id => {
                if now.saturating_duration_since(*since) < self.delay {
                    return None;
                }
                tracing::info!(from = ?self.active, to = %id, level, "Switching active microphone");
                self.pending = None;
                self.active = Some(id.to_string());
                self.active.clone()
            }
            _ => {
                tracing::debug!(candidate = %id, level, "Microphone switch candidate");
                self.pending = Some((id.to_string(), now));
                None
            }
        }
    }

    /// A stream went away; it can no longer be active or pending.
    pub fn forget(&mut self, stream_id: &str) {
        if self.active.as_deref() == Some(stream_id) {
            self.active = None;
        }
        if self.pending.as_ref().is_some_and(|(id, _)| id == stream_id) {
            self.pending = None;
        }
    }
}
