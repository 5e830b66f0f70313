//! Full-mesh coordinator.
//!
//! One `MeshSession` per client. It joins the relay once the transport knows
//! its own id, calls every peer the relay reports, answers inbound calls,
//! arbitrates the microphone and periodically samples stats, keep-alives and
//! audio levels. State is published as a `MeshSnapshot` on a watch channel.

use multicam_common::protocol::{SignalMessage, LOCAL_PEER_ID};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::audio::{LoudestMicrophone, MicAutoSwitch};
use crate::error::{MeshError, Result};
use crate::mic::{AudioAction, MicArbiter};
use crate::presence::{CallState, PresenceTracker, RemotePeer};
use crate::stats::{BitrateTracker, VideoStats};
use crate::transport::{PeerTransport, TransportEvent};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay room to join. `None` uses the relay's default room.
    pub room: Option<String>,
    pub setup_timeout: Duration,
    pub stats_interval: Duration,
    pub keepalive_interval: Duration,
    pub audio_interval: Duration,
    /// Outgoing video cap in bits per second.
    pub max_video_bitrate: u32,
    /// Hand the microphone to whichever stream stays loudest.
    pub auto_switch_mic: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room: None,
            setup_timeout: Duration::from_secs(30),
            stats_interval: Duration::from_secs(2),
            keepalive_interval: Duration::from_secs(5),
            audio_interval: Duration::from_millis(100),
            max_video_bitrate: 300_000,
            auto_switch_mic: false,
        }
    }
}

/// Everything a UI needs to render the mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshSnapshot {
    pub own_id: Option<String>,
    pub peers: Vec<RemotePeer>,
    pub stats: BTreeMap<String, VideoStats>,
    pub local_mic_enabled: bool,
    pub remote_audio: BTreeMap<String, bool>,
    pub loudest_stream: Option<String>,
}

/// User intents fed into a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    ToggleLocalMic,
    ToggleRemoteAudio(String),
    Leave,
}

pub struct MeshSession<T: PeerTransport> {
    transport: Arc<T>,
    outbound: mpsc::Sender<SignalMessage>,
    config: SessionConfig,
    presence: PresenceTracker,
    mic: MicArbiter,
    bitrate: BitrateTracker,
    loudest: LoudestMicrophone,
    auto_switch: MicAutoSwitch,
    stats: BTreeMap<String, VideoStats>,
    snapshot: watch::Sender<MeshSnapshot>,
}

impl<T: PeerTransport> MeshSession<T> {
    /// `outbound` carries events to the relay (usually a `SignalingClient`).
    pub fn new(
        transport: Arc<T>,
        outbound: mpsc::Sender<SignalMessage>,
        config: SessionConfig,
    ) -> (Self, watch::Receiver<MeshSnapshot>) {
        let (snapshot, rx) = watch::channel(MeshSnapshot::default());
        let mut loudest = LoudestMicrophone::default();
        loudest.track(LOCAL_PEER_ID);

        let session = Self {
            transport,
            outbound,
            config,
            presence: PresenceTracker::new(),
            mic: MicArbiter::new(),
            bitrate: BitrateTracker::new(),
            loudest,
            auto_switch: MicAutoSwitch::default(),
            stats: BTreeMap::new(),
            snapshot,
        };
        (session, rx)
    }

    /// Drive the session until `Leave`, the command channel closes, or one of
    /// the event sources fails.
    pub async fn run(
        mut self,
        mut transport_events: mpsc::Receiver<TransportEvent>,
        mut signals: mpsc::Receiver<SignalMessage>,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<()> {
        let own_id = self.setup(&mut transport_events).await?;
        tracing::info!(peer = %own_id, "Mesh session ready");

        let start = Instant::now();
        let mut stats_tick = interval_at(start + self.config.stats_interval, self.config.stats_interval);
        let mut keepalive_tick =
            interval_at(start + self.config.keepalive_interval, self.config.keepalive_interval);
        let mut audio_tick = interval_at(start + self.config.audio_interval, self.config.audio_interval);
        for tick in [&mut stats_tick, &mut keepalive_tick, &mut audio_tick] {
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                event = transport_events.recv() => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => return Err(MeshError::TransportClosed),
                },
                signal = signals.recv() => match signal {
                    Some(signal) => self.on_signal(signal).await,
                    None => return Err(MeshError::SignalingClosed),
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Leave) | None => {
                        self.leave().await;
                        return Ok(());
                    }
                    Some(command) => self.on_command(command).await?,
                },
                _ = stats_tick.tick() => self.sample_stats().await,
                _ = keepalive_tick.tick() => self.send_keepalives().await,
                _ = audio_tick.tick() => self.sample_audio().await,
            }
            self.publish();
        }
    }

    /// Wait for the transport's own id, then mute, cap video and join the relay.
    async fn setup(&mut self, events: &mut mpsc::Receiver<TransportEvent>) -> Result<String> {
        let timeout = self.config.setup_timeout;
        let own_id = tokio::time::timeout(timeout, async {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Open { peer_id } => return Ok(peer_id),
                    other => tracing::debug!(event = ?other, "Ignoring transport event before open"),
                }
            }
            Err(MeshError::TransportClosed)
        })
        .await
        .map_err(|_| MeshError::SetupTimeout(timeout))??;

        self.presence.set_own_id(own_id.clone());
        self.transport.set_local_audio(false).await?;
        self.transport
            .set_max_video_bitrate(self.config.max_video_bitrate)
            .await?;
        self.send(SignalMessage::JoinRoom {
            peer_id: own_id.clone(),
            room: self.config.room.clone(),
        })
        .await?;
        self.publish();
        Ok(own_id)
    }

    async fn on_signal(&mut self, signal: SignalMessage) {
        match signal {
            SignalMessage::PeerList(peers) => {
                tracing::debug!(count = peers.len(), "Received peer list");
                // A fresh snapshot (e.g. after a reconnect) replaces what we track.
                for peer_id in self.presence.peer_ids() {
                    if !peers.contains(&peer_id) {
                        self.drop_peer(&peer_id).await;
                    }
                }
                for peer_id in peers {
                    self.call(&peer_id).await;
                }
            }
            SignalMessage::PeerJoined(peer_id) => self.call(&peer_id).await,
            SignalMessage::PeerLeft(peer_id) => self.drop_peer(&peer_id).await,
            SignalMessage::MicToggle { peer_id, enabled } => {
                let actions = self
                    .mic
                    .on_mic_toggle(self.presence.own_id(), &peer_id, enabled);
                self.apply(actions).await;
            }
            SignalMessage::Error { code, message } => {
                tracing::warn!(code, %message, "Relay reported an error");
            }
            SignalMessage::HeartbeatAck { timestamp } => {
                tracing::trace!(timestamp, "Heartbeat acknowledged");
            }
            other => tracing::debug!(event = other.event_name(), "Ignoring relay event"),
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open { peer_id } => {
                tracing::warn!(peer = %peer_id, "Transport reopened after setup; ignoring");
            }
            TransportEvent::IncomingCall { peer_id } => {
                if self.presence.is_ignored(&peer_id) {
                    return;
                }
                if !self.presence.track(&peer_id, CallState::Answered) {
                    self.presence.set_state(&peer_id, CallState::Answered);
                }
                if let Err(e) = self.transport.answer(&peer_id).await {
                    tracing::warn!(peer = %peer_id, error = %e, "Failed to answer call");
                    self.presence.set_state(&peer_id, CallState::Closed);
                }
            }
            TransportEvent::RemoteStream {
                peer_id,
                audio_enabled,
            } => {
                if self.presence.is_ignored(&peer_id) {
                    return;
                }
                if !self.presence.set_state(&peer_id, CallState::Connected) {
                    self.presence.track(&peer_id, CallState::Connected);
                }
                self.mic.add_remote(&peer_id, audio_enabled);
                self.loudest.track(&peer_id);
                tracing::info!(peer = %peer_id, "Remote stream connected");
            }
            TransportEvent::CallClosed { peer_id } => {
                tracing::info!(peer = %peer_id, "Call closed");
                self.presence.set_state(&peer_id, CallState::Closed);
            }
            TransportEvent::CallError { peer_id, message } => {
                tracing::warn!(peer = %peer_id, error = %message, "Call error");
                self.presence.set_state(&peer_id, CallState::Closed);
            }
        }
    }

    async fn on_command(&mut self, command: SessionCommand) -> Result<()> {
        let Some(own_id) = self.presence.own_id().map(str::to_string) else {
            return Ok(());
        };
        let toggled = match command {
            SessionCommand::ToggleLocalMic => Some(self.mic.toggle_local(&own_id)),
            SessionCommand::ToggleRemoteAudio(peer_id) => self.mic.toggle_remote(&peer_id),
            SessionCommand::Leave => None,
        };
        if let Some((action, message)) = toggled {
            self.apply(vec![action]).await;
            self.send(message).await?;
        }
        Ok(())
    }

    async fn call(&mut self, peer_id: &str) {
        if !self.presence.track(peer_id, CallState::Calling) {
            return;
        }
        tracing::debug!(peer = %peer_id, "Calling peer");
        if let Err(e) = self.transport.call(peer_id).await {
            tracing::warn!(peer = %peer_id, error = %e, "Failed to call peer");
            self.presence.set_state(peer_id, CallState::Closed);
        }
    }

    async fn drop_peer(&mut self, peer_id: &str) {
        if self.presence.remove(peer_id).is_none() {
            return;
        }
        self.stats.remove(peer_id);
        self.bitrate.forget(peer_id);
        self.mic.remove_remote(peer_id);
        self.loudest.untrack(peer_id);
        self.auto_switch.forget(peer_id);
        if let Err(e) = self.transport.hang_up(peer_id).await {
            tracing::debug!(peer = %peer_id, error = %e, "Hang up failed");
        }
        tracing::info!(peer = %peer_id, "Peer left");
    }

    async fn apply(&self, actions: Vec<AudioAction>) {
        for action in actions {
            let result = match &action {
                AudioAction::Local { enabled } => self.transport.set_local_audio(*enabled).await,
                AudioAction::Remote { peer_id, enabled } => {
                    self.transport.set_remote_audio(peer_id, *enabled).await
                }
            };
            if let Err(e) = result {
                tracing::warn!(action = ?action, error = %e, "Failed to apply audio change");
            }
        }
    }

    async fn sample_stats(&mut self) {
        for peer_id in self.presence.connected() {
            match self.transport.get_stats(&peer_id).await {
                Ok(report) => {
                    let mut stats = VideoStats::from_report(&report);
                    self.bitrate
                        .update(&peer_id, &mut stats, Instant::now().into_std());
                    self.stats.insert(peer_id, stats);
                }
                Err(e) => tracing::debug!(peer = %peer_id, error = %e, "Stats unavailable"),
            }
        }
    }

    async fn send_keepalives(&self) {
        for peer_id in self.presence.connected() {
            if let Err(e) = self.transport.send_keepalive(&peer_id).await {
                tracing::debug!(peer = %peer_id, error = %e, "Keep-alive failed");
            }
        }
    }

    async fn sample_audio(&mut self) {
        for stream_id in self.loudest.stream_ids() {
            if let Ok(Some(bins)) = self.transport.frequency_data(&stream_id).await {
                self.loudest.update(&stream_id, &bins);
            }
        }
        if self.config.auto_switch_mic {
            self.auto_switch_mic().await;
        }
    }

    async fn auto_switch_mic(&mut self) {
        let threshold = self.auto_switch.threshold();
        let candidate = self.loudest.loudest_above(threshold);
        let Some(stream_id) = self.auto_switch.observe(candidate, Instant::now()) else {
            return;
        };
        let was_local = self.mic.local_enabled();
        let actions = self.mic.activate_only(&stream_id);
        self.apply(actions).await;

        // Peers learn about our own microphone the same way a manual toggle does.
        let local = self.mic.local_enabled();
        if local != was_local {
            if let Some(own_id) = self.presence.own_id().map(str::to_string) {
                let _ = self
                    .send(SignalMessage::MicToggle {
                        peer_id: own_id,
                        enabled: local,
                    })
                    .await;
            }
        }
    }

    async fn leave(&mut self) {
        let _ = self.outbound.send(SignalMessage::LeaveRoom).await;
        for peer_id in self.presence.peer_ids() {
            let _ = self.transport.hang_up(&peer_id).await;
        }
        tracing::info!("Left mesh");
    }

    async fn send(&self, message: SignalMessage) -> Result<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| MeshError::SignalingClosed)
    }

    fn snapshot(&self) -> MeshSnapshot {
        MeshSnapshot {
            own_id: self.presence.own_id().map(str::to_string),
            peers: self.presence.snapshot(),
            stats: self.stats.clone(),
            local_mic_enabled: self.mic.local_enabled(),
            remote_audio: self.mic.remote_audio().clone(),
            loudest_stream: self.loudest.loudest().map(str::to_string),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
