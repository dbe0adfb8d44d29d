//! The coordinator: one tokio task that owns every state machine.
//!
//! Signals, host traffic, timers and client requests all arrive as
//! [`CoordinatorEvent`]s on a single unbounded queue and are handled one at a
//! time, so the core invariants hold between events without locking. Timers
//! are spawned sleeps that post an event back; cancelling one aborts its task
//! and the core state machines ignore any stale id that slips through.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use admute_core::ad_window::{AdWindowOutput, AdWindowTracker};
use admute_core::arbitration::{MuteArbitration, MuteEffect};
use admute_core::connection::{ConnectionAction, ConnectionState};
use admute_core::protocol::{CommandOutcome, HostCommand, HostResponse};
use admute_core::signal::BeaconFilter;
use admute_core::status::StatusSnapshot;
use admute_core::types::{SourceId, SurfaceId, TimerId};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::channel::{ChannelError, HostConnector, HostLink, LinkId};
use crate::config::CoordinatorConfig;
use crate::fallback::SurfaceMuter;

#[derive(Debug)]
pub enum CoordinatorEvent {
    /// Level signal: `origin` reports whether an ad is showing on `surface`.
    AdPresence {
        surface: SurfaceId,
        origin: String,
        present: bool,
    },
    /// Burst signal. `url: None` means the caller already filtered it.
    Beacon {
        surface: SurfaceId,
        url: Option<String>,
    },
    SurfaceClosed {
        surface: SurfaceId,
    },
    Retry,
    Status(oneshot::Sender<StatusSnapshot>),
    OpenFinished {
        link_id: LinkId,
        result: Result<HostLink, ChannelError>,
    },
    ReconnectDue(TimerId),
    SilenceElapsed {
        surface: SurfaceId,
        timer: TimerId,
    },
    HostResponse {
        link_id: LinkId,
        response: HostResponse,
    },
    HostClosed {
        link_id: LinkId,
        reason: String,
    },
    Shutdown,
}

#[derive(Debug, Error)]
#[error("coordinator is not running")]
pub struct CoordinatorGone;

/// Cloneable front door used by the server and the daemon.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
    status: watch::Receiver<StatusSnapshot>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<CoordinatorEvent>,
        status: watch::Receiver<StatusSnapshot>,
    ) -> Self {
        Self { tx, status }
    }

    fn post(&self, event: CoordinatorEvent) -> Result<(), CoordinatorGone> {
        self.tx.send(event).map_err(|_| CoordinatorGone)
    }

    pub fn ad_presence(
        &self,
        surface: SurfaceId,
        origin: impl Into<String>,
        present: bool,
    ) -> Result<(), CoordinatorGone> {
        self.post(CoordinatorEvent::AdPresence {
            surface,
            origin: origin.into(),
            present,
        })
    }

    pub fn beacon(&self, surface: SurfaceId, url: Option<String>) -> Result<(), CoordinatorGone> {
        self.post(CoordinatorEvent::Beacon { surface, url })
    }

    pub fn surface_closed(&self, surface: SurfaceId) -> Result<(), CoordinatorGone> {
        self.post(CoordinatorEvent::SurfaceClosed { surface })
    }

    pub fn retry(&self) -> Result<(), CoordinatorGone> {
        self.post(CoordinatorEvent::Retry)
    }

    /// Snapshot taken after every event queued before this call.
    pub async fn status(&self) -> Result<StatusSnapshot, CoordinatorGone> {
        let (tx, rx) = oneshot::channel();
        self.post(CoordinatorEvent::Status(tx))?;
        rx.await.map_err(|_| CoordinatorGone)
    }

    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.post(CoordinatorEvent::Shutdown);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TimerKey {
    Reconnect(TimerId),
    Silence(SurfaceId, TimerId),
}

pub struct Coordinator<C, M> {
    connector: Arc<C>,
    muter: M,
    beacon_filter: BeaconFilter,

    connection: ConnectionState,
    arbitration: MuteArbitration,
    windows: AdWindowTracker,

    link: Option<HostLink>,
    opening: Option<LinkId>,
    /// Set when the link being opened reported closure before `OpenFinished`.
    closed_while_opening: Option<String>,
    next_link_id: LinkId,
    /// Commands written to the current link, oldest first. The host answers
    /// in order, so each response belongs to the front entry.
    in_flight: VecDeque<HostCommand>,

    timers: HashMap<TimerKey, AbortHandle>,
    events_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
    status_tx: watch::Sender<StatusSnapshot>,
    started: Instant,
}

impl<C: HostConnector, M: SurfaceMuter> Coordinator<C, M> {
    pub fn new(config: &CoordinatorConfig, connector: C, muter: M) -> (Self, CoordinatorHandle) {
        let connection = ConnectionState::new(config.reconnect.clone());
        let arbitration = MuteArbitration::new(config.arbitration.clone());
        let windows = AdWindowTracker::new(config.ad_window.clone());
        let initial = StatusSnapshot::capture(&connection, &arbitration, &windows);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(initial);
        let handle = CoordinatorHandle::new(events_tx.clone(), status_rx);

        let coordinator = Self {
            connector: Arc::new(connector),
            muter,
            beacon_filter: config.beacon_filter.clone(),
            connection,
            arbitration,
            windows,
            link: None,
            opening: None,
            closed_while_opening: None,
            next_link_id: 1,
            in_flight: VecDeque::new(),
            timers: HashMap::new(),
            events_tx,
            events_rx,
            status_tx,
            started: Instant::now(),
        };
        (coordinator, handle)
    }

    /// Connect eagerly, then handle events until `Shutdown`.
    pub async fn run(mut self) {
        tracing::info!("coordinator started");
        let actions = self.connection.connect();
        self.apply_actions(actions);
        self.publish_status();

        while let Some(event) = self.events_rx.recv().await {
            if matches!(event, CoordinatorEvent::Shutdown) {
                break;
            }
            self.handle_event(event);
            self.publish_status();
        }

        self.release_everything();
        for (_, timer) in self.timers.drain() {
            timer.abort();
        }
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        tracing::info!("coordinator stopped");
    }

    fn handle_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::AdPresence {
                surface,
                origin,
                present,
            } => {
                let source = SourceId::new(origin, surface);
                tracing::debug!(source = %source, present, "level signal");
                if present {
                    self.request_mute(source);
                } else {
                    self.request_unmute(&source);
                }
            }
            CoordinatorEvent::Beacon { surface, url } => {
                if let Some(ref url) = url
                    && !self.beacon_filter.matches(url)
                {
                    tracing::trace!(surface = %surface, url = %url, "beacon not on allowlist");
                    return;
                }
                let outputs = self.windows.on_beacon(&surface, self.now_ms());
                self.apply_window_outputs(outputs);
            }
            CoordinatorEvent::SurfaceClosed { surface } => {
                tracing::debug!(surface = %surface, "surface closed");
                let outputs = self.windows.close_surface(&surface);
                self.apply_window_outputs(outputs);
                let effects = self
                    .arbitration
                    .release_surface(&surface, self.connection.is_connected());
                self.apply_effects(effects);
            }
            CoordinatorEvent::Retry => {
                tracing::info!("manual retry");
                self.arbitration.reset();
                let actions = self.connection.retry();
                self.apply_actions(actions);
            }
            CoordinatorEvent::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
            CoordinatorEvent::OpenFinished { link_id, result } => {
                self.on_open_finished(link_id, result);
            }
            CoordinatorEvent::ReconnectDue(timer) => {
                self.timers.remove(&TimerKey::Reconnect(timer));
                let actions = self.connection.on_reconnect_due(timer);
                self.apply_actions(actions);
            }
            CoordinatorEvent::SilenceElapsed { surface, timer } => {
                self.timers.remove(&TimerKey::Silence(surface.clone(), timer));
                let outputs = self.windows.on_silence_elapsed(&surface, timer);
                self.apply_window_outputs(outputs);
            }
            CoordinatorEvent::HostResponse { link_id, response } => {
                if !self.is_current_link(link_id) {
                    tracing::debug!(link_id, "response from stale link ignored");
                    return;
                }
                self.on_host_response(response);
            }
            CoordinatorEvent::HostClosed { link_id, reason } => {
                if self.opening == Some(link_id) {
                    tracing::debug!(link_id, %reason, "host closed before open finished");
                    self.closed_while_opening = Some(reason);
                    return;
                }
                if !self.is_current_link(link_id) {
                    tracing::debug!(link_id, "closure of stale link ignored");
                    return;
                }
                self.link_lost(reason, None);
            }
            CoordinatorEvent::Shutdown => {}
        }
    }

    // ─── Arbitration glue ─────────────────────────────────────────

    fn request_mute(&mut self, source: SourceId) {
        let effects = self
            .arbitration
            .request_mute(source, self.connection.is_connected());
        self.apply_effects(effects);
    }

    fn request_unmute(&mut self, source: &SourceId) {
        let effects = self
            .arbitration
            .request_unmute(source, self.connection.is_connected());
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<MuteEffect>) {
        for effect in effects {
            match effect {
                MuteEffect::QueryStatus => {
                    let actions = self.connection.send(HostCommand::GetStatus);
                    self.apply_actions(actions);
                }
                MuteEffect::Send(command) | MuteEffect::SendDirect(command) => {
                    let actions = self.connection.send(command);
                    self.apply_actions(actions);
                }
                MuteEffect::FallbackMute(surface) => {
                    self.muter.set_surface_muted(&surface, true);
                }
                MuteEffect::FallbackUnmute(surface) => {
                    self.muter.set_surface_muted(&surface, false);
                }
            }
        }
    }

    fn apply_window_outputs(&mut self, outputs: Vec<AdWindowOutput>) {
        for output in outputs {
            match output {
                AdWindowOutput::AdStarted(surface) => {
                    self.request_mute(SourceId::network(surface));
                }
                AdWindowOutput::AdEnded(surface) => {
                    self.request_unmute(&SourceId::network(surface));
                }
                AdWindowOutput::ArmSilence {
                    surface,
                    timer,
                    delay_ms,
                } => {
                    let event = CoordinatorEvent::SilenceElapsed {
                        surface: surface.clone(),
                        timer,
                    };
                    self.schedule(TimerKey::Silence(surface, timer), delay_ms, event);
                }
                AdWindowOutput::CancelSilence { surface, timer } => {
                    self.cancel_timer(&TimerKey::Silence(surface, timer));
                }
            }
        }
    }

    /// Drop every mute source so nothing stays muted after exit.
    fn release_everything(&mut self) {
        let mut surfaces: Vec<SurfaceId> = self
            .arbitration
            .active_sources()
            .iter()
            .chain(self.arbitration.premuted_sources())
            .chain(self.arbitration.pending_check().into_iter().flat_map(|c| &c.requesters))
            .map(|s| s.surface.clone())
            .chain(self.arbitration.fallback_muted().iter().cloned())
            .chain(self.windows.active_surfaces())
            .collect();
        surfaces.sort();
        surfaces.dedup();
        for surface in surfaces {
            let outputs = self.windows.close_surface(&surface);
            self.apply_window_outputs(outputs);
            let effects = self
                .arbitration
                .release_surface(&surface, self.connection.is_connected());
            self.apply_effects(effects);
        }
    }

    // ─── Connection glue ──────────────────────────────────────────

    fn apply_actions(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::Open => self.open_link(),
                ConnectionAction::Deliver(command) => self.deliver(command),
                ConnectionAction::ScheduleReconnect {
                    timer,
                    attempt,
                    delay_ms,
                } => {
                    tracing::info!(attempt, delay_ms, "host reconnect scheduled");
                    self.schedule(
                        TimerKey::Reconnect(timer),
                        delay_ms,
                        CoordinatorEvent::ReconnectDue(timer),
                    );
                }
                ConnectionAction::CancelReconnect(timer) => {
                    self.cancel_timer(&TimerKey::Reconnect(timer));
                }
                ConnectionAction::GaveUp => {
                    tracing::error!(
                        last_error = ?self.connection.last_error().map(|e| &e.reason),
                        "host channel unusable; falling back to per-surface muting"
                    );
                    self.arbitration.on_connection_given_up();
                }
            }
        }
    }

    fn open_link(&mut self) {
        // A new attempt supersedes whatever link or attempt came before.
        self.link = None;
        self.in_flight.clear();

        let link_id = self.next_link_id;
        self.next_link_id += 1;
        self.opening = Some(link_id);
        self.closed_while_opening = None;
        tracing::debug!(link_id, "opening host channel");

        let connector = Arc::clone(&self.connector);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = connector.open(link_id, events.clone()).await;
            let _ = events.send(CoordinatorEvent::OpenFinished { link_id, result });
        });
    }

    fn on_open_finished(&mut self, link_id: LinkId, result: Result<HostLink, ChannelError>) {
        if self.opening != Some(link_id) {
            tracing::debug!(link_id, "stale open result dropped");
            return;
        }
        self.opening = None;
        let result = match (result, self.closed_while_opening.take()) {
            (Ok(_dead), Some(reason)) => Err(ChannelError::Handshake(reason)),
            (result, _) => result,
        };
        match result {
            Ok(link) => {
                tracing::info!(link_id, "host channel connected");
                self.link = Some(link);
                self.in_flight.clear();
                let actions = self.connection.on_open_succeeded();
                self.apply_actions(actions);
            }
            Err(e) => {
                tracing::warn!(link_id, error = %e, "host channel open failed");
                let actions = self.connection.on_open_failed(e.to_string(), Utc::now());
                self.apply_actions(actions);
            }
        }
    }

    fn deliver(&mut self, command: HostCommand) {
        let sent = match self.link.as_ref() {
            Some(link) => link.send(command).map_err(|e| e.to_string()),
            None => Err("no host link".to_string()),
        };
        match sent {
            Ok(()) => self.in_flight.push_back(command),
            Err(reason) => self.link_lost(reason, Some(command)),
        }
    }

    /// The current link broke. In-flight and undelivered state changes go
    /// back on the queue; an unanswered status check becomes an unverified mute.
    fn link_lost(&mut self, reason: String, undelivered: Option<HostCommand>) {
        self.link = None;
        let lost: Vec<HostCommand> = self.in_flight.drain(..).chain(undelivered).collect();
        for command in lost {
            if command.is_state_change() {
                self.connection.requeue(command);
                self.arbitration.on_delivery_failed(command);
            }
        }
        let actions = self.connection.on_disconnected(reason, Utc::now());
        self.apply_actions(actions);
        let effects = self.arbitration.on_channel_lost();
        self.apply_effects(effects);
    }

    fn on_host_response(&mut self, response: HostResponse) {
        let Some(command) = self.in_flight.pop_front() else {
            tracing::warn!(?response, "unsolicited host response");
            return;
        };
        match response.outcome_for(command) {
            CommandOutcome::Muted(muted) => {
                tracing::debug!(muted, "system mute state observed");
                let effects = self.arbitration.on_status(muted);
                self.apply_effects(effects);
            }
            CommandOutcome::Done => self.arbitration.on_command_succeeded(command),
            CommandOutcome::Rejected(reason) => {
                let effects = self.arbitration.on_command_rejected(command, &reason);
                self.apply_effects(effects);
            }
        }
    }

    fn is_current_link(&self, link_id: LinkId) -> bool {
        self.link.as_ref().is_some_and(|l| l.id() == link_id)
    }

    // ─── Timers & status ──────────────────────────────────────────

    fn schedule(&mut self, key: TimerKey, delay_ms: u64, event: CoordinatorEvent) {
        let events = self.events_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = events.send(event);
        });
        if let Some(previous) = self.timers.insert(key, task.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel_timer(&mut self, key: &TimerKey) {
        if let Some(timer) = self.timers.remove(key) {
            timer.abort();
        }
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::capture(&self.connection, &self.arbitration, &self.windows)
    }

    fn publish_status(&self) {
        let next = self.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
