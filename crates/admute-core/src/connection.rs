//! Host channel lifecycle: connect, loss detection, backoff reconnect,
//! outbound queueing while disconnected, and giving up.
//!
//! Pure state machine. Every operation returns the [`ConnectionAction`]s the
//! runtime must carry out (open the channel, write a command, arm or cancel
//! a reconnect timer). Wall-clock time is passed in only to stamp errors.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backoff::ReconnectPolicy;
use crate::protocol::HostCommand;
use crate::types::{ConnectionPhase, TimerId};

/// Last failure reason, stamped with the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionError {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Side effect requested by the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Attempt to open the channel; report back via `on_open_succeeded` / `on_open_failed`.
    Open,
    /// Write the command on the live channel.
    Deliver(HostCommand),
    /// Call `on_reconnect_due(timer)` after `delay_ms`.
    ScheduleReconnect {
        timer: TimerId,
        attempt: u32,
        delay_ms: u64,
    },
    /// Drop a previously scheduled reconnect.
    CancelReconnect(TimerId),
    /// Attempts exhausted; the channel is considered unusable.
    GaveUp,
}

/// Process-wide connection state for the host channel.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    policy: ReconnectPolicy,
    phase: ConnectionPhase,
    reconnect_attempts: u32,
    pending: VecDeque<HostCommand>,
    last_error: Option<ConnectionError>,
    reconnect_timer: Option<TimerId>,
    next_timer: u64,
}

impl ConnectionState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            phase: ConnectionPhase::Disconnected,
            reconnect_attempts: 0,
            pending: VecDeque::new(),
            last_error: None,
            reconnect_timer: None,
            next_timer: 0,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn last_error(&self) -> Option<&ConnectionError> {
        self.last_error.as_ref()
    }

    pub fn pending(&self) -> impl Iterator<Item = &HostCommand> {
        self.pending.iter()
    }

    pub fn reconnect_timer(&self) -> Option<TimerId> {
        self.reconnect_timer
    }

    // ── Operations ───────────────────────────────────────────────

    /// Start opening the channel.
    ///
    /// No-op while connected or already connecting. Does nothing after giving
    /// up: only [`retry`](Self::retry) re-enables automatic connects.
    pub fn connect(&mut self) -> Vec<ConnectionAction> {
        match self.phase {
            ConnectionPhase::Connected
            | ConnectionPhase::Connecting
            | ConnectionPhase::GivenUp => Vec::new(),
            ConnectionPhase::Disconnected => {
                let mut actions = self.cancel_reconnect();
                self.phase = ConnectionPhase::Connecting;
                actions.push(ConnectionAction::Open);
                actions
            }
        }
    }

    /// Deliver now when connected, otherwise queue and trigger a connect.
    pub fn send(&mut self, command: HostCommand) -> Vec<ConnectionAction> {
        if self.is_connected() {
            return vec![ConnectionAction::Deliver(command)];
        }
        self.pending.push_back(command);
        self.connect()
    }

    /// Put an undelivered command back on the queue without triggering a connect.
    pub fn requeue(&mut self, command: HostCommand) {
        self.pending.push_back(command);
    }

    /// The channel is open. Flushes the collapsed queue.
    pub fn on_open_succeeded(&mut self) -> Vec<ConnectionAction> {
        let mut actions = self.cancel_reconnect();
        self.phase = ConnectionPhase::Connected;
        self.reconnect_attempts = 0;
        self.last_error = None;
        if let Some(command) = collapse_pending(&mut self.pending) {
            actions.push(ConnectionAction::Deliver(command));
        }
        actions
    }

    /// Opening failed; records the error and schedules the next attempt.
    pub fn on_open_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Vec<ConnectionAction> {
        if self.phase != ConnectionPhase::Connecting {
            return Vec::new();
        }
        self.record_error(reason, now);
        self.phase = ConnectionPhase::Disconnected;
        self.schedule_reconnect()
    }

    /// The live channel was lost (closed by the host or a failed write).
    pub fn on_disconnected(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Vec<ConnectionAction> {
        if !matches!(
            self.phase,
            ConnectionPhase::Connected | ConnectionPhase::Connecting
        ) {
            return Vec::new();
        }
        self.record_error(reason, now);
        self.phase = ConnectionPhase::Disconnected;
        self.schedule_reconnect()
    }

    /// A write failed: re-queue the command and treat it as a disconnect.
    pub fn on_delivery_failed(
        &mut self,
        command: HostCommand,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Vec<ConnectionAction> {
        self.requeue(command);
        self.on_disconnected(reason, now)
    }

    /// A scheduled reconnect fired. Stale timers are ignored.
    pub fn on_reconnect_due(&mut self, timer: TimerId) -> Vec<ConnectionAction> {
        if self.reconnect_timer != Some(timer) {
            return Vec::new();
        }
        self.reconnect_timer = None;
        self.connect()
    }

    /// Manual reset: clears attempts and error state, then connects.
    pub fn retry(&mut self) -> Vec<ConnectionAction> {
        let mut actions = self.cancel_reconnect();
        self.reconnect_attempts = 0;
        self.last_error = None;
        if self.phase == ConnectionPhase::GivenUp {
            self.phase = ConnectionPhase::Disconnected;
        }
        actions.extend(self.connect());
        actions
    }

    // ── Internals ────────────────────────────────────────────────

    fn schedule_reconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = self.cancel_reconnect();
        if !self.policy.allows(self.reconnect_attempts) {
            self.phase = ConnectionPhase::GivenUp;
            tracing::warn!(
                attempts = self.reconnect_attempts,
                "host channel reconnect attempts exhausted"
            );
            actions.push(ConnectionAction::GaveUp);
            return actions;
        }
        let delay_ms = self.policy.delay_for_attempt(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        let timer = TimerId(self.next_timer);
        self.next_timer += 1;
        self.reconnect_timer = Some(timer);
        actions.push(ConnectionAction::ScheduleReconnect {
            timer,
            attempt: self.reconnect_attempts,
            delay_ms,
        });
        actions
    }

    fn cancel_reconnect(&mut self) -> Vec<ConnectionAction> {
        self.reconnect_timer
            .take()
            .map(ConnectionAction::CancelReconnect)
            .into_iter()
            .collect()
    }

    fn record_error(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.last_error = Some(ConnectionError {
            reason: reason.into(),
            at: now,
        });
    }
}

/// Collapse the queue to the latest desired state.
///
/// Only the most recent mute/unmute survives; status queries and stale
/// state changes are dropped. The queue is left empty.
pub fn collapse_pending(pending: &mut VecDeque<HostCommand>) -> Option<HostCommand> {
    let latest = pending.iter().rev().copied().find(|c| c.is_state_change());
    pending.clear();
    latest
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).expect("valid timestamp")
    }

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay_ms: 1_000,
            max_delay_ms: 8_000,
            max_attempts,
        }
    }

    fn scheduled_delay(actions: &[ConnectionAction]) -> Option<u64> {
        actions.iter().find_map(|a| match a {
            ConnectionAction::ScheduleReconnect { delay_ms, .. } => Some(*delay_ms),
            _ => None,
        })
    }

    fn scheduled_timer(actions: &[ConnectionAction]) -> TimerId {
        actions
            .iter()
            .find_map(|a| match a {
                ConnectionAction::ScheduleReconnect { timer, .. } => Some(*timer),
                _ => None,
            })
            .expect("reconnect scheduled")
    }

    #[test]
    fn connect_is_idempotent() {
        let mut conn = ConnectionState::new(policy(5));
        assert_eq!(conn.connect(), vec![ConnectionAction::Open]);
        assert_eq!(conn.phase(), ConnectionPhase::Connecting);
        assert!(conn.connect().is_empty(), "already connecting");

        conn.on_open_succeeded();
        assert!(conn.is_connected());
        assert!(conn.connect().is_empty(), "already connected");
    }

    #[test]
    fn send_while_connected_delivers_immediately() {
        let mut conn = ConnectionState::new(policy(5));
        conn.connect();
        conn.on_open_succeeded();
        assert_eq!(
            conn.send(HostCommand::Mute),
            vec![ConnectionAction::Deliver(HostCommand::Mute)]
        );
        assert_eq!(conn.pending().count(), 0);
    }

    #[test]
    fn send_while_disconnected_queues_and_connects() {
        let mut conn = ConnectionState::new(policy(5));
        let actions = conn.send(HostCommand::GetStatus);
        assert_eq!(actions, vec![ConnectionAction::Open]);
        let actions = conn.send(HostCommand::Mute);
        assert!(actions.is_empty(), "connect already in progress");
        assert_eq!(conn.pending().count(), 2);
    }

    #[test]
    fn flush_replays_only_latest_state_change() {
        let mut conn = ConnectionState::new(policy(5));
        conn.send(HostCommand::Mute);
        conn.send(HostCommand::GetStatus);
        conn.send(HostCommand::Unmute);
        conn.send(HostCommand::Mute);
        conn.send(HostCommand::GetStatus);

        let actions = conn.on_open_succeeded();
        assert_eq!(actions, vec![ConnectionAction::Deliver(HostCommand::Mute)]);
        assert_eq!(conn.pending().count(), 0);
    }

    #[test]
    fn flush_with_only_status_queries_sends_nothing() {
        let mut queue: VecDeque<_> = [HostCommand::GetStatus, HostCommand::GetStatus].into();
        assert_eq!(collapse_pending(&mut queue), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn backoff_delays_follow_policy_then_give_up() {
        let mut conn = ConnectionState::new(policy(5));
        conn.connect();

        let mut delays = Vec::new();
        let mut actions = conn.on_open_failed("spawn failed", now());
        loop {
            match scheduled_delay(&actions) {
                Some(delay) => {
                    delays.push(delay);
                    let timer = scheduled_timer(&actions);
                    assert_eq!(conn.on_reconnect_due(timer), vec![ConnectionAction::Open]);
                    actions = conn.on_open_failed("spawn failed", now());
                }
                None => break,
            }
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 8_000]);
        assert_eq!(actions, vec![ConnectionAction::GaveUp]);
        assert_eq!(conn.phase(), ConnectionPhase::GivenUp);
        assert!(conn.connect().is_empty(), "no automatic attempts after giving up");
        assert!(conn.send(HostCommand::Mute).is_empty());
    }

    #[test]
    fn open_failure_records_error() {
        let mut conn = ConnectionState::new(policy(5));
        conn.connect();
        conn.on_open_failed("host binary not found", now());
        let err = conn.last_error().expect("error recorded");
        assert_eq!(err.reason, "host binary not found");
        assert_eq!(err.at, now());
        assert_eq!(conn.phase(), ConnectionPhase::Disconnected);
        assert_eq!(conn.reconnect_attempts(), 1);
    }

    #[test]
    fn success_resets_attempts_and_error() {
        let mut conn = ConnectionState::new(policy(5));
        conn.connect();
        let actions = conn.on_open_failed("boom", now());
        let timer = scheduled_timer(&actions);
        conn.on_reconnect_due(timer);
        conn.on_open_succeeded();

        assert!(conn.is_connected());
        assert_eq!(conn.reconnect_attempts(), 0);
        assert!(conn.last_error().is_none());
        assert!(conn.reconnect_timer().is_none());
    }

    #[test]
    fn stale_reconnect_timer_is_ignored() {
        let mut conn = ConnectionState::new(policy(5));
        conn.connect();
        let actions = conn.on_open_failed("boom", now());
        let timer = scheduled_timer(&actions);

        let actions = conn.retry();
        assert!(actions.contains(&ConnectionAction::CancelReconnect(timer)));
        assert!(actions.contains(&ConnectionAction::Open));
        assert!(conn.on_reconnect_due(timer).is_empty());
    }

    #[test]
    fn delivery_failure_requeues_and_disconnects() {
        let mut conn = ConnectionState::new(policy(5));
        conn.connect();
        conn.on_open_succeeded();

        let actions = conn.on_delivery_failed(HostCommand::Unmute, "broken pipe", now());
        assert_eq!(conn.phase(), ConnectionPhase::Disconnected);
        assert_eq!(scheduled_delay(&actions), Some(1_000));
        assert_eq!(conn.pending().copied().collect::<Vec<_>>(), vec![HostCommand::Unmute]);

        let timer = scheduled_timer(&actions);
        conn.on_reconnect_due(timer);
        assert_eq!(
            conn.on_open_succeeded(),
            vec![ConnectionAction::Deliver(HostCommand::Unmute)]
        );
    }

    #[test]
    fn retry_after_give_up_reconnects_from_zero() {
        let mut conn = ConnectionState::new(policy(1));
        conn.connect();
        let actions = conn.on_open_failed("boom", now());
        let timer = scheduled_timer(&actions);
        conn.on_reconnect_due(timer);
        assert_eq!(
            conn.on_open_failed("boom", now()),
            vec![ConnectionAction::GaveUp]
        );

        assert_eq!(conn.retry(), vec![ConnectionAction::Open]);
        assert_eq!(conn.phase(), ConnectionPhase::Connecting);
        assert_eq!(conn.reconnect_attempts(), 0);
        assert!(conn.last_error().is_none());
    }

    #[test]
    fn disconnect_while_disconnected_is_noop() {
        let mut conn = ConnectionState::new(policy(5));
        assert!(conn.on_disconnected("eof", now()).is_empty());
        assert!(conn.last_error().is_none());
    }
}
