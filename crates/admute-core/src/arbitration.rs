//! Mute arbitration registry.
//!
//! The single authority deciding when a system mute or unmute is actually
//! issued. Mute sources are reference-counted so overlapping ad windows on
//! different surfaces never unmute early, and a mute the user applied by
//! hand is never taken over or undone.
//!
//! Invariants:
//! - A channel `mute` is emitted only on the 0→1 transition of the active
//!   source set and `unmute` only on its 1→0 transition.
//! - At most one `getStatus` check is outstanding. Requests arriving while
//!   it is in flight join it and are resolved by the same answer.
//! - Sources whose check observed the system already muted are kept apart
//!   and never cause an unmute.
//!
//! Pure: every entry point returns the [`MuteEffect`]s to perform.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::protocol::HostCommand;
use crate::types::{SourceId, SurfaceId};

/// Default consecutive command failures before degraded mode.
pub const DEFAULT_MAX_FAILED_OPERATIONS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationPolicy {
    /// Consecutive failed host commands that switch to local fallback muting.
    pub max_failed_operations: u32,
}

impl Default for ArbitrationPolicy {
    fn default() -> Self {
        Self {
            max_failed_operations: DEFAULT_MAX_FAILED_OPERATIONS,
        }
    }
}

/// Side effect requested by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuteEffect {
    /// Ask the host for the current system mute state (channel is connected).
    QueryStatus,
    /// Send through the queue-aware connection path (queues and connects when down).
    Send(HostCommand),
    /// Write straight to the live channel, bypassing the queue.
    SendDirect(HostCommand),
    /// Mute only this surface locally.
    FallbackMute(SurfaceId),
    /// Restore audio on this surface locally.
    FallbackUnmute(SurfaceId),
}

/// The outstanding status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheck {
    /// Source whose request triggered the check.
    pub trigger: SourceId,
    /// Every source still waiting on the answer, trigger included.
    pub requesters: BTreeSet<SourceId>,
}

#[derive(Debug, Clone)]
pub struct MuteArbitration {
    policy: ArbitrationPolicy,
    active_sources: BTreeSet<SourceId>,
    /// Sources whose check found the system already muted by the user.
    premuted_sources: BTreeSet<SourceId>,
    pending_check: Option<StatusCheck>,
    pre_mute_observed: Option<bool>,
    failed_operations: u32,
    degraded: bool,
    fallback_surface: Option<SurfaceId>,
    fallback_muted: BTreeSet<SurfaceId>,
    /// A system mute has been sent or queued on our behalf and not yet undone.
    system_mute_owned: bool,
}

impl MuteArbitration {
    pub fn new(policy: ArbitrationPolicy) -> Self {
        Self {
            policy,
            active_sources: BTreeSet::new(),
            premuted_sources: BTreeSet::new(),
            pending_check: None,
            pre_mute_observed: None,
            failed_operations: 0,
            degraded: false,
            fallback_surface: None,
            fallback_muted: BTreeSet::new(),
            system_mute_owned: false,
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn active_sources(&self) -> &BTreeSet<SourceId> {
        &self.active_sources
    }

    pub fn active_source_count(&self) -> usize {
        self.active_sources.len()
    }

    pub fn premuted_sources(&self) -> &BTreeSet<SourceId> {
        &self.premuted_sources
    }

    pub fn pending_check(&self) -> Option<&StatusCheck> {
        self.pending_check.as_ref()
    }

    pub fn pre_mute_observed(&self) -> Option<bool> {
        self.pre_mute_observed
    }

    pub fn failed_operations(&self) -> u32 {
        self.failed_operations
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn fallback_surface(&self) -> Option<&SurfaceId> {
        self.fallback_surface.as_ref()
    }

    pub fn fallback_muted(&self) -> &BTreeSet<SurfaceId> {
        &self.fallback_muted
    }

    pub fn system_mute_owned(&self) -> bool {
        self.system_mute_owned
    }

    // ── Entry points ─────────────────────────────────────────────

    /// `source` asserts "keep muted". `connected` is the current channel state.
    pub fn request_mute(&mut self, source: SourceId, connected: bool) -> Vec<MuteEffect> {
        if self.is_tracked(&source) {
            return Vec::new();
        }

        if !self.active_sources.is_empty() {
            let surface = source.surface.clone();
            self.insert_active(source);
            // Degraded muting is per surface, so a new surface still needs its own.
            if self.degraded {
                return self.fallback_mute(surface);
            }
            return Vec::new();
        }

        if !self.degraded && self.failed_operations >= self.policy.max_failed_operations {
            tracing::warn!(
                failed_operations = self.failed_operations,
                "entering degraded mode: host commands keep failing"
            );
            self.degraded = true;
        }

        if self.degraded {
            let surface = source.surface.clone();
            self.insert_active(source);
            return self.fallback_mute(surface);
        }

        if !connected {
            return self.mute_unverified(source);
        }

        match self.pending_check.as_mut() {
            Some(check) => {
                tracing::debug!(
                    source = %source,
                    trigger = %check.trigger,
                    "joining in-flight status check"
                );
                self.fallback_surface = Some(source.surface.clone());
                check.requesters.insert(source);
                Vec::new()
            }
            None => {
                self.fallback_surface = Some(source.surface.clone());
                self.pending_check = Some(StatusCheck {
                    trigger: source.clone(),
                    requesters: BTreeSet::from([source]),
                });
                vec![MuteEffect::QueryStatus]
            }
        }
    }

    /// `source` no longer needs muting.
    pub fn request_unmute(&mut self, source: &SourceId, connected: bool) -> Vec<MuteEffect> {
        if self.premuted_sources.remove(source) {
            tracing::debug!(source = %source, "released source that found audio already muted");
            return Vec::new();
        }

        if let Some(check) = self.pending_check.as_mut()
            && check.requesters.remove(source)
        {
            return Vec::new();
        }

        if !self.active_sources.remove(source) {
            return Vec::new();
        }
        if !self.active_sources.is_empty() {
            return Vec::new();
        }

        self.release_all(connected)
    }

    /// Release every source on `surface` (the surface went away).
    pub fn release_surface(&mut self, surface: &SurfaceId, connected: bool) -> Vec<MuteEffect> {
        let sources: Vec<SourceId> = self
            .active_sources
            .iter()
            .chain(self.premuted_sources.iter())
            .chain(self.pending_check.iter().flat_map(|c| c.requesters.iter()))
            .filter(|s| &s.surface == surface)
            .cloned()
            .collect();

        let mut effects = Vec::new();
        for source in sources {
            effects.extend(self.request_unmute(&source, connected));
        }
        // A surface muted locally must be restored even if others keep the set alive.
        if self.fallback_muted.remove(surface) {
            effects.push(MuteEffect::FallbackUnmute(surface.clone()));
        }
        if self.fallback_surface.as_ref() == Some(surface) {
            self.fallback_surface = None;
        }
        effects
    }

    /// The host answered the outstanding `getStatus`.
    pub fn on_status(&mut self, muted: bool) -> Vec<MuteEffect> {
        self.failed_operations = 0;
        let Some(check) = self.pending_check.take() else {
            tracing::debug!(muted, "status reply with no check outstanding");
            return Vec::new();
        };
        if check.requesters.is_empty() {
            return Vec::new();
        }

        self.pre_mute_observed = Some(muted);
        if muted {
            tracing::info!(
                trigger = %check.trigger,
                "audio already muted by user; not taking ownership"
            );
            self.premuted_sources.extend(check.requesters);
            return Vec::new();
        }

        let was_empty = self.active_sources.is_empty();
        self.active_sources.extend(check.requesters);
        if was_empty {
            self.system_mute_owned = true;
            vec![MuteEffect::SendDirect(HostCommand::Mute)]
        } else {
            Vec::new()
        }
    }

    /// The host ran `command` successfully.
    pub fn on_command_succeeded(&mut self, command: HostCommand) {
        tracing::debug!(command = command.as_str(), "host command succeeded");
        self.failed_operations = 0;
    }

    /// The host ran `command` but reported failure. Not retried.
    pub fn on_command_rejected(&mut self, command: HostCommand, reason: &str) -> Vec<MuteEffect> {
        tracing::warn!(command = command.as_str(), reason, "host command rejected");
        self.record_failure();
        match command {
            HostCommand::GetStatus => {
                // The check cannot be answered; protect the requesters locally.
                let Some(check) = self.pending_check.take() else {
                    return Vec::new();
                };
                let mut effects = Vec::new();
                for source in check.requesters {
                    let surface = source.surface.clone();
                    self.insert_active(source);
                    effects.extend(self.fallback_mute(surface));
                }
                effects
            }
            HostCommand::Mute => {
                self.system_mute_owned = false;
                match self.fallback_surface.clone() {
                    Some(surface) if !self.active_sources.is_empty() => {
                        self.fallback_mute(surface)
                    }
                    _ => Vec::new(),
                }
            }
            HostCommand::Unmute => Vec::new(),
        }
    }

    /// A command was lost because the channel broke before it was answered.
    pub fn on_delivery_failed(&mut self, command: HostCommand) {
        tracing::debug!(command = command.as_str(), "host command lost in transit");
        self.record_failure();
    }

    /// The channel dropped. An in-flight check becomes a disconnected request.
    pub fn on_channel_lost(&mut self) -> Vec<MuteEffect> {
        let Some(check) = self.pending_check.take() else {
            return Vec::new();
        };
        let mut effects = Vec::new();
        for source in check.requesters {
            if self.active_sources.is_empty() {
                effects.extend(self.mute_unverified(source));
            } else {
                let surface = source.surface.clone();
                self.insert_active(source);
                effects.extend(self.fallback_mute(surface));
            }
        }
        effects
    }

    /// The connection gave up: the channel is confirmed unusable.
    pub fn on_connection_given_up(&mut self) {
        if !self.degraded {
            tracing::warn!("entering degraded mode: host channel unusable");
        }
        self.degraded = true;
    }

    /// Manual retry: leave degraded mode and clear the failure counter.
    pub fn reset(&mut self) {
        self.failed_operations = 0;
        self.degraded = false;
    }

    // ── Internals ────────────────────────────────────────────────

    fn is_tracked(&self, source: &SourceId) -> bool {
        self.active_sources.contains(source)
            || self.premuted_sources.contains(source)
            || self
                .pending_check
                .as_ref()
                .is_some_and(|c| c.requesters.contains(source))
    }

    fn insert_active(&mut self, source: SourceId) {
        self.fallback_surface = Some(source.surface.clone());
        self.active_sources.insert(source);
    }

    /// Mute without being able to check first: queue the system mute and
    /// mute the surface locally as a safety net.
    fn mute_unverified(&mut self, source: SourceId) -> Vec<MuteEffect> {
        let surface = source.surface.clone();
        self.insert_active(source);
        self.pre_mute_observed = None;
        self.system_mute_owned = true;
        let mut effects = vec![MuteEffect::Send(HostCommand::Mute)];
        effects.extend(self.fallback_mute(surface));
        effects
    }

    fn fallback_mute(&mut self, surface: SurfaceId) -> Vec<MuteEffect> {
        if self.fallback_muted.insert(surface.clone()) {
            vec![MuteEffect::FallbackMute(surface)]
        } else {
            Vec::new()
        }
    }

    /// 1→0 transition of the active set.
    fn release_all(&mut self, connected: bool) -> Vec<MuteEffect> {
        let mut effects: Vec<MuteEffect> = std::mem::take(&mut self.fallback_muted)
            .into_iter()
            .map(MuteEffect::FallbackUnmute)
            .collect();

        // Unlike a plain fallback unmute, an owned system mute is always undone
        // through the channel, even when disconnected or degraded.
        if !self.system_mute_owned {
            return effects;
        }
        self.system_mute_owned = false;

        // When the channel is down or degraded the unmute is queued, so the
        // system converges once it comes back instead of staying muted.
        tracing::debug!(connected, degraded = self.degraded, "last mute source released");
        effects.push(MuteEffect::Send(HostCommand::Unmute));
        effects
    }

    fn record_failure(&mut self) {
        self.failed_operations = self.failed_operations.saturating_add(1);
        if !self.degraded && self.failed_operations >= self.policy.max_failed_operations {
            tracing::warn!(
                failed_operations = self.failed_operations,
                "entering degraded mode: host commands keep failing"
            );
            self.degraded = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(origin: &str, surface: &str) -> SourceId {
        SourceId::new(origin, SurfaceId::new(surface))
    }

    fn registry() -> MuteArbitration {
        MuteArbitration::new(ArbitrationPolicy::default())
    }

    fn channel_mutes(effects: &[MuteEffect]) -> usize {
        effects
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    MuteEffect::Send(HostCommand::Mute) | MuteEffect::SendDirect(HostCommand::Mute)
                )
            })
            .count()
    }

    fn channel_unmutes(effects: &[MuteEffect]) -> usize {
        effects
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    MuteEffect::Send(HostCommand::Unmute)
                        | MuteEffect::SendDirect(HostCommand::Unmute)
                )
            })
            .count()
    }

    #[test]
    fn first_request_queries_status_before_muting() {
        let mut reg = registry();
        let effects = reg.request_mute(src("twitch", "tab17"), true);
        assert_eq!(effects, vec![MuteEffect::QueryStatus]);
        assert_eq!(reg.active_source_count(), 0, "not owned until the check answers");
        assert_eq!(
            reg.pending_check().map(|c| c.trigger.clone()),
            Some(src("twitch", "tab17"))
        );

        let effects = reg.on_status(false);
        assert_eq!(effects, vec![MuteEffect::SendDirect(HostCommand::Mute)]);
        assert_eq!(reg.active_source_count(), 1);
        assert_eq!(reg.pre_mute_observed(), Some(false));
        assert!(reg.pending_check().is_none());
    }

    #[test]
    fn user_muted_system_is_not_taken_over() {
        let mut reg = registry();
        let a = src("twitch", "tab17");
        reg.request_mute(a.clone(), true);
        assert!(reg.on_status(true).is_empty(), "no mute when already muted");
        assert_eq!(reg.active_source_count(), 0);
        assert!(reg.premuted_sources().contains(&a));

        // The later unmute must not override the user's mute.
        assert!(reg.request_unmute(&a, true).is_empty());
        assert!(reg.premuted_sources().is_empty());
    }

    #[test]
    fn repeated_mute_request_is_idempotent() {
        let mut reg = registry();
        let a = src("twitch", "tab17");
        reg.request_mute(a.clone(), true);
        assert!(reg.request_mute(a.clone(), true).is_empty(), "joins nothing twice");
        reg.on_status(false);
        assert!(reg.request_mute(a, true).is_empty());
        assert_eq!(reg.active_source_count(), 1);
    }

    #[test]
    fn overlapping_surfaces_unmute_only_after_last() {
        let mut reg = registry();
        let x = src("network", "tabX");
        let y = src("network", "tabY");

        let mut all = reg.request_mute(x.clone(), true);
        all.extend(reg.on_status(false));
        all.extend(reg.request_mute(y.clone(), true));
        assert_eq!(channel_mutes(&all), 1);
        assert_eq!(reg.active_source_count(), 2);

        assert_eq!(channel_unmutes(&reg.request_unmute(&x, true)), 0);
        assert_eq!(channel_unmutes(&reg.request_unmute(&y, true)), 1);
        assert_eq!(reg.active_source_count(), 0);
    }

    #[test]
    fn unmute_of_unknown_source_is_noop() {
        let mut reg = registry();
        assert!(reg.request_unmute(&src("twitch", "tab1"), true).is_empty());
    }

    #[test]
    fn repeated_unmute_is_idempotent() {
        let mut reg = registry();
        let a = src("twitch", "tab1");
        reg.request_mute(a.clone(), true);
        reg.on_status(false);
        assert_eq!(channel_unmutes(&reg.request_unmute(&a, true)), 1);
        assert!(reg.request_unmute(&a, true).is_empty());
    }

    #[test]
    fn concurrent_requests_share_one_check() {
        let mut reg = registry();
        let a = src("twitch", "tab1");
        let b = src("peacock", "tab2");
        assert_eq!(reg.request_mute(a.clone(), true), vec![MuteEffect::QueryStatus]);
        assert!(reg.request_mute(b.clone(), true).is_empty(), "queues behind the check");
        assert_eq!(reg.fallback_surface(), Some(&SurfaceId::new("tab2")));

        let effects = reg.on_status(false);
        assert_eq!(effects, vec![MuteEffect::SendDirect(HostCommand::Mute)]);
        assert!(reg.active_sources().contains(&a));
        assert!(reg.active_sources().contains(&b));
    }

    #[test]
    fn requester_withdrawn_before_answer_is_not_muted() {
        let mut reg = registry();
        let a = src("twitch", "tab1");
        reg.request_mute(a.clone(), true);
        assert!(reg.request_unmute(&a, true).is_empty());
        assert!(reg.on_status(false).is_empty(), "nobody left to mute for");
        assert_eq!(reg.active_source_count(), 0);
    }

    #[test]
    fn disconnected_mute_queues_and_falls_back() {
        let mut reg = registry();
        let effects = reg.request_mute(src("twitch", "A"), false);
        assert_eq!(
            effects,
            vec![
                MuteEffect::Send(HostCommand::Mute),
                MuteEffect::FallbackMute(SurfaceId::new("A")),
            ]
        );
        assert_eq!(reg.active_source_count(), 1);
        assert!(reg.system_mute_owned());
    }

    #[test]
    fn disconnected_unmute_restores_surface_and_queues_unmute() {
        let mut reg = registry();
        let a = src("twitch", "A");
        reg.request_mute(a.clone(), false);
        let effects = reg.request_unmute(&a, false);
        assert_eq!(
            effects,
            vec![
                MuteEffect::FallbackUnmute(SurfaceId::new("A")),
                MuteEffect::Send(HostCommand::Unmute),
            ]
        );
        assert!(!reg.system_mute_owned());
    }

    #[test]
    fn failures_reach_bound_then_fallback_without_status_query() {
        let mut reg = registry();
        for _ in 0..DEFAULT_MAX_FAILED_OPERATIONS {
            reg.on_command_rejected(HostCommand::Unmute, "osascript timed out");
        }
        assert!(reg.is_degraded());

        let effects = reg.request_mute(src("twitch", "tab9"), true);
        assert_eq!(effects, vec![MuteEffect::FallbackMute(SurfaceId::new("tab9"))]);
        assert!(!effects.contains(&MuteEffect::QueryStatus));
        assert_eq!(reg.fallback_surface(), Some(&SurfaceId::new("tab9")));
    }

    #[test]
    fn success_resets_failure_counter() {
        let mut reg = registry();
        reg.on_command_rejected(HostCommand::Mute, "boom");
        reg.on_command_rejected(HostCommand::Mute, "boom");
        reg.on_command_succeeded(HostCommand::Unmute);
        assert_eq!(reg.failed_operations(), 0);
        reg.on_command_rejected(HostCommand::Mute, "boom");
        assert!(!reg.is_degraded());
    }

    #[test]
    fn degraded_mode_mutes_each_surface_locally() {
        let mut reg = registry();
        reg.on_connection_given_up();
        let e1 = reg.request_mute(src("network", "t1"), true);
        let e2 = reg.request_mute(src("network", "t2"), true);
        assert_eq!(e1, vec![MuteEffect::FallbackMute(SurfaceId::new("t1"))]);
        assert_eq!(e2, vec![MuteEffect::FallbackMute(SurfaceId::new("t2"))]);

        assert!(reg.request_unmute(&src("network", "t1"), true).is_empty());
        let effects = reg.request_unmute(&src("network", "t2"), true);
        assert_eq!(
            effects,
            vec![
                MuteEffect::FallbackUnmute(SurfaceId::new("t1")),
                MuteEffect::FallbackUnmute(SurfaceId::new("t2")),
            ]
        );
    }

    #[test]
    fn degraded_release_still_undoes_owned_system_mute() {
        let mut reg = registry();
        let a = src("twitch", "A");
        assert_eq!(reg.request_mute(a.clone(), true), vec![MuteEffect::QueryStatus]);
        assert_eq!(reg.on_status(false), vec![MuteEffect::SendDirect(HostCommand::Mute)]);
        assert!(reg.system_mute_owned());

        reg.on_connection_given_up();
        let effects = reg.request_unmute(&a, false);
        assert_eq!(effects, vec![MuteEffect::Send(HostCommand::Unmute)]);
        assert!(!reg.system_mute_owned());
    }

    #[test]
    fn reset_leaves_degraded_mode() {
        let mut reg = registry();
        reg.on_connection_given_up();
        reg.reset();
        assert!(!reg.is_degraded());
        assert_eq!(reg.request_mute(src("a", "b"), true), vec![MuteEffect::QueryStatus]);
    }

    #[test]
    fn rejected_status_check_protects_requesters_locally() {
        let mut reg = registry();
        reg.request_mute(src("twitch", "tab1"), true);
        let effects = reg.on_command_rejected(HostCommand::GetStatus, "osascript not found");
        assert_eq!(effects, vec![MuteEffect::FallbackMute(SurfaceId::new("tab1"))]);
        assert_eq!(reg.active_source_count(), 1);
        assert_eq!(reg.failed_operations(), 1);
    }

    #[test]
    fn lost_check_becomes_unverified_mute() {
        let mut reg = registry();
        reg.request_mute(src("twitch", "tab1"), true);
        reg.request_mute(src("twitch", "tab2"), true);
        let effects = reg.on_channel_lost();
        assert_eq!(channel_mutes(&effects), 1);
        assert!(effects.contains(&MuteEffect::FallbackMute(SurfaceId::new("tab1"))));
        assert!(effects.contains(&MuteEffect::FallbackMute(SurfaceId::new("tab2"))));
        assert_eq!(reg.active_source_count(), 2);
        assert!(reg.pending_check().is_none());
    }

    #[test]
    fn release_surface_drops_every_source_on_it() {
        let mut reg = registry();
        let level = src("twitch", "tab1");
        let burst = src("network", "tab1");
        reg.request_mute(level.clone(), true);
        reg.on_status(false);
        reg.request_mute(burst.clone(), true);

        let effects = reg.release_surface(&SurfaceId::new("tab1"), true);
        assert_eq!(channel_unmutes(&effects), 1);
        assert_eq!(reg.active_source_count(), 0);
    }

    #[test]
    fn release_surface_restores_fallback_while_others_stay_muted() {
        let mut reg = registry();
        reg.on_connection_given_up();
        reg.request_mute(src("network", "t1"), false);
        reg.request_mute(src("network", "t2"), false);

        let effects = reg.release_surface(&SurfaceId::new("t1"), false);
        assert_eq!(effects, vec![MuteEffect::FallbackUnmute(SurfaceId::new("t1"))]);
        assert_eq!(reg.active_source_count(), 1);
    }

    // ─── Property tests ──────────────────────────────────────────

    mod props {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Mute(usize),
            Unmute(usize),
        }

        fn arb_op() -> impl Strategy<Value = Op> {
            prop_oneof![(0usize..4).prop_map(Op::Mute), (0usize..4).prop_map(Op::Unmute)]
        }

        fn source(i: usize) -> SourceId {
            src("network", &format!("tab{i}"))
        }

        proptest! {
            /// Channel mute fires only on 0→1 and unmute only on 1→0.
            #[test]
            fn channel_commands_track_set_transitions(
                ops in proptest::collection::vec(arb_op(), 1..40),
            ) {
                let mut reg = registry();
                for op in ops {
                    let before = reg.active_source_count();
                    let mut effects = match op {
                        Op::Mute(i) => reg.request_mute(source(i), true),
                        Op::Unmute(i) => reg.request_unmute(&source(i), true),
                    };
                    if effects.contains(&MuteEffect::QueryStatus) {
                        effects.extend(reg.on_status(false));
                    }
                    let after = reg.active_source_count();

                    prop_assert_eq!(channel_mutes(&effects), usize::from(before == 0 && after > 0));
                    prop_assert_eq!(channel_unmutes(&effects), usize::from(before > 0 && after == 0));
                    prop_assert!(reg.pending_check().is_none());
                }
            }

            /// A repeated mute request is invisible.
            #[test]
            fn duplicate_mute_has_no_effect(i in 0usize..4, connected: bool) {
                let mut reg = registry();
                reg.request_mute(source(i), connected);
                let snapshot = (reg.active_source_count(), reg.pending_check().cloned());
                prop_assert!(reg.request_mute(source(i), connected).is_empty());
                prop_assert_eq!(snapshot, (reg.active_source_count(), reg.pending_check().cloned()));
            }
        }
    }
}
