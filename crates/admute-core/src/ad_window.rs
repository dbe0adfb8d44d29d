//! Ad window inference from burst signals.
//!
//! One state machine per surface, `Idle → Confirming → Active → Idle`:
//!
//! - **Confirmation**: `threshold` beacons whose span from the first one
//!   stays within `confirm_window_ms` confirm an ad break.
//! - **Silence**: while active, every beacon rearms a silence timer; when it
//!   fires with no newer beacon the break is over.
//! - **Teardown**: closing an active surface ends its break immediately.
//!
//! Time is passed in as monotonic milliseconds; timers are requested from
//! the caller as [`AdWindowOutput::ArmSilence`] and reported back through
//! [`AdWindowTracker::on_silence_elapsed`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{SurfaceId, TimerId};

/// Default beacons needed to confirm an ad break.
pub const DEFAULT_THRESHOLD: u32 = 2;

/// Default confirmation window in milliseconds.
pub const DEFAULT_CONFIRM_WINDOW_MS: u64 = 3_000;

/// Default silence timeout in milliseconds.
pub const DEFAULT_SILENCE_TIMEOUT_MS: u64 = 8_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdWindowPolicy {
    pub threshold: u32,
    pub confirm_window_ms: u64,
    pub silence_timeout_ms: u64,
}

impl Default for AdWindowPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            confirm_window_ms: DEFAULT_CONFIRM_WINDOW_MS,
            silence_timeout_ms: DEFAULT_SILENCE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdWindowPhase {
    Idle,
    Confirming,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdWindowOutput {
    AdStarted(SurfaceId),
    AdEnded(SurfaceId),
    /// Call `on_silence_elapsed(surface, timer)` after `delay_ms`.
    ArmSilence {
        surface: SurfaceId,
        timer: TimerId,
        delay_ms: u64,
    },
    CancelSilence {
        surface: SurfaceId,
        timer: TimerId,
    },
}

/// Per-surface bookkeeping. `silence_timer` is set iff `phase == Active`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdWindowState {
    pub phase: AdWindowPhase,
    pub beacon_count: u32,
    pub first_beacon_ms: Option<u64>,
    pub last_beacon_ms: Option<u64>,
    pub silence_timer: Option<TimerId>,
}

impl AdWindowState {
    fn idle() -> Self {
        Self {
            phase: AdWindowPhase::Idle,
            beacon_count: 0,
            first_beacon_ms: None,
            last_beacon_ms: None,
            silence_timer: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase == AdWindowPhase::Active
    }
}

#[derive(Debug, Clone)]
pub struct AdWindowTracker {
    policy: AdWindowPolicy,
    surfaces: HashMap<SurfaceId, AdWindowState>,
    next_timer: u64,
}

impl AdWindowTracker {
    pub fn new(policy: AdWindowPolicy) -> Self {
        Self {
            policy,
            surfaces: HashMap::new(),
            next_timer: 0,
        }
    }

    pub fn policy(&self) -> &AdWindowPolicy {
        &self.policy
    }

    pub fn get(&self, surface: &SurfaceId) -> Option<&AdWindowState> {
        self.surfaces.get(surface)
    }

    /// Surfaces with a confirmed ad break, sorted.
    pub fn active_surfaces(&self) -> Vec<SurfaceId> {
        let mut active: Vec<SurfaceId> = self
            .surfaces
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        active.sort();
        active
    }

    /// One burst event for `surface` at `now_ms`.
    pub fn on_beacon(&mut self, surface: &SurfaceId, now_ms: u64) -> Vec<AdWindowOutput> {
        let timer = self.alloc_timer();
        let policy = self.policy.clone();
        let state = self
            .surfaces
            .entry(surface.clone())
            .or_insert_with(AdWindowState::idle);
        state.last_beacon_ms = Some(now_ms);

        if state.is_active() {
            let mut outputs = Vec::with_capacity(2);
            if let Some(old) = state.silence_timer.replace(timer) {
                outputs.push(AdWindowOutput::CancelSilence {
                    surface: surface.clone(),
                    timer: old,
                });
            }
            outputs.push(AdWindowOutput::ArmSilence {
                surface: surface.clone(),
                timer,
                delay_ms: policy.silence_timeout_ms,
            });
            return outputs;
        }

        // A window whose first beacon has aged out starts over at this beacon.
        if let Some(first) = state.first_beacon_ms
            && now_ms.saturating_sub(first) > policy.confirm_window_ms
        {
            state.beacon_count = 0;
            state.first_beacon_ms = None;
        }

        state.beacon_count = state.beacon_count.saturating_add(1);
        let first = *state.first_beacon_ms.get_or_insert(now_ms);
        state.phase = AdWindowPhase::Confirming;

        let within_window = now_ms.saturating_sub(first) <= policy.confirm_window_ms;
        if state.beacon_count < policy.threshold || !within_window {
            return Vec::new();
        }

        state.phase = AdWindowPhase::Active;
        state.silence_timer = Some(timer);
        tracing::info!(surface = %surface, beacons = state.beacon_count, "ad break confirmed");
        vec![
            AdWindowOutput::AdStarted(surface.clone()),
            AdWindowOutput::ArmSilence {
                surface: surface.clone(),
                timer,
                delay_ms: policy.silence_timeout_ms,
            },
        ]
    }

    /// A silence timer fired. Stale timers are ignored.
    pub fn on_silence_elapsed(
        &mut self,
        surface: &SurfaceId,
        timer: TimerId,
    ) -> Vec<AdWindowOutput> {
        let Some(state) = self.surfaces.get_mut(surface) else {
            return Vec::new();
        };
        if !state.is_active() || state.silence_timer != Some(timer) {
            return Vec::new();
        }
        *state = AdWindowState::idle();
        tracing::info!(surface = %surface, "ad break ended after silence");
        vec![AdWindowOutput::AdEnded(surface.clone())]
    }

    /// The surface went away; an active break ends now.
    pub fn close_surface(&mut self, surface: &SurfaceId) -> Vec<AdWindowOutput> {
        let Some(state) = self.surfaces.remove(surface) else {
            return Vec::new();
        };
        match (state.phase, state.silence_timer) {
            (AdWindowPhase::Active, Some(timer)) => vec![
                AdWindowOutput::CancelSilence {
                    surface: surface.clone(),
                    timer,
                },
                AdWindowOutput::AdEnded(surface.clone()),
            ],
            (AdWindowPhase::Active, None) => vec![AdWindowOutput::AdEnded(surface.clone())],
            _ => Vec::new(),
        }
    }

    fn alloc_timer(&mut self) -> TimerId {
        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        id
    }
}
