use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Surface & Source ─────────────────────────────────────────────

/// One independently trackable content context (e.g. one browser tab).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurfaceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Origin used for sources inferred from burst (network beacon) signals.
pub const NETWORK_ORIGIN: &str = "network";

/// One (surface, detection-method) pair asserting a mute requirement.
///
/// Displayed as `{origin}-{surface}`, e.g. `twitch-tab17`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId {
    pub origin: String,
    pub surface: SurfaceId,
}

impl SourceId {
    pub fn new(origin: impl Into<String>, surface: SurfaceId) -> Self {
        Self {
            origin: origin.into(),
            surface,
        }
    }

    /// Source id for the ad window inferred from network beacons on `surface`.
    pub fn network(surface: SurfaceId) -> Self {
        Self::new(NETWORK_ORIGIN, surface)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.origin, self.surface)
    }
}

// ─── Timers ───────────────────────────────────────────────────────

/// Identifier of a cancellable scheduled task (backoff delay, silence timeout).
///
/// The owning state stores the id of its live timer; a firing whose id no
/// longer matches is stale and must be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

// ─── Connection Phase ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; only a manual retry leaves this phase.
    GivenUp,
}

impl ConnectionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::GivenUp => "given_up",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "given_up" => Ok(Self::GivenUp),
            _ => Err(format!("unknown connection phase: {s}")),
        }
    }
}
