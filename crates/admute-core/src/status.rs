//! Observer-facing status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ad_window::AdWindowTracker;
use crate::arbitration::MuteArbitration;
use crate::connection::ConnectionState;
use crate::types::{ConnectionPhase, SurfaceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: ConnectionPhase,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub degraded_mode: bool,
    pub active_source_count: usize,
    pub failed_operations: u32,
    /// Source that triggered the outstanding status check, if any.
    pub pending_check: Option<String>,
    pub fallback_surface: Option<SurfaceId>,
    pub active_ad_surfaces: Vec<SurfaceId>,
}

impl StatusSnapshot {
    pub fn capture(
        connection: &ConnectionState,
        arbitration: &MuteArbitration,
        windows: &AdWindowTracker,
    ) -> Self {
        let last_error = connection.last_error();
        Self {
            phase: connection.phase(),
            reconnect_attempts: connection.reconnect_attempts(),
            max_reconnect_attempts: connection.policy().max_attempts,
            last_error: last_error.map(|e| e.reason.clone()),
            last_error_at: last_error.map(|e| e.at),
            degraded_mode: arbitration.is_degraded(),
            active_source_count: arbitration.active_source_count(),
            failed_operations: arbitration.failed_operations(),
            pending_check: arbitration.pending_check().map(|c| c.trigger.to_string()),
            fallback_surface: arbitration.fallback_surface().cloned(),
            active_ad_surfaces: windows.active_surfaces(),
        }
    }
}

/// One-line terminal rendering, e.g.
/// `connected · muting 2 · ads: tab1,tab4` or
/// `given_up (5/5) · DEGRADED · last error: host binary not found`.
pub fn format_status_line(status: &StatusSnapshot) -> String {
    let mut parts = Vec::new();

    let phase = match status.phase {
        ConnectionPhase::Disconnected | ConnectionPhase::GivenUp
            if status.reconnect_attempts > 0 || status.phase == ConnectionPhase::GivenUp =>
        {
            format!(
                "{} ({}/{})",
                status.phase, status.reconnect_attempts, status.max_reconnect_attempts
            )
        }
        phase => phase.to_string(),
    };
    parts.push(phase);

    if status.degraded_mode {
        parts.push("DEGRADED".to_owned());
    }
    if status.active_source_count > 0 {
        parts.push(format!("muting {}", status.active_source_count));
    }
    if let Some(ref check) = status.pending_check {
        parts.push(format!("checking for {check}"));
    }
    if !status.active_ad_surfaces.is_empty() {
        let surfaces: Vec<&str> = status.active_ad_surfaces.iter().map(SurfaceId::as_str).collect();
        parts.push(format!("ads: {}", surfaces.join(",")));
    }
    if let Some(ref err) = status.last_error {
        parts.push(format!("last error: {err}"));
    }

    parts.join(" \u{b7} ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ad_window::AdWindowPolicy;
    use crate::arbitration::ArbitrationPolicy;
    use crate::backoff::ReconnectPolicy;
    use crate::types::SourceId;

    fn fresh() -> (ConnectionState, MuteArbitration, AdWindowTracker) {
        (
            ConnectionState::new(ReconnectPolicy::default()),
            MuteArbitration::new(ArbitrationPolicy::default()),
            AdWindowTracker::new(AdWindowPolicy::default()),
        )
    }

    #[test]
    fn capture_fresh_state() {
        let (conn, arb, win) = fresh();
        let status = StatusSnapshot::capture(&conn, &arb, &win);
        assert_eq!(status.phase, ConnectionPhase::Disconnected);
        assert_eq!(status.max_reconnect_attempts, 5);
        assert_eq!(status.active_source_count, 0);
        assert!(!status.degraded_mode);
        assert_eq!(format_status_line(&status), "disconnected");
    }

    #[test]
    fn capture_reflects_registry_and_windows() {
        let (mut conn, mut arb, mut win) = fresh();
        conn.connect();
        conn.on_open_succeeded();
        arb.request_mute(SourceId::new("twitch", SurfaceId::new("tab1")), true);
        let x = SurfaceId::new("tab4");
        win.on_beacon(&x, 0);
        win.on_beacon(&x, 10);

        let status = StatusSnapshot::capture(&conn, &arb, &win);
        assert_eq!(status.pending_check.as_deref(), Some("twitch-tab1"));
        assert_eq!(status.active_ad_surfaces, vec![x]);
        assert_eq!(
            format_status_line(&status),
            "connected \u{b7} checking for twitch-tab1 \u{b7} ads: tab4"
        );
    }

    #[test]
    fn given_up_line_shows_attempts_and_error() {
        let status = StatusSnapshot {
            phase: ConnectionPhase::GivenUp,
            reconnect_attempts: 5,
            max_reconnect_attempts: 5,
            last_error: Some("host binary not found".to_owned()),
            last_error_at: None,
            degraded_mode: true,
            active_source_count: 1,
            failed_operations: 0,
            pending_check: None,
            fallback_surface: Some(SurfaceId::new("tab1")),
            active_ad_surfaces: Vec::new(),
        };
        assert_eq!(
            format_status_line(&status),
            "given_up (5/5) \u{b7} DEGRADED \u{b7} muting 1 \u{b7} last error: host binary not found"
        );
    }

    #[test]
    fn snapshot_serializes_snake_case() {
        let (conn, arb, win) = fresh();
        let json = serde_json::to_value(StatusSnapshot::capture(&conn, &arb, &win))
            .expect("serialize");
        assert_eq!(json["phase"], "disconnected");
        assert_eq!(json["degraded_mode"], false);
        assert_eq!(json["active_source_count"], 0);
    }
}
