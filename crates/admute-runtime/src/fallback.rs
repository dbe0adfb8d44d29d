//! Local per-surface muting used when the system mute is unavailable.
//!
//! The daemon cannot reach into a browser tab itself; it publishes
//! directives that the surface owner (an extension bridge subscribed over
//! the UDS `subscribe` method) applies.

use admute_core::types::SurfaceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceMuteDirective {
    pub surface: SurfaceId,
    pub muted: bool,
    pub at: DateTime<Utc>,
}

pub trait SurfaceMuter: Send + 'static {
    fn set_surface_muted(&mut self, surface: &SurfaceId, muted: bool);
}

/// Publishes directives on a broadcast channel. Having no subscriber is not
/// an error: the directive is logged and dropped.
pub struct BroadcastMuter {
    tx: broadcast::Sender<SurfaceMuteDirective>,
}

impl BroadcastMuter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn sender(&self) -> broadcast::Sender<SurfaceMuteDirective> {
        self.tx.clone()
    }
}

impl SurfaceMuter for BroadcastMuter {
    fn set_surface_muted(&mut self, surface: &SurfaceId, muted: bool) {
        let directive = SurfaceMuteDirective {
            surface: surface.clone(),
            muted,
            at: Utc::now(),
        };
        match self.tx.send(directive) {
            Ok(receivers) => {
                tracing::info!(surface = %surface, muted, receivers, "surface mute directive");
            }
            Err(_) => {
                tracing::warn!(surface = %surface, muted, "surface mute directive has no subscriber");
            }
        }
    }
}
