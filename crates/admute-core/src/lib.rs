//! admute-core: pure state machines for ad-aware muting.
//! Connection lifecycle, mute arbitration, ad-window detection, and the
//! native-messaging wire format. Time is passed in by the caller; nothing
//! here spawns tasks or touches the audio system.

pub mod ad_window;
pub mod arbitration;
pub mod backoff;
pub mod connection;
pub mod protocol;
pub mod signal;
pub mod status;
pub mod types;

pub use ad_window::{AdWindowOutput, AdWindowPhase, AdWindowPolicy, AdWindowTracker};
pub use arbitration::{ArbitrationPolicy, MuteArbitration, MuteEffect, StatusCheck};
pub use backoff::ReconnectPolicy;
pub use connection::{ConnectionAction, ConnectionError, ConnectionState};
pub use protocol::{CommandOutcome, HostCommand, HostResponse, ProtocolError};
pub use signal::BeaconFilter;
pub use status::{StatusSnapshot, format_status_line};
pub use types::{ConnectionPhase, SourceId, SurfaceId, TimerId};
