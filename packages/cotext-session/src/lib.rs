#![forbid(unsafe_code)]
//! Session layer for cotext: routes activities between peers, runs the stop/start
//! quiescence protocol, and recovers documents that drifted apart.

pub mod activity;
pub mod config;
pub mod document;
pub mod error;
pub mod gate;
mod recovery;
pub mod session;
pub mod sink;
pub mod stop_manager;
pub mod watchdog;

pub use activity::{Activity, ChecksumActivity, StopActivity, StopId, StopKind, StopState};
pub use config::{SessionConfig, StopConfig, WatchdogConfig};
pub use document::SessionDocument;
pub use error::{Error, Result};
pub use gate::{EditorGate, LocalEditGate};
pub use session::{Inbound, Session};
pub use sink::{ActivitySink, ChannelSink};
pub use stop_manager::{StartHandle, StopManager};
pub use watchdog::{ConsistencyWatchdog, Verdict};
