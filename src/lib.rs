// Page Tracker: glove orientation fusion and reading-position server
// Turns raw inertial/magnetic samples into a page position and streams it to
// display consumers over WebSocket.

pub mod backoff;
pub mod braille;
pub mod broadcast;
pub mod client;
pub mod config;
pub mod error;
pub mod filters;
pub mod health_monitor;
pub mod mapping;
pub mod protocol;
pub mod sensor_fusion;
pub mod sensors;
pub mod server;
pub mod session;
pub mod simulation;
pub mod tracker;
pub mod types;

pub use config::{FusionConfig, ServerConfig};
pub use error::{ClientError, SensorError};
pub use protocol::{Command, ServerEvent};
pub use session::{Session, SessionPhase};
pub use types::{CalibrationReference, OrientationEstimate, PositionState, SensorSample};
