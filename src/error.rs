use thiserror::Error;

/// Sensor bus and sample source failures. All of them are recoverable: the
/// fusion loop keeps its previous estimate and retries on the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("No device responding at address 0x{0:02X}")]
    MissingDevice(u8),

    #[error("Bus I/O failed at 0x{addr:02X} register 0x{reg:02X}: {reason}")]
    Bus { addr: u8, reg: u8, reason: String },

    #[error("Sensor read timed out after {0} ms")]
    Timeout(u64),

    #[error("Sample source unavailable: {0}")]
    Unavailable(String),
}

/// Consumer-side client failures.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid server url: {0}")]
    InvalidUrl(String),

    #[error("Client task stopped")]
    Closed,
}
