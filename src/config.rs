use std::time::Duration;

use crate::filters::complementary::DEFAULT_ALPHA;
use crate::mapping::DEFAULT_SCALE;

// ─── Fusion ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct FusionConfig {
    // ── Filter ──
    pub alpha: f32,
    pub scale: f32,

    // ── Sampling loop ──
    pub sample_interval: Duration,
    pub read_timeout: Duration,
    pub silence_threshold: Duration,

    // ── Calibration ──
    /// Capture the origin from the first fused sample when none exists yet.
    pub auto_calibrate: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            scale: DEFAULT_SCALE,
            sample_interval: Duration::from_millis(50),
            read_timeout: Duration::from_millis(40),
            silence_threshold: Duration::from_secs(2),
            auto_calibrate: true,
        }
    }
}

// ─── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: String,
    /// Simulation driver step.
    pub tick: Duration,
    /// Upper bound on a single outbound frame write to a consumer.
    pub send_timeout: Duration,
    /// Outbound events buffered per consumer before it counts as stalled.
    pub client_queue: usize,
    /// Always use the simulation driver, even with a calibrated sensor.
    pub force_simulation: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8765".to_string(),
            tick: Duration::from_millis(400),
            send_timeout: Duration::from_secs(2),
            client_queue: 64,
            force_simulation: false,
        }
    }
}
