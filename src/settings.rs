use crate::button::DEFAULT_HOLD_TIME;
use crate::cache::DEFAULT_CAPACITY;
use crate::run_loop::LoopConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Enable debug logging and honour `RUST_LOG`.
    #[serde(default)]
    pub debug_logging: bool,
    /// Also write logs to this file.
    #[serde(default)]
    pub log_file: Option<String>,
    /// Seconds a button must stay down before a hold fires.
    #[serde(default = "default_hold_time")]
    pub hold_time: f64,
    /// Decoded image bytes kept before the least recently used are dropped.
    #[serde(default = "default_image_cache_capacity")]
    pub image_cache_capacity: usize,
    #[serde(default = "default_idle_slice_ms")]
    pub idle_slice_ms: u64,
    #[serde(default = "default_wait_quantum_ms")]
    pub wait_quantum_ms: u64,
    #[serde(default = "default_fault_pause_ms")]
    pub fault_pause_ms: u64,
    /// Rate of the app's main loop callback.
    #[serde(default = "default_loop_fps")]
    pub loop_fps: f64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_hold_time() -> f64 {
    DEFAULT_HOLD_TIME
}

fn default_image_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_idle_slice_ms() -> u64 {
    100
}

fn default_wait_quantum_ms() -> u64 {
    1
}

fn default_fault_pause_ms() -> u64 {
    500
}

fn default_loop_fps() -> f64 {
    30.0
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("ting_sdk/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_logging: false,
            log_file: None,
            hold_time: default_hold_time(),
            image_cache_capacity: default_image_cache_capacity(),
            idle_slice_ms: default_idle_slice_ms(),
            wait_quantum_ms: default_wait_quantum_ms(),
            fault_pause_ms: default_fault_pause_ms(),
            loop_fps: default_loop_fps(),
            http_timeout_secs: default_http_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path).unwrap_or_default();
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig::from(self)
    }

    /// Period of the app's main loop callback. Non-positive rates fall back
    /// to the default.
    pub fn loop_period(&self) -> std::time::Duration {
        let fps = if self.loop_fps.is_finite() && self.loop_fps > 0.0 {
            self.loop_fps
        } else {
            tracing::warn!(fps = self.loop_fps, "invalid loop_fps; using default");
            default_loop_fps()
        };
        std::time::Duration::from_secs_f64(1.0 / fps)
    }
}
