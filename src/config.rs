//! Tuning knobs for page following, the slide canvas, and slide import.
//!
//! Every value has a default and can be overridden through a `CLASSBOARD_*`
//! environment variable. Unparseable or non-positive overrides fall back to
//! the default.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::time::Duration;

use crate::camera::CanvasSize;

const DEFAULT_SETTLE_WINDOW_MS: u64 = 100;
const DEFAULT_FRAME_DELAY_MS: u64 = 16;
const DEFAULT_CANVAS_WIDTH: f64 = 1920.0;
const DEFAULT_CANVAS_HEIGHT: f64 = 1080.0;
const DEFAULT_FILE_SERVER_URL: &str = "http://localhost:5001";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct FollowConfig {
    /// How long further forced navigations are suppressed after one lands.
    pub settle_window: Duration,
    /// Delay before a forced navigation is applied (next frame boundary).
    pub frame_delay: Duration,
    /// Size of generated activity images and of the camera bounds.
    pub canvas: CanvasSize,
    /// Base URL of the slide image-description service.
    pub file_server_url: String,
    pub fetch_timeout: Duration,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl FollowConfig {
    /// Load from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let settle_ms = parse_or(&lookup, "CLASSBOARD_SETTLE_WINDOW_MS", DEFAULT_SETTLE_WINDOW_MS);
        let frame_ms = parse_or(&lookup, "CLASSBOARD_FRAME_DELAY_MS", DEFAULT_FRAME_DELAY_MS);
        let timeout_secs = parse_or(&lookup, "CLASSBOARD_FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS);
        let width = parse_positive(&lookup, "CLASSBOARD_CANVAS_WIDTH", DEFAULT_CANVAS_WIDTH);
        let height = parse_positive(&lookup, "CLASSBOARD_CANVAS_HEIGHT", DEFAULT_CANVAS_HEIGHT);
        let file_server_url = lookup("CLASSBOARD_FILE_SERVER_URL")
            .map(|v| v.trim().trim_end_matches('/').to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_FILE_SERVER_URL.to_owned());

        Self {
            settle_window: Duration::from_millis(settle_ms),
            frame_delay: Duration::from_millis(frame_ms),
            canvas: CanvasSize::new(width, height),
            file_server_url,
            fetch_timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    #[must_use]
    pub fn with_settle_window(mut self, settle_window: Duration) -> Self {
        self.settle_window = settle_window;
        self
    }

    #[must_use]
    pub fn with_frame_delay(mut self, frame_delay: Duration) -> Self {
        self.frame_delay = frame_delay;
        self
    }

    #[must_use]
    pub fn with_canvas(mut self, canvas: CanvasSize) -> Self {
        self.canvas = canvas;
        self
    }

    #[must_use]
    pub fn with_file_server_url(mut self, url: impl Into<String>) -> Self {
        self.file_server_url = url.into().trim_end_matches('/').to_owned();
        self
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    let value = parse_or(lookup, key, default);
    if value.is_finite() && value > 0.0 { value } else { default }
}
