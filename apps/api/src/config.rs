use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context, Result};

use crate::layout::grid::LayoutConfig;

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Unset → heuristic strategy provider.
    pub anthropic_api_key: Option<String>,
    pub layout: LayoutConfig,
    pub producer_timeout: Duration,
    pub outbound_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Used directly by tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LayoutConfig::default();
        let layout = LayoutConfig {
            grid_width: parse_or(&lookup, "GRID_WIDTH", defaults.grid_width)?,
            grid_height: parse_or(&lookup, "GRID_HEIGHT", defaults.grid_height)?,
            margin: parse_or(&lookup, "LAYOUT_MARGIN", defaults.margin)?,
            gutter: parse_or(&lookup, "LAYOUT_GUTTER", defaults.gutter)?,
            white_space_min: parse_or(&lookup, "WHITE_SPACE_MIN", defaults.white_space_min)?,
            white_space_max: parse_or(&lookup, "WHITE_SPACE_MAX", defaults.white_space_max)?,
            max_iterations: parse_or(&lookup, "MAX_REFINEMENT_ITERATIONS", defaults.max_iterations)?,
            variety_window: parse_or(&lookup, "VARIETY_WINDOW", defaults.variety_window)?,
            alignment_threshold: parse_or(&lookup, "ALIGNMENT_THRESHOLD", defaults.alignment_threshold)?,
            ..defaults
        };
        layout.validate().context("Invalid layout configuration")?;

        let timeout_ms: u64 = parse_or(&lookup, "PRODUCER_TIMEOUT_MS", 30_000)?;
        ensure!(timeout_ms > 0, "PRODUCER_TIMEOUT_MS must be positive");
        let outbound_queue_capacity: usize = parse_or(&lookup, "OUTBOUND_QUEUE_CAPACITY", 32)?;
        ensure!(outbound_queue_capacity > 0, "OUTBOUND_QUEUE_CAPACITY must be positive");

        Ok(Config {
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            anthropic_api_key: lookup("ANTHROPIC_API_KEY").filter(|k| !k.trim().is_empty()),
            layout,
            producer_timeout: Duration::from_millis(timeout_ms),
            outbound_queue_capacity,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
