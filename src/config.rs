use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::warn;
use url::Url;

use crate::mask::{MAX_BRUSH_WIDTH, MIN_BRUSH_WIDTH};

const DEFAULT_IMAGEN_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_IMAGEN_MODEL: &str = "imagen-4.0-generate-001";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub imagen_model: String,
    pub imagen_api_base: Url,
    pub imagen_request_timeout_secs: u64,
    pub bind_addr: SocketAddr,
    pub mask_brush_width: f32,
    pub default_overlay_language: String,
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn normalize_api_base(value: &str) -> Result<Url> {
    let trimmed = value.trim().trim_end_matches('/');
    let trimmed = if trimmed.is_empty() {
        DEFAULT_IMAGEN_API_BASE
    } else {
        trimmed
    };
    Url::parse(trimmed).with_context(|| format!("IMAGEN_API_BASE is not a valid URL: {trimmed}"))
}

fn normalize_brush_width(value: f32) -> f32 {
    if !value.is_finite() || value < MIN_BRUSH_WIDTH || value > MAX_BRUSH_WIDTH {
        let clamped = if value.is_finite() {
            value.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH)
        } else {
            MIN_BRUSH_WIDTH
        };
        warn!(
            "MASK_BRUSH_WIDTH value {} is out of range; using {}.",
            value, clamped
        );
        return clamped;
    }
    value
}

impl Config {
    pub fn load() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        if gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required"));
        }

        let bind_text = env_string("STUDIO_BIND_ADDR", DEFAULT_BIND_ADDR);
        let bind_addr = bind_text
            .trim()
            .parse::<SocketAddr>()
            .with_context(|| format!("STUDIO_BIND_ADDR is not a socket address: {bind_text}"))?;

        let mut imagen_model = env_string("IMAGEN_MODEL", DEFAULT_IMAGEN_MODEL)
            .trim()
            .to_string();
        if imagen_model.is_empty() {
            imagen_model = DEFAULT_IMAGEN_MODEL.to_string();
        }

        let mut default_overlay_language = env_string("DEFAULT_OVERLAY_LANGUAGE", "English")
            .trim()
            .to_string();
        if default_overlay_language.is_empty() {
            default_overlay_language = "English".to_string();
        }

        Ok(Config {
            gemini_api_key: gemini_api_key.trim().to_string(),
            imagen_model,
            imagen_api_base: normalize_api_base(&env_string(
                "IMAGEN_API_BASE",
                DEFAULT_IMAGEN_API_BASE,
            ))?,
            imagen_request_timeout_secs: env_u64("IMAGEN_REQUEST_TIMEOUT_SECS", 0),
            bind_addr,
            mask_brush_width: normalize_brush_width(env_f32("MASK_BRUSH_WIDTH", 40.0)),
            default_overlay_language,
        })
    }

    /// `None` when no timeout is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.imagen_request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn predict_url(&self) -> String {
        format!(
            "{}/models/{}:predict",
            self.imagen_api_base.as_str().trim_end_matches('/'),
            self.imagen_model
        )
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        gemini_api_key: "test-key".to_string(),
        imagen_model: DEFAULT_IMAGEN_MODEL.to_string(),
        imagen_api_base: Url::parse(DEFAULT_IMAGEN_API_BASE).unwrap(),
        imagen_request_timeout_secs: 0,
        bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
        mask_brush_width: 40.0,
        default_overlay_language: "English".to_string(),
    }
}
