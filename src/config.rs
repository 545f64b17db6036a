//! Environment-driven configuration

use crate::gateway::{BackoffPolicy, RetryPolicy};
use crate::voice::SpeechOptions;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8001";
pub const DEFAULT_LOCALE: &str = "vi-VN";

const DEFAULT_SYSTEM_PROMPT: &str = "Bạn là trợ lý nấu ăn thông minh của Smart Cooking AI. \
Hãy trả lời ngắn gọn (1-2 câu), thân thiện và hữu ích về nấu ăn. \
Tập trung vào: công thức, nguyên liệu, kỹ thuật nấu ăn, dinh dưỡng. \
Trả lời bằng tiếng Việt.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Settings for the AI gateway client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub max_concurrent: usize,
    /// Total attempts per request
    pub max_retries: u32,
    pub base_delay: Duration,
    pub cooldown: Duration,
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            max_concurrent: 3,
            max_retries: RetryPolicy::DEFAULT_MAX_RETRIES,
            base_delay: BackoffPolicy::DEFAULT_BASE_DELAY,
            cooldown: RetryPolicy::DEFAULT_COOLDOWN,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source (tests pass a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            base_url: lookup("AI_SERVICE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.base_url),
            auth_token: lookup("AI_SERVICE_TOKEN").filter(|v| !v.is_empty()),
            max_concurrent: parse_or(&lookup, "AI_MAX_CONCURRENT", defaults.max_concurrent)?,
            max_retries: parse_or(&lookup, "AI_MAX_RETRIES", defaults.max_retries)?,
            base_delay: millis_or(&lookup, "AI_BASE_DELAY_MS", defaults.base_delay)?,
            cooldown: millis_or(&lookup, "AI_COOLDOWN_MS", defaults.cooldown)?,
            request_timeout: parse_or(&lookup, "AI_REQUEST_TIMEOUT_SECS", 60u64)
                .map(Duration::from_secs)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: BackoffPolicy::new(self.base_delay),
            cooldown: self.cooldown,
        }
    }
}

/// Settings for the voice interaction session
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    pub locale: String,
    pub rate: f32,
    pub volume: f32,
    /// History bound K
    pub history_capacity: usize,
    pub system_prompt: String,
    pub max_tokens: u32,
    /// Spoken when the gateway call fails
    pub fallback_message: String,
    /// Spoken when the service answers without reply text
    pub not_understood_message: String,
    /// Shown (not spoken) when recognition fails
    pub recognition_failed_message: String,
    /// Shown (not spoken) when a reply cannot be played
    pub synthesis_failed_message: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            rate: 0.9,
            volume: 0.8,
            history_capacity: 10,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 150,
            fallback_message: "Xin lỗi, tôi đang gặp vấn đề kỹ thuật.".to_string(),
            not_understood_message: "Xin lỗi, tôi không hiểu yêu cầu của bạn.".to_string(),
            recognition_failed_message: "Có lỗi xảy ra".to_string(),
            synthesis_failed_message: "Có lỗi xảy ra".to_string(),
        }
    }
}

impl VoiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            locale: lookup("VOICE_LOCALE")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.locale.clone()),
            rate: positive(&lookup, "VOICE_RATE", defaults.rate)?,
            volume: parse_or(&lookup, "VOICE_VOLUME", defaults.volume)
                .and_then(|v| finite("VOICE_VOLUME", v))?
                .clamp(0.0, 1.0),
            history_capacity: parse_or(
                &lookup,
                "VOICE_HISTORY_CAPACITY",
                defaults.history_capacity,
            )?
            .max(1),
            ..defaults
        })
    }

    pub fn speech_options(&self) -> SpeechOptions {
        SpeechOptions {
            locale: self.locale.clone(),
            rate: self.rate,
            volume: self.volume,
        }
    }

    /// Message sent to the chat endpoint for a voice command
    pub fn prompt_for(&self, command: &str) -> String {
        format!("{}\n\nCâu hỏi: {command}", self.system_prompt)
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
    }
}

fn finite(var: &'static str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        })
    }
}

fn positive(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: f32,
) -> Result<f32, ConfigError> {
    let value = finite(var, parse_or(lookup, var, default)?)?;
    if value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        })
    }
}
