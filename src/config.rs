use anyhow::{Context, Result};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// Runtime settings, read from the environment (and `.env`)
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server_url: String,
    pub camera_device: String,
    /// Wait between opening the camera and taking the photo
    pub capture_delay: Duration,
    pub capture_width: u32,
    pub capture_height: u32,
    pub jpeg_quality: u8,
    pub request_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            camera_device: DEFAULT_CAMERA_DEVICE.to_string(),
            capture_delay: Duration::from_millis(3000),
            capture_width: 640,
            capture_height: 480,
            jpeg_quality: 90,
            request_timeout: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let number = |key: &str| -> Result<Option<u64>> { parse_var(&lookup, key) };

        let jpeg_quality = number("NUTRISNAP_JPEG_QUALITY")?
            .map(|q| q.clamp(1, 100) as u8)
            .unwrap_or(defaults.jpeg_quality);

        Ok(Self {
            server_url: lookup("NUTRISNAP_SERVER_URL").unwrap_or(defaults.server_url),
            camera_device: lookup("NUTRISNAP_CAMERA_DEVICE").unwrap_or(defaults.camera_device),
            capture_delay: number("NUTRISNAP_CAPTURE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.capture_delay),
            // ffmpeg cannot size a zero-pixel frame
            capture_width: parse_var::<NonZeroU32>(&lookup, "NUTRISNAP_CAPTURE_WIDTH")?
                .map_or(defaults.capture_width, NonZeroU32::get),
            capture_height: parse_var::<NonZeroU32>(&lookup, "NUTRISNAP_CAPTURE_HEIGHT")?
                .map_or(defaults.capture_height, NonZeroU32::get),
            jpeg_quality,
            request_timeout: number("NUTRISNAP_REQUEST_TIMEOUT_SECS")?.map(Duration::from_secs),
        })
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} has an invalid value: {:?}", key, raw)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.capture_delay, Duration::from_secs(3));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("NUTRISNAP_SERVER_URL", "http://food.local:8000"),
            ("NUTRISNAP_CAMERA_DEVICE", "/dev/video2"),
            ("NUTRISNAP_CAPTURE_DELAY_MS", "500"),
            ("NUTRISNAP_CAPTURE_WIDTH", "1280"),
            ("NUTRISNAP_CAPTURE_HEIGHT", "720"),
            ("NUTRISNAP_JPEG_QUALITY", "250"),
            ("NUTRISNAP_REQUEST_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.server_url, "http://food.local:8000");
        assert_eq!(config.camera_device, "/dev/video2");
        assert_eq!(config.capture_delay, Duration::from_millis(500));
        assert_eq!((config.capture_width, config.capture_height), (1280, 720));
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = config_from(&[("NUTRISNAP_CAPTURE_WIDTH", "wide")]).unwrap_err();
        assert!(err.to_string().contains("NUTRISNAP_CAPTURE_WIDTH"));
    }

    #[test]
    fn test_zero_capture_size_is_rejected() {
        let err = config_from(&[("NUTRISNAP_CAPTURE_WIDTH", "0")]).unwrap_err();
        assert!(err.to_string().contains("NUTRISNAP_CAPTURE_WIDTH"));

        let err = config_from(&[("NUTRISNAP_CAPTURE_HEIGHT", " 0 ")]).unwrap_err();
        assert!(err.to_string().contains("NUTRISNAP_CAPTURE_HEIGHT"));
    }

    #[test]
    fn test_blank_value_uses_default() {
        let config = config_from(&[("NUTRISNAP_CAPTURE_DELAY_MS", "  ")]).unwrap();
        assert_eq!(config.capture_delay, Duration::from_secs(3));
    }
}
