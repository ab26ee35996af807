//! Process-wide configuration.
//!
//! The handler runs as a `kernel.core_pattern` pipe target, so there is no
//! interactive way to pass settings. Everything is resolved once at
//! startup, in three layers: built-in defaults, then an optional TOML file
//! named by `CRASH_REPORTER_CONFIG`, then individual `CRASH_REPORTER_*`
//! environment variables. Later layers win.

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::ConfigError;

/// Part size for multipart uploads (50 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 52_428_800;
/// Lifetime of the presigned download URL (24 hours).
pub const DEFAULT_URL_EXPIRY_SECS: u64 = 24 * 60 * 60;
/// Dumps strictly larger than this are gzipped before upload (1 MiB).
pub const DEFAULT_COMPRESS_THRESHOLD: u64 = 1024 * 1024;

const DEFAULT_ICON_URL: &str = "https://upload.wikimedia.org/wikipedia/commons/thumb/1/1a/Skull_Icon_%28Noun_Project%29.svg/891px-Skull_Icon_%28Noun_Project%29.svg.png";

#[derive(Debug, Clone)]
pub struct Config {
    /// Channel the crash report is posted to. Create it before deploying.
    pub chat_channel: String,
    /// Bot token for the chat API. The default is a placeholder; real
    /// deployments must set `CRASH_REPORTER_CHAT_TOKEN`.
    pub chat_token: String,
    /// Bot identity the report is posted under.
    pub chat_username: String,
    pub chat_icon_url: String,
    /// Bucket the dumps are uploaded to.
    pub bucket_name: String,
    /// Debugger binary, resolved via `PATH`.
    pub debugger_path: String,
    /// The executable the dumps come from, handed to the debugger.
    pub debugger_target_path: PathBuf,
    /// Multipart upload part size in bytes.
    pub chunk_size: u64,
    /// Presigned URL lifetime in seconds.
    pub url_expiry_secs: u64,
    /// Compression threshold in bytes (strictly-greater-than).
    pub compress_threshold: u64,
    /// Log file, opened in append mode once per invocation.
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            chat_channel: "#my-app_crash_reports".to_string(),
            chat_token: "your token here".to_string(),
            chat_username: "coredump reporter".to_string(),
            chat_icon_url: DEFAULT_ICON_URL.to_string(),
            bucket_name: "media-server-coredumps".to_string(),
            debugger_path: "gdb".to_string(),
            debugger_target_path: PathBuf::from("/opt/local/mediaserver/mediaserver"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            url_expiry_secs: DEFAULT_URL_EXPIRY_SECS,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
            log_file: PathBuf::from("/tmp/crash_handler.log"),
        }
    }
}

/// File-format mirror of [`Config`]. Every field is optional so a file
/// can override a single setting and leave the rest at their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    chat_channel: Option<String>,
    chat_token: Option<String>,
    chat_username: Option<String>,
    chat_icon_url: Option<String>,
    bucket_name: Option<String>,
    debugger_path: Option<String>,
    debugger_target_path: Option<PathBuf>,
    chunk_size: Option<u64>,
    url_expiry_secs: Option<u64>,
    compress_threshold: Option<u64>,
    log_file: Option<PathBuf>,
}

impl Config {
    /// Resolve the configuration from the environment.
    pub fn load() -> Result<Config, ConfigError> {
        let mut config = Config::default();
        if let Some(path) = env::var_os("CRASH_REPORTER_CONFIG") {
            let path = PathBuf::from(path);
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
                path: path.clone(),
                source,
            })?;
            let file = toml::from_str(&text).map_err(|source| ConfigError::ParseFile {
                path: path.clone(),
                source,
            })?;
            config.apply_file(file);
        }
        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: ConfigFile) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = file.$field {
                    self.$field = value;
                }
            };
        }
        take!(chat_channel);
        take!(chat_token);
        take!(chat_username);
        take!(chat_icon_url);
        take!(bucket_name);
        take!(debugger_path);
        take!(debugger_target_path);
        take!(chunk_size);
        take!(url_expiry_secs);
        take!(compress_threshold);
        take!(log_file);
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = env::var("CRASH_REPORTER_CHAT_CHANNEL") {
            self.chat_channel = value;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_CHAT_TOKEN") {
            self.chat_token = value;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_CHAT_USERNAME") {
            self.chat_username = value;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_CHAT_ICON_URL") {
            self.chat_icon_url = value;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_BUCKET_NAME") {
            self.bucket_name = value;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_DEBUGGER_PATH") {
            self.debugger_path = value;
        }
        if let Some(value) = env::var_os("CRASH_REPORTER_DEBUGGER_TARGET_PATH") {
            self.debugger_target_path = PathBuf::from(value);
        }
        if let Ok(value) = env::var("CRASH_REPORTER_CHUNK_SIZE") {
            self.chunk_size = parse_u64("CRASH_REPORTER_CHUNK_SIZE", &value)?;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_URL_EXPIRY_SECS") {
            self.url_expiry_secs = parse_u64("CRASH_REPORTER_URL_EXPIRY_SECS", &value)?;
        }
        if let Ok(value) = env::var("CRASH_REPORTER_COMPRESS_THRESHOLD") {
            self.compress_threshold = parse_u64("CRASH_REPORTER_COMPRESS_THRESHOLD", &value)?;
        }
        if let Some(value) = env::var_os("CRASH_REPORTER_LOG_FILE") {
            self.log_file = PathBuf::from(value);
        }
        Ok(())
    }
}

fn parse_u64(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_literals() {
        let config = Config::default();
        assert_eq!(config.bucket_name, "media-server-coredumps");
        assert_eq!(config.chat_channel, "#my-app_crash_reports");
        assert_eq!(config.chunk_size, 52_428_800);
        assert_eq!(config.url_expiry_secs, 86_400);
        assert_eq!(config.compress_threshold, 1_048_576);
    }

    #[test]
    fn file_overrides_are_partial() {
        let file: ConfigFile = toml::from_str(
            r#"
            bucket_name = "other-bucket"
            chunk_size = 1024
            "#,
        )
        .unwrap();
        let mut config = Config::default();
        config.apply_file(file);
        assert_eq!(config.bucket_name, "other-bucket");
        assert_eq!(config.chunk_size, 1024);
        // Untouched fields keep their defaults.
        assert_eq!(config.chat_channel, "#my-app_crash_reports");
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let parsed: Result<ConfigFile, _> = toml::from_str("bukket_name = \"typo\"");
        assert!(parsed.is_err());
    }

    #[test]
    fn bad_numeric_value_is_reported() {
        let err = parse_u64("CRASH_REPORTER_CHUNK_SIZE", "fifty MiB").unwrap_err();
        assert_eq!(err.name(), "InvalidValue");
    }
}
