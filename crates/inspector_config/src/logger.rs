use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "crate::defaults::default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub level: LogLevel,
    #[serde(default)]
    pub format: LoggerFormat,
    #[serde(default = "crate::defaults::default_true")]
    pub colors: bool,
    /// Log to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Utf8PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            format: LoggerFormat::Compact,
            colors: true,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoggerFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Log verbosity, ordered from most to least verbose
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    #[serde(rename = "trace", alias = "TRACE")]
    Trace,
    #[serde(rename = "debug", alias = "DEBUG")]
    Debug,
    #[serde(rename = "info", alias = "INFO")]
    #[default]
    Info,
    #[serde(rename = "warn", alias = "WARN")]
    Warn,
    #[serde(rename = "error", alias = "ERROR")]
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Shifts the level by `steps` towards `Trace` (positive) or `Error`
    /// (negative), saturating at both ends.
    #[must_use]
    pub fn shifted(self, steps: i8) -> Self {
        const ORDER: [LogLevel; 5] = [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ];
        let current = ORDER.iter().position(|l| *l == self).unwrap_or(2) as i16;
        let index = (current - i16::from(steps)).clamp(0, 4);
        ORDER[index as usize]
    }
}
