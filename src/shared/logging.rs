use chrono::{SecondsFormat, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logger {
    level: LogLevel,
}

impl Logger {
    pub fn new(level: LogLevel) -> Self {
        Self { level }
    }

    /// Reads `LOG_LEVEL`; unset or unrecognized values fall back to `info`.
    pub fn from_env() -> Self {
        let level = std::env::var("LOG_LEVEL")
            .ok()
            .and_then(|raw| LogLevel::parse(&raw))
            .unwrap_or(LogLevel::Info);
        Self { level }
    }

    pub fn debug(&self, message: &str) {
        self.emit(LogLevel::Debug, message, None);
    }

    pub fn info(&self, message: &str) {
        self.emit(LogLevel::Info, message, None);
    }

    pub fn info_meta(&self, message: &str, meta: &Value) {
        self.emit(LogLevel::Info, message, Some(meta));
    }

    pub fn warn(&self, message: &str) {
        self.emit(LogLevel::Warn, message, None);
    }

    pub fn warn_meta(&self, message: &str, meta: &Value) {
        self.emit(LogLevel::Warn, message, Some(meta));
    }

    pub fn error(&self, message: &str) {
        self.emit(LogLevel::Error, message, None);
    }

    pub fn error_meta(&self, message: &str, meta: &Value) {
        self.emit(LogLevel::Error, message, Some(meta));
    }

    fn emit(&self, level: LogLevel, message: &str, meta: Option<&Value>) {
        if level < self.level {
            return;
        }
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        match meta {
            Some(meta) => println!("[{timestamp}] [{}] {message} {meta}", level.as_str()),
            None => println!("[{timestamp}] [{}] {message}", level.as_str()),
        }
    }
}
