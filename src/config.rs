use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::Path;
use std::sync::RwLock;

use crate::error::Result;
use crate::loader::parser::parse_json_file;

/// Outbound mail configuration, consumed by the mail dispatcher's sanity
/// checks. Delivery itself happens outside this crate.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmtpSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_name: String,
    pub from_address: String,
    pub starttls_enabled: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 587,
            user: String::new(),
            password: String::new(),
            from_name: "resbook".to_string(),
            from_address: String::new(),
            starttls_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// How far ahead of "now" the event processor looks when selecting due
    /// events, so near-simultaneous events are handled in one wake-up.
    pub event_precision_seconds: i64,

    /// Wake-up delay after an internal processing failure.
    pub retry_backoff_seconds: i64,

    /// Lower bound on any scheduled wake-up delay, so a backlog of past-due
    /// events cannot make the processor busy-loop.
    pub min_rearm_delay_seconds: i64,

    pub smtp: SmtpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self { event_precision_seconds: 5, retry_backoff_seconds: 60, min_rearm_delay_seconds: 10, smtp: SmtpSettings::default() }
    }
}

lazy_static! {
    static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings::default());
}

/// Returns a copy of the process-wide settings.
pub fn get_settings() -> Settings {
    SETTINGS.read().expect("RwLock poisoned").clone()
}

/// Loads settings from a JSON file and installs them process-wide.
pub fn init_from_file(file_path: impl AsRef<Path>) -> Result<Settings> {
    let settings: Settings = parse_json_file(file_path)?;
    *SETTINGS.write().expect("RwLock poisoned") = settings.clone();
    Ok(settings)
}
