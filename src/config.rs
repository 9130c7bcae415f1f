use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::browser::BrowserKind;
use crate::catalog::CatalogVariant;

const DEFAULT_DB_PATH: &str = "data/catalog.sqlite";
const DEFAULT_EXPORT_DIR: &str = "data_exports";
const DEFAULT_WAIT_SECS: u64 = 10;
const DEFAULT_SETTLE_MS: u64 = 2000;

/// Raw environment values. Everything stays a string so that a bad value
/// degrades to its default instead of failing the run.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    pub source_url: Option<String>,
    pub fragment_limit: Option<String>,
    pub browser: Option<String>,
    pub chrome_path: Option<String>,
    pub headless: Option<String>,
    pub wait_timeout_secs: Option<String>,
    pub settle_delay_ms: Option<String>,
    pub db_path: Option<String>,
    pub export_dir: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_else(|e| {
                warn!(error = %e, "could not read environment settings, using defaults");
                Settings::default()
            })
    }
}

/// Fully resolved options for one run against one catalog.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_url: String,
    pub fragment_limit: Option<usize>,
    pub browser: BrowserKind,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub wait_timeout: Duration,
    pub settle_delay: Duration,
    pub db_path: PathBuf,
    pub export_dir: PathBuf,
}

impl RunConfig {
    pub fn resolve(settings: &Settings, variant: &CatalogVariant) -> Self {
        let source_url = settings
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(variant.source_url)
            .to_string();

        let config = RunConfig {
            source_url,
            fragment_limit: parse_limit(settings.fragment_limit.as_deref()),
            browser: BrowserKind::from_setting(settings.browser.as_deref()),
            chrome_path: settings.chrome_path.as_ref().map(PathBuf::from),
            headless: parse_flag(settings.headless.as_deref(), true),
            wait_timeout: Duration::from_secs(parse_number(
                "WAIT_TIMEOUT_SECS",
                settings.wait_timeout_secs.as_deref(),
                DEFAULT_WAIT_SECS,
            )),
            settle_delay: Duration::from_millis(parse_number(
                "SETTLE_DELAY_MS",
                settings.settle_delay_ms.as_deref(),
                DEFAULT_SETTLE_MS,
            )),
            db_path: PathBuf::from(settings.db_path.as_deref().unwrap_or(DEFAULT_DB_PATH)),
            export_dir: PathBuf::from(
                settings.export_dir.as_deref().unwrap_or(DEFAULT_EXPORT_DIR),
            ),
        };
        info!(
            url = %config.source_url,
            limit = ?config.fragment_limit,
            browser = ?config.browser,
            "run configuration"
        );
        config
    }
}

/// `FRAGMENT_LIMIT`: unset, empty or `None` means no cap. Anything that is
/// not a positive integer is reported and also means no cap.
pub fn parse_limit(value: Option<&str>) -> Option<usize> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty() && *v != "None")?;
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            warn!(value = raw, "invalid FRAGMENT_LIMIT, must be a positive integer; no limit applied");
            None
        }
    }
}

fn parse_number(key: &str, value: Option<&str>, default: u64) -> u64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = raw, default, "invalid number, using default");
            default
        }),
    }
}

fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1") | Some("true") | Some("yes") => true,
        Some("0") | Some("false") | Some("no") => false,
        _ => default,
    }
}
