use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to load {url}: {reason}")]
    Navigation { url: String, reason: String },
    #[error("`{selector}` did not appear within {timeout:?}")]
    Timeout { selector: String, timeout: Duration },
    #[error("element `{selector}`[{index}]: {reason}")]
    Element {
        selector: String,
        index: usize,
        reason: String,
    },
    #[error("invalid selector `{0}`")]
    Selector(String),
    #[error("no page loaded")]
    NotLoaded,
}

/// A single popover could not be turned into a record. Never fatal.
#[derive(Debug, Error)]
pub enum FragmentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("popover has {found} images, catalog requires {required}")]
    TooFewImages { found: usize, required: usize },
    #[error("no name at image position {0}")]
    MissingName(usize),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry `{0}` already exists")]
    Duplicate(String),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("source page unavailable: {0}")]
    Unavailable(#[source] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
}
