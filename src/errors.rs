//! Error taxonomy
//! Mission: fatal errors abort the run; everything else degrades to a
//! discarded item or a dropped batch and the run continues.

use thiserror::Error;

/// Kinds a caller needs to `match` on. Everything else propagates as
/// `anyhow::Error` with `.context(...)` chains, the way the rest of the
/// pipeline does.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("browser driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavTimeout { url: String, timeout_ms: u64 },

    #[error("navigation to {url} aborted: {reason}")]
    NavAborted { url: String, reason: String },

    #[error("selector {selector} never appeared on {url}")]
    SelectorMissing { url: String, selector: String },

    #[error("unknown market: {0}")]
    UnknownMarket(String),
}
