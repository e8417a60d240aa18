//! Error kinds for the aggregation engine
//!
//! None of these are fatal to the control loop. Every cycle catches them per
//! unit of work, logs them, and records them in the `CycleReport`.

/// Non-fatal failure of one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    /// Upstream call failed (network error, timeout, malformed response)
    SourceUnavailable(String),
    /// A record violated an expected shape (missing tier, bad address)
    DataShape(String),
    /// Cache or registry file could not be read or written
    Persistence(String),
    /// Vault metadata/stats could not be fetched for one vault
    Enrichment(String),
}

impl AggregationError {
    /// Short label used in cycle summaries
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationError::SourceUnavailable(_) => "source-unavailable",
            AggregationError::DataShape(_) => "data-shape",
            AggregationError::Persistence(_) => "persistence",
            AggregationError::Enrichment(_) => "enrichment",
        }
    }
}

impl std::fmt::Display for AggregationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationError::SourceUnavailable(e) => write!(f, "Source unavailable: {}", e),
            AggregationError::DataShape(e) => write!(f, "Data shape error: {}", e),
            AggregationError::Persistence(e) => write!(f, "Persistence error: {}", e),
            AggregationError::Enrichment(e) => write!(f, "Enrichment error: {}", e),
        }
    }
}

impl std::error::Error for AggregationError {}

impl From<std::io::Error> for AggregationError {
    fn from(err: std::io::Error) -> Self {
        AggregationError::Persistence(err.to_string())
    }
}

impl From<crate::history_store::HistoryStoreError> for AggregationError {
    fn from(err: crate::history_store::HistoryStoreError) -> Self {
        AggregationError::Persistence(err.to_string())
    }
}
