use thiserror::Error;

/// Transport-level failure of a keyed store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{op} failed: {reason}")]
    Operation { op: &'static str, reason: String },
}

/// Failure of a single row during enumeration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("malformed row: {0}")]
    Malformed(String),
}

/// The only error surfaced by the public query operations.
#[derive(Error, Debug)]
pub enum StatsError {
    #[error("{table} table unavailable")]
    StoreUnavailable {
        table: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("no kernel interface named {0}")]
    UnknownInterface(String),
}

impl StatsError {
    pub(crate) fn unavailable(table: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::StoreUnavailable { table, source }
    }
}
