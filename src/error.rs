use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Line has too few delimited fields to form a measurement.
    #[error("malformed record: {fields} fields, need at least {required}")]
    MalformedRecord { fields: usize, required: usize },

    /// Channel message that does not decode to a routable measurement.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error on {table}: {message}")]
    Storage { table: String, message: String },

    #[error("invalid {field} component: {value:?}")]
    InvalidComponent { field: &'static str, value: String },

    #[error("hour must be between 0 and 23, got {0}")]
    InvalidHour(u8),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no rows for day {0}")]
    NoRowsForDay(String),

    #[error("query worker panicked")]
    WorkerPanicked,
}

impl Error {
    pub(crate) fn storage(table: impl Into<String>, message: impl ToString) -> Self {
        Error::Storage {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// True for per-record failures the pipelines skip instead of aborting on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedRecord { .. } | Error::MalformedMessage(_) | Error::Json(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
