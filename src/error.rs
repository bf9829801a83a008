use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("missing {kind} profile: {code}")]
    MissingProfile { kind: &'static str, code: String },

    #[error("invalid horizon {requested}: expected 1..={max} days")]
    InvalidHorizon { requested: usize, max: usize },

    #[error("no active factors configured")]
    NoActiveFactors,

    #[error("constraint enforcement failed for {region} on day {day}: {reason}")]
    ConstraintViolationExhausted {
        region: String,
        day: usize,
        reason: String,
    },

    #[error("forecast run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl ForecastError {
    /// Structural errors mean the ensemble cannot produce a meaningful result at all.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration(_)
                | Self::MissingProfile { .. }
                | Self::InvalidHorizon { .. }
                | Self::NoActiveFactors
        )
    }
}

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;
