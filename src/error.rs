use crate::schema::ForecastMethod;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FpaError {
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Unsupported forecast method: {0:?}")]
    UnsupportedMethod(ForecastMethod),

    #[error("Risk/opportunity {id} has invalid duration {months}: must be at least 1 month")]
    InvalidDuration { id: String, months: u32 },

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    #[error("Plan {0} is locked")]
    PlanLocked(String),

    #[error("Forecast assumption not found: {0}")]
    AssumptionNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid fiscal year end month {0}: must be between 1 and 12")]
    InvalidFiscalYearEndMonth(u32),

    #[error("Validation error for {entity}: {details}")]
    ValidationError { entity: String, details: String },

    #[error("Import error on line {line}: {details}")]
    ImportError { line: u64, details: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FpaError>;
