//! Error types for loan backtesting and filter search

use thiserror::Error;

/// Result type alias for consistent error handling throughout the crate
pub type Result<T> = std::result::Result<T, LoanBacktestError>;

/// Main error type for loan backtesting operations
#[derive(Debug, Error)]
pub enum LoanBacktestError {
    /// A categorical token outside the filter's closed vocabulary
    #[error("Unknown {filter} category: '{token}'")]
    UnknownCategory { filter: &'static str, token: String },

    /// Loan term other than 36 or 60 months
    #[error("Unsupported loan term: '{0}' (expecting 36 or 60 months)")]
    UnsupportedTerm(String),

    /// Numeric parsing errors
    #[error("Number parsing error: {0}")]
    NumberParsing(String),

    /// Date/time parsing errors
    #[error("DateTime parsing error: {0}")]
    DateTimeParsing(#[from] chrono::ParseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Data integrity errors
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Returned when the population size is zero.
    #[error("population size must be greater than zero")]
    EmptyPopulation,

    /// Returned when the elite count would cover the whole population.
    #[error("elite rate must be in [0, 1), got {0}")]
    InvalidElitism(f64),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    /// CSV processing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::num::ParseFloatError> for LoanBacktestError {
    fn from(err: std::num::ParseFloatError) -> Self {
        LoanBacktestError::NumberParsing(err.to_string())
    }
}

impl LoanBacktestError {
    /// Create a new configuration error with context
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a new validation error with context
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new data integrity error with context
    pub fn data_integrity(message: impl Into<String>) -> Self {
        Self::DataIntegrity(message.into())
    }

    /// Create a number parsing error that names the offending field
    pub fn number_parsing(field: &str, raw: &str) -> Self {
        Self::NumberParsing(format!("failed to parse {} value '{}'", field, raw))
    }

    /// Whether the error only invalidates a single loan row
    pub fn is_row_error(&self) -> bool {
        matches!(self, Self::UnsupportedTerm(_))
    }

    /// Get user-friendly error message with suggestions for resolution
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownCategory { filter, token } => {
                format!(
                    "Unknown {} value '{}' in the loan data.\n\n\
                    Suggestions:\n\
                    • Check that the stats file is an unmodified LendingClub export\n\
                    • New categories must be added to the filter vocabulary before searching",
                    filter, token
                )
            }
            Self::Configuration(msg) => {
                format!(
                    "Configuration error: {}\n\n\
                    Suggestions:\n\
                    • Check the JSON config file and command line overrides\n\
                    • population_size and mutation_rate must be positive, elite_rate below 1.0",
                    msg
                )
            }
            Self::Io(err) => {
                format!(
                    "IO error: {}\n\n\
                    Suggestions:\n\
                    • Verify the --stats path exists and is readable\n\
                    • Verify the results directory is writable",
                    err
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_parse_errors_convert_to_number_parsing() {
        let err: LoanBacktestError = "abc".parse::<f64>().unwrap_err().into();
        assert!(matches!(err, LoanBacktestError::NumberParsing(_)));
    }

    #[test]
    fn only_term_errors_are_row_errors() {
        assert!(LoanBacktestError::UnsupportedTerm("12 months".into()).is_row_error());
        assert!(!LoanBacktestError::UnknownCategory {
            filter: "Loan Purpose",
            token: "yacht".into()
        }
        .is_row_error());
    }

    #[test]
    fn user_message_mentions_offending_token() {
        let err = LoanBacktestError::UnknownCategory {
            filter: "Home Ownership",
            token: "CASTLE".into(),
        };
        assert!(err.user_message().contains("CASTLE"));
        assert!(err.to_string().contains("Home Ownership"));
    }
}
