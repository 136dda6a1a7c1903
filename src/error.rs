use thiserror::Error;

/// Errors raised while configuring or running an anonymization.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("value {value:?} of attribute {attribute:?} has no hierarchy entry")]
    UnmappedValue { attribute: String, value: String },

    #[error("value {value:?} of attribute {attribute:?} does not match date format {format:?}")]
    MalformedDate {
        attribute: String,
        value: String,
        format: String,
    },

    #[error("join key {key:?} occurs more than once in the population")]
    JoinKeyNotUnique { key: String },

    #[error("subset row {row} with key {key:?} has no match in the population")]
    UnmatchedRow { row: usize, key: String },

    #[error(
        "no transformation satisfies the privacy criterion \
         (best loss among infeasible nodes: {best_loss:.6}, \
         fewest rows to suppress: {min_suppressed}, budget: {budget})"
    )]
    NoFeasibleSolution {
        best_loss: f64,
        min_suppressed: usize,
        budget: usize,
    },

    #[error("search was cancelled")]
    SearchCancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn config_error(message: impl Into<String>) -> Error {
    Error::Configuration(message.into())
}
