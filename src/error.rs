use simple_error::SimpleError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("synapse store {source_name} unavailable: {reason}")]
    BackendUnavailable { source_name: String, reason: String },
    #[error("no synapse records for target {0}")]
    RecordNotFound(usize),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("simulation engine: {0}")]
    Engine(String),
    #[error("process group aborted: {0}")]
    GroupAborted(String),
    #[error("invalid parameters: {0}")]
    Params(#[from] SimpleError),
}

impl Error {
    pub fn backend_unavailable(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Error::BackendUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_fatal_for_group(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::BackendUnavailable { .. } | Error::Params(_)
        )
    }
}
