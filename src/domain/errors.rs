use derive_more::Display;

/// Crate-wide error. Nothing here is fatal to the engine; the fetch
/// boundary turns every variant into an empty result.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum AppError {
    #[display(fmt = "Network Error: {}", _0)]
    Network(String),
    #[display(fmt = "HTTP {} from {}", status, url)]
    Http { status: u16, url: String },
    #[display(fmt = "Decode Error: {}", _0)]
    Decode(String),
    #[display(fmt = "Configuration Error: {}", _0)]
    Configuration(String),
    #[display(fmt = "Validation Error: {}", _0)]
    Validation(String),
}

impl std::error::Error for AppError {}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Decode(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
