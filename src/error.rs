use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    DuplicateName(String),

    #[error("unsupported source type: {0}")]
    UnsupportedSourceType(String),

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Store(e.to_string())
    }
}

// Domain errors raised inside a connection call travel as `Other` and are
// recovered here.
impl From<tokio_rusqlite::Error> for AppError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        match e {
            tokio_rusqlite::Error::Other(inner) => match inner.downcast::<AppError>() {
                Ok(app) => *app,
                Err(other) => AppError::Store(other.to_string()),
            },
            other => AppError::Store(other.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(e: serde_yaml::Error) -> Self {
        AppError::Validation(format!("malformed YAML: {}", e))
    }
}

impl AppError {
    pub fn fetch(url: impl Into<String>, message: impl ToString) -> Self {
        AppError::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Process exit status for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::NotFound(_) => 2,
            AppError::DuplicateName(_) => 3,
            AppError::Validation(_) | AppError::UnsupportedSourceType(_) | AppError::Json(_) => 4,
            AppError::Fetch { .. } | AppError::Http(_) => 5,
            AppError::Publish(_) => 6,
            AppError::Store(_) => 7,
            AppError::Io(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
