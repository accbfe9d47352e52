use axum::http::StatusCode;

/// A date or month key that is not in canonical zero-padded form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid date `{input}`, expected {expected}")]
pub struct ParseError {
    pub input: String,
    pub expected: &'static str,
}

impl ParseError {
    pub fn date(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: "YYYY-MM-DD",
        }
    }

    pub fn month(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: "YYYY-MM",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("not signed in")]
    NotAuthenticated,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("remote error: {0}")]
    Remote(String),
}

impl TrackerError {
    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "entry",
            id: id.into(),
        }
    }

    pub fn track_type_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: "track type",
            id: id.into(),
        }
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl From<ParseError> for AppError {
    fn from(err: ParseError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<TrackerError> for AppError {
    fn from(err: TrackerError) -> Self {
        let status = match &err {
            TrackerError::Parse(_) | TrackerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TrackerError::NotAuthenticated => StatusCode::UNAUTHORIZED,
            TrackerError::NotFound { .. } => StatusCode::NOT_FOUND,
            TrackerError::Remote(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
