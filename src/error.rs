use thiserror::Error;

/// Error type for sqlbind operations
#[derive(Debug, Error)]
pub enum SqlBindError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Unable to create statement: {message} (parameter {parameter}) [statement: {template}]")]
    StatementConstruction {
        template: String,
        parameter: String,
        message: String,
    },

    #[error(
        "Unable to create statement: No type parameters found for {type_name} bound to parameter {parameter}; \
         declare an element type qualifier [statement: {template}]"
    )]
    NoTypeParameters {
        template: String,
        parameter: String,
        type_name: &'static str,
    },

    #[error("Unable to produce result: {message}; column {index} ({label})")]
    ResultProduction {
        index: usize,
        label: String,
        message: String,
    },

    #[error("Usage error: {0}")]
    Usage(String),
}

/// Semantic classification of a [`SqlBindError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Execution,
    StatementConstruction,
    ResultProduction,
    Usage,
}

impl SqlBindError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlBindError::ConnectionFailed(_) => ErrorKind::Connection,
            SqlBindError::QueryFailed(_) => ErrorKind::Execution,
            SqlBindError::UnexpectedRowCount { .. } => ErrorKind::ResultProduction,
            SqlBindError::StatementConstruction { .. } | SqlBindError::NoTypeParameters { .. } => {
                ErrorKind::StatementConstruction
            }
            SqlBindError::ResultProduction { .. } => ErrorKind::ResultProduction,
            SqlBindError::Usage(_) => ErrorKind::Usage,
        }
    }

    pub(crate) fn statement(
        template: impl Into<String>,
        parameter: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        SqlBindError::StatementConstruction {
            template: template.into(),
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        SqlBindError::Usage(message.into())
    }
}

/// Result type alias for sqlbind operations
pub type Result<T> = std::result::Result<T, SqlBindError>;
