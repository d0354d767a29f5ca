use thiserror::Error;

#[derive(Error, Debug)]
pub enum BaseDbError {
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Collection not found: {database}/{collection}")]
    CollectionNotFound { database: String, collection: String },

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Method {method} not allowed, expected {expected}")]
    MethodNotAllowed { method: String, expected: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Persist error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl BaseDbError {
    /// HTTP-style status code for the error category.
    pub fn status_code(&self) -> u16 {
        match self {
            BaseDbError::DatabaseNotFound(_)
            | BaseDbError::CollectionNotFound { .. }
            | BaseDbError::NotFound(_) => 404,
            BaseDbError::Conflict(_) => 409,
            BaseDbError::BadRequest(_) | BaseDbError::InvalidQuery(_) => 400,
            BaseDbError::MethodNotAllowed { .. } => 405,
            _ => 500,
        }
    }

    /// Whether the error describes a caller mistake rather than a server fault.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}

pub type Result<T> = std::result::Result<T, BaseDbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BaseDbError::DatabaseNotFound("shop".into()).status_code(), 404);
        assert_eq!(BaseDbError::Conflict("users".into()).status_code(), 409);
        assert_eq!(BaseDbError::InvalidQuery("$foo".into()).status_code(), 400);
        assert_eq!(
            BaseDbError::MethodNotAllowed {
                method: "GET".into(),
                expected: "POST".into()
            }
            .status_code(),
            405
        );
        let io = BaseDbError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.status_code(), 500);
        assert!(!io.is_client_error());
    }
}
