//! Database errors and their translation to [`PortError`]

use core_kernel::PortError;
use thiserror::Error;

/// SQLSTATE classes the billing schema relies on
mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const QUERY_CANCELED: &str = "57014";
}

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Statement timed out: {0}")]
    StatementTimeout(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    /// A unique index rejected the write, e.g. a reused invoice number
    #[error("Unique constraint {constraint} violated: {message}")]
    UniqueViolation { constraint: String, message: String },

    #[error("Foreign key {constraint} violated: {message}")]
    ForeignKeyViolation { constraint: String, message: String },

    #[error("Check constraint {constraint} violated: {message}")]
    CheckViolation { constraint: String, message: String },

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value does not decode into its domain type
    #[error("Undecodable column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),
}

impl DatabaseError {
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Invoice", "INV-000042");
    /// assert!(error.to_string().contains("INV-000042"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} '{}'", entity, id))
    }

    pub fn decode(column: &str, err: impl std::fmt::Display) -> Self {
        DatabaseError::Decode {
            column: column.to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Whether the same statement may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_)
                | DatabaseError::PoolExhausted
                | DatabaseError::StatementTimeout(_)
        )
    }

    /// Resolves a generic [`DatabaseError::SqlError`] into its specific variant
    pub fn classify(self) -> Self {
        match self {
            DatabaseError::SqlError(ref e) => DatabaseError::from(e),
            other => other,
        }
    }
}

impl From<&sqlx::Error> for DatabaseError {
    fn from(error: &sqlx::Error) -> Self {
        let db_err = match error {
            sqlx::Error::RowNotFound => return DatabaseError::NotFound("row".to_string()),
            sqlx::Error::PoolTimedOut => return DatabaseError::PoolExhausted,
            sqlx::Error::PoolClosed => {
                return DatabaseError::ConnectionFailed("pool closed".to_string())
            }
            sqlx::Error::Io(e) => return DatabaseError::ConnectionFailed(e.to_string()),
            sqlx::Error::Database(db_err) => db_err,
            other => return DatabaseError::QueryFailed(other.to_string()),
        };

        let constraint = db_err.constraint().unwrap_or("unnamed").to_string();
        let message = db_err.message().to_string();
        match db_err.code().as_deref() {
            Some(sqlstate::UNIQUE_VIOLATION) => DatabaseError::UniqueViolation { constraint, message },
            Some(sqlstate::FOREIGN_KEY_VIOLATION) => {
                DatabaseError::ForeignKeyViolation { constraint, message }
            }
            Some(sqlstate::CHECK_VIOLATION) => DatabaseError::CheckViolation { constraint, message },
            Some(sqlstate::QUERY_CANCELED) => DatabaseError::StatementTimeout(message),
            _ => DatabaseError::QueryFailed(message),
        }
    }
}

/// Connection trouble and timeouts become transient [`PortError::Connection`]
/// so the job runner retries them; constraint violations become conflicts.
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error.classify() {
            DatabaseError::NotFound(what) => PortError::not_found("Record", what),
            e @ (DatabaseError::UniqueViolation { .. }
            | DatabaseError::ForeignKeyViolation { .. }
            | DatabaseError::CheckViolation { .. }) => PortError::conflict(e.to_string()),
            e if e.is_transient() => PortError::connection(e.to_string()),
            e => PortError::internal(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_port_not_found() {
        let port: PortError = DatabaseError::not_found("Invoice", "abc").into();
        assert!(port.is_not_found());
    }

    #[test]
    fn test_row_not_found_is_classified() {
        let error = DatabaseError::SqlError(sqlx::Error::RowNotFound).classify();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_pool_timeout_is_transient() {
        let port: PortError = DatabaseError::from(sqlx::Error::PoolTimedOut).into();
        assert!(port.is_transient());
    }

    #[test]
    fn test_unique_violation_is_conflict_naming_the_constraint() {
        let port: PortError = DatabaseError::UniqueViolation {
            constraint: "invoices_public_token_key".into(),
            message: "duplicate key value".into(),
        }
        .into();
        assert!(port.is_conflict());
        assert!(port.to_string().contains("invoices_public_token_key"));
    }

    #[test]
    fn test_decode_failure_is_internal() {
        let port: PortError = DatabaseError::decode("invoices.status", "unknown status 'LOST'").into();
        assert!(matches!(port, PortError::Internal { .. }));
    }
}
