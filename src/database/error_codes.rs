//! PostgreSQL Error Codes
//!
//! SQLSTATE constants checked when driver errors are translated into ledger
//! errors. Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// PostgreSQL SQLSTATE error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    /// Unique violation (duplicate key) - Code 23505
    ///
    /// Raised when a debit with an already-recorded transaction id is inserted.
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    /// Foreign key violation - Code 23503
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";

    /// Check constraint violation - Code 23514
    ///
    /// Raised by the non-negative balance and status constraints.
    pub const CHECK_VIOLATION: &'static str = "23514";

    /// Serialization failure - Code 40001
    pub const SERIALIZATION_FAILURE: &'static str = "40001";

    pub fn is_unique_violation(code: &str) -> bool {
        code == Self::UNIQUE_VIOLATION
    }

    pub fn is_check_violation(code: &str) -> bool {
        code == Self::CHECK_VIOLATION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_predicates() {
        assert!(PgErrorCode::is_unique_violation("23505"));
        assert!(!PgErrorCode::is_unique_violation("23503"));
        assert!(PgErrorCode::is_check_violation("23514"));
    }
}
