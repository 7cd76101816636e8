//! Store error taxonomy and failure classifier
//!
//! Driver failures reach this boundary as plain diagnostic text. [`classify`]
//! triages that text into a closed set of outcomes so every data-access
//! operation handles "record already there", "record still referenced" and
//! "something is actually broken" the same way.

use thiserror::Error;

/// Markers a driver uses to report a uniqueness violation
const DUPLICATE_MARKERS: [&str; 2] = ["Duplicate", "UNIQUE constraint failed"];

/// Markers a driver uses to report a referential-constraint violation
const CONSTRAINT_MARKERS: [&str; 2] = ["CONSTRAINT", "FOREIGN KEY constraint failed"];

/// Named foreign-key constraints of the physical schema
///
/// SQLite's own foreign-key message never names the constraint, so native
/// violations classify as `Unknown`; only diagnostics that carry the name
/// (triggers raising it, other drivers) resolve to a registered key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKey {
    CustomerId,
    CouponId,
    CompanyId,
    ArchiveCoupon,
    ArchiveCustomer,
    ArchiveCompany,
    /// Constraint violation that names none of the registered constraints
    Unknown,
}

impl ConstraintKey {
    /// Registry in match order
    pub const REGISTRY: [ConstraintKey; 6] = [
        ConstraintKey::CustomerId,
        ConstraintKey::CouponId,
        ConstraintKey::CompanyId,
        ConstraintKey::ArchiveCoupon,
        ConstraintKey::ArchiveCustomer,
        ConstraintKey::ArchiveCompany,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKey::CustomerId => "FK_CUSTOMER_ID",
            ConstraintKey::CouponId => "FK_COUPON_ID",
            ConstraintKey::CompanyId => "FK_COMPANY_ID",
            ConstraintKey::ArchiveCoupon => "FK_ARCHIVE_COUPON",
            ConstraintKey::ArchiveCustomer => "FK_ARCHIVE_CUSTOMER",
            ConstraintKey::ArchiveCompany => "FK_ARCHIVE_COMPANY",
            ConstraintKey::Unknown => "UNKNOWN",
        }
    }

    /// First registered constraint named in `diagnostic`, else `Unknown`
    pub fn find_in(diagnostic: &str) -> Self {
        Self::REGISTRY
            .into_iter()
            .find(|key| diagnostic.contains(key.as_str()))
            .unwrap_or(ConstraintKey::Unknown)
    }
}

impl std::fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection pool failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("[Pool] invalid configuration: {0}")]
    Config(String),

    #[error("[Pool] failed to open connection {index}: {message}")]
    Connect { index: usize, message: String },

    #[error("[Pool] failed to acquire a connection: {0}")]
    Acquire(String),

    #[error("[Pool] no connection became available within {0:?}")]
    Timeout(std::time::Duration),

    #[error("[Pool] pool full: a connection was returned beyond capacity {capacity}")]
    PoolFull { capacity: usize },

    #[error("[Pool] pool is closed")]
    Closed,
}

/// Typed outcome of a failed store call
///
/// Every variant carries the raw diagnostic text (see [`StoreError::diagnostic`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Duplicate key error")]
    DuplicateKey { query: String, diagnostic: String },

    #[error("Foreign key error: {key}")]
    ForeignKey {
        key: ConstraintKey,
        query: String,
        diagnostic: String,
    },

    #[error("Statement error: unable to release prepared statements")]
    StatementLifecycle { diagnostic: String },

    #[error("Unexpected store error")]
    Unclassified { query: String, diagnostic: String },

    #[error("{0}")]
    Pool(#[from] PoolError),
}

impl StoreError {
    /// Short classification label
    pub fn classification(&self) -> &'static str {
        match self {
            StoreError::IllegalArgument(_) => "ILLEGAL_ARGUMENT",
            StoreError::DuplicateKey { .. } => "DUPLICATE_KEY",
            StoreError::ForeignKey { .. } => "FOREIGN_KEY",
            StoreError::StatementLifecycle { .. } => "STATEMENT_LIFECYCLE",
            StoreError::Unclassified { .. } => "UNCLASSIFIED",
            StoreError::Pool(_) => "POOL",
        }
    }

    /// Raw underlying diagnostic text
    pub fn diagnostic(&self) -> String {
        match self {
            StoreError::IllegalArgument(message) => message.clone(),
            StoreError::DuplicateKey { diagnostic, .. }
            | StoreError::ForeignKey { diagnostic, .. }
            | StoreError::StatementLifecycle { diagnostic }
            | StoreError::Unclassified { diagnostic, .. } => diagnostic.clone(),
            StoreError::Pool(err) => err.to_string(),
        }
    }

    /// Statement text that produced the failure, when known
    pub fn query(&self) -> Option<&str> {
        match self {
            StoreError::DuplicateKey { query, .. }
            | StoreError::ForeignKey { query, .. }
            | StoreError::Unclassified { query, .. } => Some(query),
            _ => None,
        }
    }

    /// Operator-facing detail: classification, statement and diagnostic
    pub fn details(&self) -> String {
        match self.query() {
            Some(query) => format!(
                "[{}] statement '{}' failed: {}",
                self.classification(),
                query,
                self.diagnostic()
            ),
            None => format!("[{}] {}", self.classification(), self.diagnostic()),
        }
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    pub fn is_foreign_key(&self) -> bool {
        matches!(self, StoreError::ForeignKey { .. })
    }

    /// Business outcomes that callers report as "could not complete"
    pub fn is_business_outcome(&self) -> bool {
        self.is_duplicate_key() || self.is_foreign_key()
    }
}

/// Store result alias
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Classify a failed statement by its diagnostic text
///
/// Uniqueness markers take precedence over constraint markers.
pub fn classify(query: &str, diagnostic: &str) -> StoreError {
    let query = query.to_string();
    let raw = diagnostic.to_string();

    if DUPLICATE_MARKERS.iter().any(|m| diagnostic.contains(m)) {
        return StoreError::DuplicateKey {
            query,
            diagnostic: raw,
        };
    }

    if CONSTRAINT_MARKERS.iter().any(|m| diagnostic.contains(m)) {
        return StoreError::ForeignKey {
            key: ConstraintKey::find_in(diagnostic),
            query,
            diagnostic: raw,
        };
    }

    StoreError::Unclassified {
        query,
        diagnostic: raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSERT: &str = "INSERT INTO customer_coupon (cust_id, coupon_id) VALUES (?, ?)";

    #[test]
    fn test_known_foreign_key_is_reported_by_name() {
        let diagnostic = "Cannot add or update a child row: a foreign key constraint fails \
             (`coupon_db`.`customer_coupon`, CONSTRAINT `FK_CUSTOMER_ID` FOREIGN KEY (`CUST_ID`))";

        let err = classify(INSERT, diagnostic);

        match err {
            StoreError::ForeignKey {
                key,
                query,
                diagnostic: raw,
            } => {
                assert_eq!(key, ConstraintKey::CustomerId);
                assert_eq!(query, INSERT);
                assert_eq!(raw, diagnostic);
            }
            other => panic!("expected ForeignKey, got {:?}", other),
        }
    }

    #[test]
    fn test_every_registered_key_is_recognized() {
        for key in ConstraintKey::REGISTRY {
            let diagnostic = format!("CONSTRAINT `{}` violated", key.as_str());
            match classify(INSERT, &diagnostic) {
                StoreError::ForeignKey { key: found, .. } => assert_eq!(found, key),
                other => panic!("expected ForeignKey for {}, got {:?}", key, other),
            }
        }
    }

    #[test]
    fn test_unregistered_constraint_is_unknown() {
        let err = classify(INSERT, "a foreign key constraint fails (CONSTRAINT `FK_SOMETHING_ELSE`)");
        assert!(matches!(
            err,
            StoreError::ForeignKey {
                key: ConstraintKey::Unknown,
                ..
            }
        ));
        assert_eq!(ConstraintKey::Unknown.as_str(), "UNKNOWN");
    }

    #[test]
    fn test_sqlite_foreign_key_message_is_unknown_constraint() {
        let err = classify(INSERT, "FOREIGN KEY constraint failed");
        assert!(matches!(
            err,
            StoreError::ForeignKey {
                key: ConstraintKey::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_wins_over_constraint() {
        let err = classify(
            INSERT,
            "Duplicate entry '7-3' for key 'PRIMARY' (CONSTRAINT `FK_COUPON_ID`)",
        );
        assert!(err.is_duplicate_key());

        let err = classify(INSERT, "UNIQUE constraint failed: archive_coupon.old_id CONSTRAINT");
        assert!(err.is_duplicate_key());
    }

    #[test]
    fn test_other_failures_are_unclassified() {
        let err = classify("SELECT * FROM nope", "no such table: nope");
        assert_eq!(err.classification(), "UNCLASSIFIED");
        assert_eq!(err.query(), Some("SELECT * FROM nope"));
        assert_eq!(err.diagnostic(), "no such table: nope");

        // lower-case "constraint" from NOT NULL / CHECK is not a referential marker
        let err = classify(INSERT, "NOT NULL constraint failed: coupon.title");
        assert!(matches!(err, StoreError::Unclassified { .. }));
    }

    #[test]
    fn test_details_carry_classification_and_diagnostic() {
        let err = classify(INSERT, "Duplicate entry");
        let details = err.details();
        assert!(details.contains("DUPLICATE_KEY"));
        assert!(details.contains(INSERT));
        assert!(details.contains("Duplicate entry"));

        let err = StoreError::StatementLifecycle {
            diagnostic: "statement busy".to_string(),
        };
        assert_eq!(err.details(), "[STATEMENT_LIFECYCLE] statement busy");
    }

    #[test]
    fn test_pool_errors_convert() {
        let err: StoreError = PoolError::Closed.into();
        assert_eq!(err.classification(), "POOL");
        assert!(err.diagnostic().contains("closed"));
        assert!(!err.is_business_outcome());
    }
}
