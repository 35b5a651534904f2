//! Error taxonomy for lending-store operations.
//!
//! Every error is local to a single operation and leaves no partial effect.
//! Nothing here is retried automatically; store unavailability is fatal to
//! the operation and surfaced as-is.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

/// The kind of record an operation referred to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Book,
    Member,
    Loan,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Book => f.write_str("book"),
            Entity::Member => f.write_str("member"),
            Entity::Loan => f.write_str("loan"),
        }
    }
}

/// Errors from lending-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced record does not exist. The operation had no effect.
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// Uniqueness violation on `isbn` or `email`. Prior state is unchanged.
    #[error("{field} already in use")]
    DuplicateKey { field: &'static str },

    /// Borrow rejected: every copy of the book is already out.
    #[error("no copies of book {book_id} available")]
    NoCopiesAvailable { book_id: i64 },

    /// An input draft violated a record invariant and never reached the store.
    #[error("invalid record: {0}")]
    Invalid(&'static str),

    /// The underlying store failed. Fatal to this operation, never retried.
    #[error("store unavailable: {0}")]
    Db(#[source] Box<dyn StdError + Send + Sync>),
}

impl StoreError {
    /// Wrap a backend error as store unavailability.
    pub fn db(err: impl StdError + Send + Sync + 'static) -> Self {
        Self::Db(Box::new(err))
    }

    /// Shorthand for [`StoreError::NotFound`].
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_record_kind() {
        let err = StoreError::not_found(Entity::Book, 7);
        assert_eq!(err.to_string(), "book 7 not found");
    }

    #[test]
    fn duplicate_key_names_the_field() {
        let err = StoreError::DuplicateKey { field: "isbn" };
        assert_eq!(err.to_string(), "isbn already in use");
    }
}
