//! Typed records for the three lending relations.
//!
//! Records are constructed once at the store boundary and handed out as
//! plain values; nothing downstream ever touches a raw database row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// A title the library owns, with a physical copy count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    /// Globally unique when present; absent values never collide.
    pub isbn: Option<String>,
    /// Physical copies owned. Always >= 1.
    pub copies: i64,
}

/// A registered borrower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
    /// Globally unique when present; absent values never collide.
    pub email: Option<String>,
}

/// One lending of one copy of a book to a member.
///
/// A loan is open while `returned_on` is `None` and closed once it is set.
/// Closed is terminal; there is no transition back to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    pub book_id: i64,
    pub member_id: i64,
    pub borrowed_on: DateTime<Utc>,
    pub returned_on: Option<DateTime<Utc>>,
}

impl Loan {
    /// The copy is still out.
    pub fn is_open(&self) -> bool {
        self.returned_on.is_none()
    }
}

/// A loan joined with the book title and member name, for directory listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanView {
    pub id: i64,
    pub book_title: String,
    pub member_name: String,
    pub borrowed_on: DateTime<Utc>,
    pub returned_on: Option<DateTime<Utc>>,
}

/// Input record for creating or replacing a book.
///
/// Updates are full-field replaces: every field of the draft overwrites the
/// stored record, so callers editing one field start from the current book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDraft {
    pub title: String,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub copies: i64,
}

impl BookDraft {
    /// Draft a book with one copy and no author or ISBN.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: None,
            isbn: None,
            copies: 1,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn copies(mut self, copies: i64) -> Self {
        self.copies = copies;
        self
    }

    /// Trim fields, drop empty optionals, and reject drafts that violate
    /// record invariants. Stores call this before touching the database.
    pub fn normalize(mut self) -> StoreResult<Self> {
        self.title = self.title.trim().to_owned();
        self.author = normalize_opt(self.author);
        self.isbn = normalize_opt(self.isbn);
        if self.title.is_empty() {
            return Err(StoreError::Invalid("book title must not be empty"));
        }
        if self.copies < 1 {
            return Err(StoreError::Invalid("a book owns at least one copy"));
        }
        Ok(self)
    }
}

/// Input record for creating or replacing a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDraft {
    pub name: String,
    pub email: Option<String>,
}

impl MemberDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
        }
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Trim fields, drop an empty email, and reject a nameless member.
    pub fn normalize(mut self) -> StoreResult<Self> {
        self.name = self.name.trim().to_owned();
        self.email = normalize_opt(self.email);
        if self.name.is_empty() {
            return Err(StoreError::Invalid("member name must not be empty"));
        }
        Ok(self)
    }
}

/// Empty and whitespace-only optionals collapse to `None` so uniqueness
/// applies only to real values.
fn normalize_opt(value: Option<String>) -> Option<String> {
    match value {
        Some(v) => {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_owned())
            }
        }
        None => None,
    }
}
