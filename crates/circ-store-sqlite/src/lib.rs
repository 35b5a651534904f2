//! SQLite implementation of the circ lending store.
//!
//! This crate provides the durable implementation of the [`LendingStore`]
//! trait from `circ-core`, backed by an embedded SQLite database via sqlx.
//!
//! # Features
//!
//! - Declarative capacity guard: the availability check and the loan insert
//!   are one conditional `INSERT ... RETURNING` statement, so no
//!   interleaving of pooled connections can oversubscribe a book's copies
//! - Uniqueness constraints on `isbn` and `email` mapped to typed
//!   `DuplicateKey` errors at the store boundary
//! - Idempotent schema migration on open
//! - WAL journaling for file-backed stores
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE books (
//!     id      INTEGER PRIMARY KEY AUTOINCREMENT,
//!     title   TEXT NOT NULL,
//!     author  TEXT,
//!     isbn    TEXT UNIQUE,
//!     copies  INTEGER NOT NULL DEFAULT 1 CHECK (copies >= 1)
//! );
//!
//! CREATE TABLE members (
//!     id      INTEGER PRIMARY KEY AUTOINCREMENT,
//!     name    TEXT NOT NULL,
//!     email   TEXT UNIQUE
//! );
//!
//! CREATE TABLE loans (
//!     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//!     book_id     INTEGER NOT NULL,
//!     member_id   INTEGER NOT NULL,
//!     borrowed_on TEXT NOT NULL,
//!     returned_on TEXT,
//!     FOREIGN KEY(book_id) REFERENCES books(id),
//!     FOREIGN KEY(member_id) REFERENCES members(id)
//! );
//!
//! CREATE INDEX idx_loans_open ON loans (book_id)
//!     WHERE returned_on IS NULL;
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use circ_core::{BookDraft, LendingStore, MemberDraft};
//! use circ_store_sqlite::SqliteLendingStore;
//!
//! let store = SqliteLendingStore::open("library.db").await?;
//!
//! let book = store.create_book(BookDraft::new("Dune").copies(2)).await?;
//! let member = store.create_member(MemberDraft::new("Ada")).await?;
//! let loan = store.borrow(book.id, member.id).await?;
//! ```

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use circ_core::{
    Book, BookDraft, Entity, LendingStore, Loan, LoanView, Member, MemberDraft, ReturnOutcome,
    SearchResults, StoreError, StoreResult,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

// Statements are individually idempotent so migration can rerun on every open.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        title   TEXT NOT NULL,
        author  TEXT,
        isbn    TEXT UNIQUE,
        copies  INTEGER NOT NULL DEFAULT 1 CHECK (copies >= 1)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS members (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT NOT NULL,
        email   TEXT UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS loans (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        book_id     INTEGER NOT NULL,
        member_id   INTEGER NOT NULL,
        borrowed_on TEXT NOT NULL,
        returned_on TEXT,
        FOREIGN KEY(book_id) REFERENCES books(id),
        FOREIGN KEY(member_id) REFERENCES members(id)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_loans_open ON loans (book_id)
        WHERE returned_on IS NULL
    "#,
];

/// SQLite lending store.
#[derive(Clone)]
pub struct SqliteLendingStore {
    pool: SqlitePool,
}

impl SqliteLendingStore {
    /// Wrap an existing connection pool. The schema is not touched; call
    /// [`migrate`](Self::migrate) if the database may be fresh.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) a file-backed store and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // Foreign references are declarative only: the design keeps deletes
            // non-cascading and non-blocking, so dangling loans survive a delete
            // (spec §3/§9). sqlx enables foreign_keys by default; turn it back off.
            .foreign_keys(false)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::db)?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Open a private in-memory store and migrate it.
    ///
    /// Every connection to `:memory:` gets its own database, so the pool is
    /// pinned to one connection that is never recycled.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::new().in_memory(true).foreign_keys(false);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(StoreError::db)?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Create the three relations and the open-loan index if absent.
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(StoreError::db)?;
        }
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn book_from_row(row: &SqliteRow) -> Book {
    Book {
        id: row.get("id"),
        title: row.get("title"),
        author: row.get("author"),
        isbn: row.get("isbn"),
        copies: row.get("copies"),
    }
}

fn member_from_row(row: &SqliteRow) -> Member {
    Member {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
    }
}

fn loan_from_row(row: &SqliteRow) -> Loan {
    Loan {
        id: row.get("id"),
        book_id: row.get("book_id"),
        member_id: row.get("member_id"),
        borrowed_on: row.get("borrowed_on"),
        returned_on: row.get("returned_on"),
    }
}

/// Map a constraint violation on the named field to `DuplicateKey`;
/// everything else is store unavailability.
fn unique(field: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |err| match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateKey { field }
        }
        _ => StoreError::db(err),
    }
}

#[async_trait]
impl LendingStore for SqliteLendingStore {
    async fn create_book(&self, draft: BookDraft) -> StoreResult<Book> {
        let draft = draft.normalize()?;
        let row = sqlx::query(
            r#"
            INSERT INTO books (title, author, isbn, copies)
            VALUES (?1, ?2, ?3, ?4)
            RETURNING id, title, author, isbn, copies
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.isbn)
        .bind(draft.copies)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("isbn"))?;

        let book = book_from_row(&row);
        tracing::debug!(book_id = book.id, "book added");
        Ok(book)
    }

    async fn get_book(&self, id: i64) -> StoreResult<Book> {
        sqlx::query("SELECT id, title, author, isbn, copies FROM books WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::db)?
            .map(|row| book_from_row(&row))
            .ok_or_else(|| StoreError::not_found(Entity::Book, id))
    }

    async fn update_book(&self, id: i64, draft: BookDraft) -> StoreResult<Book> {
        let draft = draft.normalize()?;
        sqlx::query(
            r#"
            UPDATE books
            SET title = ?1, author = ?2, isbn = ?3, copies = ?4
            WHERE id = ?5
            RETURNING id, title, author, isbn, copies
            "#,
        )
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.isbn)
        .bind(draft.copies)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unique("isbn"))?
        .map(|row| book_from_row(&row))
        .ok_or_else(|| StoreError::not_found(Entity::Book, id))
    }

    async fn delete_book(&self, id: i64) -> StoreResult<()> {
        // Idempotent; loans referencing the book are left in place.
        sqlx::query("DELETE FROM books WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(())
    }

    async fn create_member(&self, draft: MemberDraft) -> StoreResult<Member> {
        let draft = draft.normalize()?;
        let row = sqlx::query(
            r#"
            INSERT INTO members (name, email)
            VALUES (?1, ?2)
            RETURNING id, name, email
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.email)
        .fetch_one(&self.pool)
        .await
        .map_err(unique("email"))?;

        let member = member_from_row(&row);
        tracing::debug!(member_id = member.id, "member added");
        Ok(member)
    }

    async fn get_member(&self, id: i64) -> StoreResult<Member> {
        sqlx::query("SELECT id, name, email FROM members WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::db)?
            .map(|row| member_from_row(&row))
            .ok_or_else(|| StoreError::not_found(Entity::Member, id))
    }

    async fn update_member(&self, id: i64, draft: MemberDraft) -> StoreResult<Member> {
        let draft = draft.normalize()?;
        sqlx::query(
            r#"
            UPDATE members
            SET name = ?1, email = ?2
            WHERE id = ?3
            RETURNING id, name, email
            "#,
        )
        .bind(&draft.name)
        .bind(&draft.email)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unique("email"))?
        .map(|row| member_from_row(&row))
        .ok_or_else(|| StoreError::not_found(Entity::Member, id))
    }

    async fn delete_member(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM members WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(())
    }

    async fn active_loan_count(&self, book_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE book_id = ?1 AND returned_on IS NULL",
        )
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::db)
    }

    /// Open a loan with a declarative capacity guard.
    ///
    /// The insert carries its own availability predicate, so the check and
    /// the write land in one statement. Zero rows back means every copy is
    /// out.
    async fn borrow(&self, book_id: i64, member_id: i64) -> StoreResult<Loan> {
        // Precise NotFound errors before the guarded insert.
        self.get_book(book_id).await?;
        self.get_member(member_id).await?;

        let borrowed_on: DateTime<Utc> = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO loans (book_id, member_id, borrowed_on)
            SELECT ?1, ?2, ?3
            WHERE (SELECT COUNT(*) FROM loans
                   WHERE book_id = ?1 AND returned_on IS NULL)
                < (SELECT copies FROM books WHERE id = ?1)
            RETURNING id, book_id, member_id, borrowed_on, returned_on
            "#,
        )
        .bind(book_id)
        .bind(member_id)
        .bind(borrowed_on)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::db)?;

        match row {
            Some(row) => {
                let loan = loan_from_row(&row);
                tracing::info!(loan_id = loan.id, book_id, member_id, "loan opened");
                Ok(loan)
            }
            None => Err(StoreError::NoCopiesAvailable { book_id }),
        }
    }

    /// Close a loan. The `returned_on IS NULL` predicate keeps the closed
    /// state terminal: a raced or repeated return can never move the
    /// timestamp.
    async fn return_loan(&self, loan_id: i64) -> StoreResult<ReturnOutcome> {
        let returned_on: DateTime<Utc> = Utc::now();
        let row = sqlx::query(
            r#"
            UPDATE loans
            SET returned_on = ?1
            WHERE id = ?2 AND returned_on IS NULL
            RETURNING id, book_id, member_id, borrowed_on, returned_on
            "#,
        )
        .bind(returned_on)
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::db)?;

        if let Some(row) = row {
            let loan = loan_from_row(&row);
            tracing::info!(loan_id, book_id = loan.book_id, "loan closed");
            return Ok(ReturnOutcome::Closed(loan));
        }

        // Either the loan is unknown or it was already closed.
        sqlx::query(
            "SELECT id, book_id, member_id, borrowed_on, returned_on FROM loans WHERE id = ?1",
        )
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::db)?
        .map(|row| ReturnOutcome::AlreadyReturned(loan_from_row(&row)))
        .ok_or_else(|| StoreError::not_found(Entity::Loan, loan_id))
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        let rows =
            sqlx::query("SELECT id, title, author, isbn, copies FROM books ORDER BY title, id")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::db)?;
        Ok(rows.iter().map(book_from_row).collect())
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        let rows = sqlx::query("SELECT id, name, email FROM members ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::db)?;
        Ok(rows.iter().map(member_from_row).collect())
    }

    async fn list_loans(&self) -> StoreResult<Vec<LoanView>> {
        let rows = sqlx::query(
            r#"
            SELECT loans.id, loans.borrowed_on, loans.returned_on,
                   books.title AS book_title, members.name AS member_name
            FROM loans
            JOIN books ON loans.book_id = books.id
            JOIN members ON loans.member_id = members.id
            ORDER BY loans.borrowed_on DESC, loans.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?;

        Ok(rows
            .iter()
            .map(|row| LoanView {
                id: row.get("id"),
                book_title: row.get("book_title"),
                member_name: row.get("member_name"),
                borrowed_on: row.get("borrowed_on"),
                returned_on: row.get("returned_on"),
            })
            .collect())
    }

    async fn search(&self, query: &str) -> StoreResult<SearchResults> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            // An empty search performs no query at all.
            return Ok(SearchResults::default());
        }
        let pattern = format!("%{trimmed}%");

        let books = sqlx::query(
            r#"
            SELECT id, title, author, isbn, copies FROM books
            WHERE title LIKE ?1 OR author LIKE ?1 OR isbn LIKE ?1
            ORDER BY title, id
            "#,
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?
        .iter()
        .map(book_from_row)
        .collect();

        let members = sqlx::query(
            r#"
            SELECT id, name, email FROM members
            WHERE name LIKE ?1 OR email LIKE ?1
            ORDER BY name, id
            "#,
        )
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::db)?
        .iter()
        .map(member_from_row)
        .collect();

        Ok(SearchResults { books, members })
    }
}
