//! The data-access contract consumed by the presentation layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::record::{Book, BookDraft, Loan, LoanView, Member, MemberDraft};

/// Outcome of a return request.
///
/// A redundant return is a benign, reportable condition rather than an
/// error: the caller's flow continues either way, and the stored loan is
/// left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnOutcome {
    /// The loan transitioned open -> closed.
    Closed(Loan),
    /// The loan was already closed; nothing changed.
    AlreadyReturned(Loan),
}

impl ReturnOutcome {
    /// The loan as it now stands, whichever way the request went.
    pub fn loan(&self) -> &Loan {
        match self {
            ReturnOutcome::Closed(loan) | ReturnOutcome::AlreadyReturned(loan) => loan,
        }
    }

    /// Whether this request performed the open -> closed transition.
    pub fn closed_now(&self) -> bool {
        matches!(self, ReturnOutcome::Closed(_))
    }
}

/// Books and members matching a directory search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub books: Vec<Book>,
    pub members: Vec<Member>,
}

/// Durable store for books, members, and the loans linking them.
///
/// All implementations must satisfy these invariants:
/// - A book is never out more times than it has copies. `borrow` re-checks
///   availability and inserts the loan as one atomic unit with respect to
///   concurrent borrows of the same book.
/// - Loans move open -> closed exactly once. Closed is terminal; a repeat
///   return reports [`ReturnOutcome::AlreadyReturned`] and changes nothing.
/// - `isbn` and `email` are unique among present values; records without
///   them never collide with each other.
/// - Deletes are idempotent and do not cascade: loans referencing a deleted
///   book or member stay in the ledger (and keep counting as open), they
///   just drop out of the joined [`LoanView`] listing.
/// - Every operation is transaction-scoped. An operation that fails or is
///   abandoned leaves no partial writes behind.
#[async_trait]
pub trait LendingStore: Send + Sync {
    // Books

    /// Add a book. Fails with `DuplicateKey` if the draft's ISBN is taken.
    async fn create_book(&self, draft: BookDraft) -> StoreResult<Book>;

    /// Fetch a book by id, or `NotFound`.
    async fn get_book(&self, id: i64) -> StoreResult<Book>;

    /// Replace every field of a book with the draft's.
    async fn update_book(&self, id: i64, draft: BookDraft) -> StoreResult<Book>;

    /// Remove a book. Succeeds even if the id is unknown.
    async fn delete_book(&self, id: i64) -> StoreResult<()>;

    // Members

    /// Register a member. Fails with `DuplicateKey` if the email is taken.
    async fn create_member(&self, draft: MemberDraft) -> StoreResult<Member>;

    /// Fetch a member by id, or `NotFound`.
    async fn get_member(&self, id: i64) -> StoreResult<Member>;

    /// Replace every field of a member with the draft's.
    async fn update_member(&self, id: i64, draft: MemberDraft) -> StoreResult<Member>;

    /// Remove a member. Succeeds even if the id is unknown.
    async fn delete_member(&self, id: i64) -> StoreResult<()>;

    // Inventory ledger

    /// Number of open loans for a book. Zero for an unknown book, never
    /// negative. Derived from the loan ledger on every call, not cached.
    async fn active_loan_count(&self, book_id: i64) -> StoreResult<i64>;

    /// Whether at least one copy is on the shelf right now.
    ///
    /// Requires the book to exist; fails with `NotFound` otherwise. This is
    /// an advisory read: `borrow` re-checks under its own atomic unit.
    async fn is_available(&self, book_id: i64) -> StoreResult<bool> {
        let book = self.get_book(book_id).await?;
        Ok(self.active_loan_count(book_id).await? < book.copies)
    }

    // Loan lifecycle

    /// Open a loan: one copy of `book_id` goes out to `member_id`.
    ///
    /// Validates that both records exist (`NotFound`), then atomically
    /// re-checks availability and inserts the loan (`NoCopiesAvailable`).
    async fn borrow(&self, book_id: i64, member_id: i64) -> StoreResult<Loan>;

    /// Close a loan: the copy is back on the shelf.
    ///
    /// `NotFound` if the loan id is unknown. Returning an already-closed
    /// loan is benign and leaves its `returned_on` untouched.
    async fn return_loan(&self, loan_id: i64) -> StoreResult<ReturnOutcome>;

    // Directory

    /// All books, ordered by title.
    async fn list_books(&self) -> StoreResult<Vec<Book>>;

    /// All members, ordered by name.
    async fn list_members(&self) -> StoreResult<Vec<Member>>;

    /// All loans joined with book title and member name, newest first.
    /// Loans whose book or member has been deleted are omitted.
    async fn list_loans(&self) -> StoreResult<Vec<LoanView>>;

    /// Case-insensitive substring search over title/author/isbn for books
    /// and name/email for members. An empty or whitespace-only query
    /// returns empty results without querying the store.
    async fn search(&self, query: &str) -> StoreResult<SearchResults>;

    /// Accept a candidate from an external catalog lookup as a new book
    /// with a single copy. Fails with `DuplicateKey` if the ISBN is taken.
    async fn import_candidate(
        &self,
        title: &str,
        author: Option<&str>,
        isbn: Option<&str>,
    ) -> StoreResult<Book> {
        let mut draft = BookDraft::new(title);
        draft.author = author.map(str::to_owned);
        draft.isbn = isbn.map(str::to_owned);
        self.create_book(draft).await
    }
}
