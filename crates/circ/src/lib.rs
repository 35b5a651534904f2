//! # circ-core
//!
//! Typed records and the data-access contract for a small circulating
//! library inventory: books, members, and the loans linking them.
//!
//! The one piece of real logic in the system is the loan lifecycle and the
//! copy-availability invariant: a book is never out more times than it has
//! physical copies, and every loan moves through a clean open -> closed
//! state with no double-returns and no orphaned transitions. Everything
//! around that (page rendering, routing, external catalog lookups) is a
//! caller of the [`LendingStore`] contract, not part of it.
//!
//! ## Key Invariants
//!
//! 1. **Availability is derived** - the open-loan count is recomputed from
//!    the ledger, never cached, so a stored counter can't drift.
//! 2. **Borrow is atomic** - the availability check and the loan insert are
//!    one unit with respect to concurrent borrows of the same book.
//! 3. **Closed is terminal** - a repeat return reports
//!    [`ReturnOutcome::AlreadyReturned`] and changes nothing.
//! 4. **Uniqueness is sparse** - `isbn` and `email` are unique among
//!    present values; absent values never collide.
//! 5. **Deletes don't cascade** - removing a book or member leaves its
//!    loans in the ledger; they drop out of joined listings only.
//!
//! ## Example
//!
//! ```ignore
//! use circ_core::{BookDraft, InMemoryLendingStore, LendingStore, MemberDraft};
//!
//! let store = InMemoryLendingStore::new();
//!
//! let dune = store.create_book(BookDraft::new("Dune").copies(2)).await?;
//! let ada = store.create_member(MemberDraft::new("Ada")).await?;
//!
//! let loan = store.borrow(dune.id, ada.id).await?;
//! store.return_loan(loan.id).await?;
//! ```
//!
//! Durable storage lives in the `circ-store-sqlite` crate; this crate ships
//! [`InMemoryLendingStore`] for tests and embedding.

// Core modules
mod error;
mod memory;
mod record;
mod store;

// Lifecycle and concurrency tests (test-only)
#[cfg(test)]
mod lifecycle_tests;

// Re-export error types
pub use crate::error::{Entity, StoreError, StoreResult};

// Re-export record types
pub use crate::record::{Book, BookDraft, Loan, LoanView, Member, MemberDraft};

// Re-export the store contract
pub use crate::store::{LendingStore, ReturnOutcome, SearchResults};

// Re-export the in-memory reference implementation
pub use crate::memory::InMemoryLendingStore;

// Re-export commonly used external types
pub use async_trait::async_trait;
