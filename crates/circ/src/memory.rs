//! In-memory lending store.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::{Entity, StoreError, StoreResult};
use crate::record::{Book, BookDraft, Loan, LoanView, Member, MemberDraft};
use crate::store::{LendingStore, ReturnOutcome, SearchResults};

/// In-memory [`LendingStore`] for tests and embedding.
///
/// Entity tables are concurrent maps, so reads never block. All mutations
/// serialize behind a single gate; holding it across the availability check
/// and the loan insert is what keeps `borrow` atomic here, the same role
/// the conditional insert plays in the SQLite store.
pub struct InMemoryLendingStore {
    books: DashMap<i64, Book>,
    members: DashMap<i64, Member>,
    loans: DashMap<i64, Loan>,
    next_book_id: AtomicI64,
    next_member_id: AtomicI64,
    next_loan_id: AtomicI64,
    write_gate: Mutex<()>,
}

impl InMemoryLendingStore {
    /// Create a new empty store. Ids start at 1 and are never reused.
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            members: DashMap::new(),
            loans: DashMap::new(),
            next_book_id: AtomicI64::new(1),
            next_member_id: AtomicI64::new(1),
            next_loan_id: AtomicI64::new(1),
            write_gate: Mutex::new(()),
        }
    }

    fn isbn_taken(&self, isbn: &str, excluding: Option<i64>) -> bool {
        self.books
            .iter()
            .any(|b| Some(b.id) != excluding && b.isbn.as_deref() == Some(isbn))
    }

    fn email_taken(&self, email: &str, excluding: Option<i64>) -> bool {
        self.members
            .iter()
            .any(|m| Some(m.id) != excluding && m.email.as_deref() == Some(email))
    }

    fn open_loans(&self, book_id: i64) -> i64 {
        self.loans
            .iter()
            .filter(|l| l.book_id == book_id && l.is_open())
            .count() as i64
    }
}

impl Default for InMemoryLendingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LendingStore for InMemoryLendingStore {
    async fn create_book(&self, draft: BookDraft) -> StoreResult<Book> {
        let draft = draft.normalize()?;
        let _gate = self.write_gate.lock().expect("lock poisoned");

        if let Some(isbn) = draft.isbn.as_deref() {
            if self.isbn_taken(isbn, None) {
                return Err(StoreError::DuplicateKey { field: "isbn" });
            }
        }

        let id = self.next_book_id.fetch_add(1, Ordering::Relaxed);
        let book = Book {
            id,
            title: draft.title,
            author: draft.author,
            isbn: draft.isbn,
            copies: draft.copies,
        };
        self.books.insert(id, book.clone());
        tracing::debug!(book_id = id, "book added");
        Ok(book)
    }

    async fn get_book(&self, id: i64) -> StoreResult<Book> {
        self.books
            .get(&id)
            .map(|b| b.clone())
            .ok_or_else(|| StoreError::not_found(Entity::Book, id))
    }

    async fn update_book(&self, id: i64, draft: BookDraft) -> StoreResult<Book> {
        let draft = draft.normalize()?;
        let _gate = self.write_gate.lock().expect("lock poisoned");

        if !self.books.contains_key(&id) {
            return Err(StoreError::not_found(Entity::Book, id));
        }
        if let Some(isbn) = draft.isbn.as_deref() {
            if self.isbn_taken(isbn, Some(id)) {
                return Err(StoreError::DuplicateKey { field: "isbn" });
            }
        }

        let book = Book {
            id,
            title: draft.title,
            author: draft.author,
            isbn: draft.isbn,
            copies: draft.copies,
        };
        self.books.insert(id, book.clone());
        Ok(book)
    }

    async fn delete_book(&self, id: i64) -> StoreResult<()> {
        let _gate = self.write_gate.lock().expect("lock poisoned");
        // Idempotent; loans referencing the book are left in place.
        self.books.remove(&id);
        Ok(())
    }

    async fn create_member(&self, draft: MemberDraft) -> StoreResult<Member> {
        let draft = draft.normalize()?;
        let _gate = self.write_gate.lock().expect("lock poisoned");

        if let Some(email) = draft.email.as_deref() {
            if self.email_taken(email, None) {
                return Err(StoreError::DuplicateKey { field: "email" });
            }
        }

        let id = self.next_member_id.fetch_add(1, Ordering::Relaxed);
        let member = Member {
            id,
            name: draft.name,
            email: draft.email,
        };
        self.members.insert(id, member.clone());
        tracing::debug!(member_id = id, "member added");
        Ok(member)
    }

    async fn get_member(&self, id: i64) -> StoreResult<Member> {
        self.members
            .get(&id)
            .map(|m| m.clone())
            .ok_or_else(|| StoreError::not_found(Entity::Member, id))
    }

    async fn update_member(&self, id: i64, draft: MemberDraft) -> StoreResult<Member> {
        let draft = draft.normalize()?;
        let _gate = self.write_gate.lock().expect("lock poisoned");

        if !self.members.contains_key(&id) {
            return Err(StoreError::not_found(Entity::Member, id));
        }
        if let Some(email) = draft.email.as_deref() {
            if self.email_taken(email, Some(id)) {
                return Err(StoreError::DuplicateKey { field: "email" });
            }
        }

        let member = Member {
            id,
            name: draft.name,
            email: draft.email,
        };
        self.members.insert(id, member.clone());
        Ok(member)
    }

    async fn delete_member(&self, id: i64) -> StoreResult<()> {
        let _gate = self.write_gate.lock().expect("lock poisoned");
        self.members.remove(&id);
        Ok(())
    }

    async fn active_loan_count(&self, book_id: i64) -> StoreResult<i64> {
        Ok(self.open_loans(book_id))
    }

    async fn borrow(&self, book_id: i64, member_id: i64) -> StoreResult<Loan> {
        let _gate = self.write_gate.lock().expect("lock poisoned");

        let copies = self
            .books
            .get(&book_id)
            .map(|b| b.copies)
            .ok_or_else(|| StoreError::not_found(Entity::Book, book_id))?;
        if !self.members.contains_key(&member_id) {
            return Err(StoreError::not_found(Entity::Member, member_id));
        }
        if self.open_loans(book_id) >= copies {
            return Err(StoreError::NoCopiesAvailable { book_id });
        }

        let id = self.next_loan_id.fetch_add(1, Ordering::Relaxed);
        let loan = Loan {
            id,
            book_id,
            member_id,
            borrowed_on: Utc::now(),
            returned_on: None,
        };
        self.loans.insert(id, loan.clone());
        tracing::info!(loan_id = id, book_id, member_id, "loan opened");
        Ok(loan)
    }

    async fn return_loan(&self, loan_id: i64) -> StoreResult<ReturnOutcome> {
        let _gate = self.write_gate.lock().expect("lock poisoned");

        let mut loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| StoreError::not_found(Entity::Loan, loan_id))?;
        if loan.returned_on.is_some() {
            return Ok(ReturnOutcome::AlreadyReturned(loan.clone()));
        }

        loan.returned_on = Some(Utc::now());
        tracing::info!(loan_id, book_id = loan.book_id, "loan closed");
        Ok(ReturnOutcome::Closed(loan.clone()))
    }

    async fn list_books(&self) -> StoreResult<Vec<Book>> {
        let mut books: Vec<Book> = self.books.iter().map(|b| b.clone()).collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn list_members(&self) -> StoreResult<Vec<Member>> {
        let mut members: Vec<Member> = self.members.iter().map(|m| m.clone()).collect();
        members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(members)
    }

    async fn list_loans(&self) -> StoreResult<Vec<LoanView>> {
        let mut views: Vec<LoanView> = self
            .loans
            .iter()
            .filter_map(|loan| {
                let book = self.books.get(&loan.book_id)?;
                let member = self.members.get(&loan.member_id)?;
                Some(LoanView {
                    id: loan.id,
                    book_title: book.title.clone(),
                    member_name: member.name.clone(),
                    borrowed_on: loan.borrowed_on,
                    returned_on: loan.returned_on,
                })
            })
            .collect();
        views.sort_by(|a, b| {
            b.borrowed_on
                .cmp(&a.borrowed_on)
                .then(b.id.cmp(&a.id))
        });
        Ok(views)
    }

    async fn search(&self, query: &str) -> StoreResult<SearchResults> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(SearchResults::default());
        }

        let contains = |field: Option<&str>| {
            field.is_some_and(|v| v.to_lowercase().contains(&needle))
        };

        let mut books: Vec<Book> = self
            .books
            .iter()
            .filter(|b| {
                b.title.to_lowercase().contains(&needle)
                    || contains(b.author.as_deref())
                    || contains(b.isbn.as_deref())
            })
            .map(|b| b.clone())
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));

        let mut members: Vec<Member> = self
            .members
            .iter()
            .filter(|m| {
                m.name.to_lowercase().contains(&needle) || contains(m.email.as_deref())
            })
            .map(|m| m.clone())
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(SearchResults { books, members })
    }
}
