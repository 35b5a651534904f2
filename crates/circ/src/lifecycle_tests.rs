//! Loan lifecycle and availability-invariant tests.
//!
//! These run against [`InMemoryLendingStore`]; the SQLite backend runs its
//! own copy of the same scenarios against a real database.

use std::sync::Arc;

use crate::{
    BookDraft, Entity, InMemoryLendingStore, LendingStore, MemberDraft, ReturnOutcome, StoreError,
};

async fn store_with_book(copies: i64) -> (InMemoryLendingStore, i64, i64) {
    let store = InMemoryLendingStore::new();
    let book = store
        .create_book(BookDraft::new("Dune").author("Frank Herbert").copies(copies))
        .await
        .unwrap();
    let member = store
        .create_member(MemberDraft::new("Ada").email("ada@example.org"))
        .await
        .unwrap();
    (store, book.id, member.id)
}

// ============================================================================
// Loan lifecycle
// ============================================================================

#[tokio::test]
async fn borrow_then_return_closes_the_loan() {
    let (store, book_id, member_id) = store_with_book(1).await;

    let loan = store.borrow(book_id, member_id).await.unwrap();
    assert!(loan.is_open());
    assert_eq!(store.active_loan_count(book_id).await.unwrap(), 1);

    let outcome = store.return_loan(loan.id).await.unwrap();
    assert!(outcome.closed_now());
    assert!(outcome.loan().returned_on.is_some());
    assert_eq!(store.active_loan_count(book_id).await.unwrap(), 0);
}

#[tokio::test]
async fn repeat_return_is_benign_and_keeps_the_original_timestamp() {
    let (store, book_id, member_id) = store_with_book(1).await;
    let loan = store.borrow(book_id, member_id).await.unwrap();

    let first = store.return_loan(loan.id).await.unwrap();
    let closed_at = first.loan().returned_on;

    let second = store.return_loan(loan.id).await.unwrap();
    match second {
        ReturnOutcome::AlreadyReturned(loan) => assert_eq!(loan.returned_on, closed_at),
        ReturnOutcome::Closed(_) => panic!("loan closed twice"),
    }
}

#[tokio::test]
async fn return_of_unknown_loan_is_not_found() {
    let (store, _, _) = store_with_book(1).await;
    let err = store.return_loan(999).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            entity: Entity::Loan,
            id: 999
        }
    ));
}

#[tokio::test]
async fn borrow_validates_both_sides_of_the_loan() {
    let (store, book_id, member_id) = store_with_book(1).await;

    let err = store.borrow(999, member_id).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            entity: Entity::Book,
            ..
        }
    ));

    let err = store.borrow(book_id, 999).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            entity: Entity::Member,
            ..
        }
    ));
}

// ============================================================================
// Availability invariant
// ============================================================================

#[tokio::test]
async fn single_copy_cannot_be_borrowed_twice() {
    let (store, book_id, member_id) = store_with_book(1).await;

    store.borrow(book_id, member_id).await.unwrap();
    let err = store.borrow(book_id, member_id).await.unwrap_err();
    assert!(matches!(err, StoreError::NoCopiesAvailable { .. }));
    assert_eq!(store.active_loan_count(book_id).await.unwrap(), 1);
}

#[tokio::test]
async fn returning_a_copy_frees_it_for_the_next_borrower() {
    let store = InMemoryLendingStore::new();
    let dune = store
        .create_book(BookDraft::new("Dune").copies(2))
        .await
        .unwrap();
    let a = store.create_member(MemberDraft::new("A")).await.unwrap();
    let b = store.create_member(MemberDraft::new("B")).await.unwrap();
    let c = store.create_member(MemberDraft::new("C")).await.unwrap();

    let loan1 = store.borrow(dune.id, a.id).await.unwrap();
    let _loan2 = store.borrow(dune.id, b.id).await.unwrap();

    let err = store.borrow(dune.id, c.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NoCopiesAvailable { .. }));

    assert!(store.return_loan(loan1.id).await.unwrap().closed_now());

    let loan3 = store.borrow(dune.id, c.id).await.unwrap();
    assert!(loan3.is_open());
    assert_eq!(store.active_loan_count(dune.id).await.unwrap(), 2);
}

#[tokio::test]
async fn concurrent_borrows_never_oversubscribe_copies() {
    let store = Arc::new(InMemoryLendingStore::new());
    let book = store
        .create_book(BookDraft::new("Dune").copies(2))
        .await
        .unwrap();

    let mut member_ids = Vec::new();
    for i in 0..8 {
        let member = store
            .create_member(MemberDraft::new(format!("Member {i}")))
            .await
            .unwrap();
        member_ids.push(member.id);
    }

    let tasks: Vec<_> = member_ids
        .into_iter()
        .map(|member_id| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.borrow(book.id, member_id).await })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    let granted = results
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(Result::is_ok)
        .count();

    assert_eq!(granted, 2);
    assert_eq!(store.active_loan_count(book.id).await.unwrap(), 2);
}

#[tokio::test]
async fn shrinking_copies_under_open_loans_blocks_new_borrows() {
    let store = InMemoryLendingStore::new();
    let book = store
        .create_book(BookDraft::new("Dune").copies(2))
        .await
        .unwrap();
    let a = store.create_member(MemberDraft::new("A")).await.unwrap();
    let b = store.create_member(MemberDraft::new("B")).await.unwrap();

    let loan = store.borrow(book.id, a.id).await.unwrap();
    store.borrow(book.id, b.id).await.unwrap();

    // Edits may shrink the shelf below what is currently out; existing
    // loans survive and availability stays false until enough returns.
    store
        .update_book(book.id, BookDraft::new("Dune").copies(1))
        .await
        .unwrap();
    assert!(!store.is_available(book.id).await.unwrap());

    store.return_loan(loan.id).await.unwrap();
    assert!(!store.is_available(book.id).await.unwrap());
    let err = store.borrow(book.id, a.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NoCopiesAvailable { .. }));
}

#[tokio::test]
async fn availability_requires_the_book_to_exist() {
    let store = InMemoryLendingStore::new();
    assert_eq!(store.active_loan_count(42).await.unwrap(), 0);
    let err = store.is_available(42).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::NotFound {
            entity: Entity::Book,
            ..
        }
    ));
}

// ============================================================================
// Uniqueness
// ============================================================================

#[tokio::test]
async fn duplicate_isbn_is_rejected_but_absent_isbn_never_collides() {
    let store = InMemoryLendingStore::new();
    store
        .create_book(BookDraft::new("Dune").isbn("978-0441172719"))
        .await
        .unwrap();

    let err = store
        .create_book(BookDraft::new("Dune, again").isbn("978-0441172719"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { field: "isbn" }));

    // Two books without an ISBN are fine.
    store.create_book(BookDraft::new("Pamphlet")).await.unwrap();
    store.create_book(BookDraft::new("Zine")).await.unwrap();
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let store = InMemoryLendingStore::new();
    store
        .create_member(MemberDraft::new("Ada").email("ada@example.org"))
        .await
        .unwrap();

    let err = store
        .create_member(MemberDraft::new("Imposter").email("ada@example.org"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { field: "email" }));
}

#[tokio::test]
async fn update_may_keep_its_own_unique_value() {
    let store = InMemoryLendingStore::new();
    let book = store
        .create_book(BookDraft::new("Dune").isbn("978-0441172719"))
        .await
        .unwrap();
    let other = store
        .create_book(BookDraft::new("Hyperion").isbn("978-0553283686"))
        .await
        .unwrap();

    // Re-saving with the same ISBN is not a collision with itself.
    store
        .update_book(book.id, BookDraft::new("Dune (1965)").isbn("978-0441172719"))
        .await
        .unwrap();

    // Taking another book's ISBN is.
    let err = store
        .update_book(other.id, BookDraft::new("Hyperion").isbn("978-0441172719"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { field: "isbn" }));
}

// ============================================================================
// Deletes
// ============================================================================

#[tokio::test]
async fn deletes_are_idempotent() {
    let store = InMemoryLendingStore::new();
    let book = store.create_book(BookDraft::new("Dune")).await.unwrap();

    store.delete_book(book.id).await.unwrap();
    store.delete_book(book.id).await.unwrap();
    store.delete_member(12345).await.unwrap();

    let err = store.get_book(book.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn dangling_loans_stay_in_the_ledger_but_leave_the_listing() {
    let (store, book_id, member_id) = store_with_book(1).await;
    store.borrow(book_id, member_id).await.unwrap();

    store.delete_book(book_id).await.unwrap();

    // The joined view hides the orphan; the ledger still counts it.
    assert!(store.list_loans().await.unwrap().is_empty());
    assert_eq!(store.active_loan_count(book_id).await.unwrap(), 1);
}

// ============================================================================
// Directory
// ============================================================================

#[tokio::test]
async fn listings_are_ordered() {
    let store = InMemoryLendingStore::new();
    store.create_book(BookDraft::new("Neuromancer")).await.unwrap();
    store.create_book(BookDraft::new("Dune")).await.unwrap();
    let hyperion = store.create_book(BookDraft::new("Hyperion")).await.unwrap();
    let ada = store.create_member(MemberDraft::new("Ada")).await.unwrap();

    let titles: Vec<String> = store
        .list_books()
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, ["Dune", "Hyperion", "Neuromancer"]);

    let first = store.borrow(hyperion.id, ada.id).await.unwrap();
    let second = store.borrow(hyperion.id, ada.id).await;
    assert!(second.is_err()); // single copy

    let views = store.list_loans().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].id, first.id);
    assert_eq!(views[0].book_title, "Hyperion");
    assert_eq!(views[0].member_name, "Ada");
}

#[tokio::test]
async fn loan_listing_is_newest_first() {
    let store = InMemoryLendingStore::new();
    let book = store
        .create_book(BookDraft::new("Dune").copies(3))
        .await
        .unwrap();
    let ada = store.create_member(MemberDraft::new("Ada")).await.unwrap();

    let l1 = store.borrow(book.id, ada.id).await.unwrap();
    let l2 = store.borrow(book.id, ada.id).await.unwrap();
    let l3 = store.borrow(book.id, ada.id).await.unwrap();

    let ids: Vec<i64> = store.list_loans().await.unwrap().iter().map(|v| v.id).collect();
    assert_eq!(ids, [l3.id, l2.id, l1.id]);
}

#[tokio::test]
async fn search_is_case_insensitive_and_covers_every_text_field() {
    let store = InMemoryLendingStore::new();
    store
        .create_book(
            BookDraft::new("The Lord of the Rings")
                .author("J. R. R. Tolkien")
                .isbn("978-0618640157"),
        )
        .await
        .unwrap();
    store.create_book(BookDraft::new("Dune")).await.unwrap();
    store
        .create_member(MemberDraft::new("Tolkien Society").email("post@tolkiensociety.org"))
        .await
        .unwrap();
    store.create_member(MemberDraft::new("Ada")).await.unwrap();

    let results = store.search("tolkien").await.unwrap();
    assert_eq!(results.books.len(), 1);
    assert_eq!(results.members.len(), 1);

    // ISBN and email fragments match too.
    assert_eq!(store.search("0618640157").await.unwrap().books.len(), 1);
    assert_eq!(
        store.search("tolkiensociety").await.unwrap().members.len(),
        1
    );
}

#[tokio::test]
async fn empty_search_returns_nothing() {
    let store = InMemoryLendingStore::new();
    store.create_book(BookDraft::new("Dune")).await.unwrap();
    store.create_member(MemberDraft::new("Ada")).await.unwrap();

    for query in ["", "   ", "\t"] {
        let results = store.search(query).await.unwrap();
        assert!(results.books.is_empty());
        assert!(results.members.is_empty());
    }
}

// ============================================================================
// Catalog import
// ============================================================================

#[tokio::test]
async fn imported_candidates_arrive_with_a_single_copy() {
    let store = InMemoryLendingStore::new();

    let book = store
        .import_candidate("Dune", Some("Frank Herbert"), Some("978-0441172719"))
        .await
        .unwrap();
    assert_eq!(book.copies, 1);
    assert_eq!(book.author.as_deref(), Some("Frank Herbert"));

    let err = store
        .import_candidate("Dune (dup)", None, Some("978-0441172719"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateKey { field: "isbn" }));
}
