//! # Circulation Desk Demo
//!
//! Walks one afternoon at the desk: stock the shelves, register members,
//! lend out every copy of a popular title, turn a borrower away, and free a
//! copy up again. Runs against an in-memory SQLite store.

use anyhow::{Context, Result};
use circ_core::{BookDraft, LendingStore, MemberDraft, StoreError};
use circ_store_sqlite::SqliteLendingStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let store = SqliteLendingStore::open_in_memory().await?;

    // ========================================================================
    // Stock the shelves
    // ========================================================================

    store
        .create_book(
            BookDraft::new("Dune")
                .author("Frank Herbert")
                .isbn("978-0441172719")
                .copies(2),
        )
        .await?;
    store
        .create_book(BookDraft::new("Hyperion").author("Dan Simmons"))
        .await?;
    store
        .import_candidate("Neuromancer", Some("William Gibson"), Some("978-0441569595"))
        .await?;

    println!("On the shelves:");
    for book in store.list_books().await? {
        println!(
            "  [{}] {} by {} ({} copies)",
            book.id,
            book.title,
            book.author.as_deref().unwrap_or("unknown"),
            book.copies
        );
    }

    // ========================================================================
    // Register members
    // ========================================================================

    let ada = store
        .create_member(MemberDraft::new("Ada").email("ada@example.org"))
        .await?;
    let brin = store
        .create_member(MemberDraft::new("Brin").email("brin@example.org"))
        .await?;
    let cory = store.create_member(MemberDraft::new("Cory")).await?;

    // ========================================================================
    // Lend out every copy of Dune
    // ========================================================================

    let dune = store
        .search("dune")
        .await?
        .books
        .pop()
        .context("Dune went missing from the catalog")?;

    let loan1 = store.borrow(dune.id, ada.id).await?;
    let _loan2 = store.borrow(dune.id, brin.id).await?;
    println!(
        "\nDune is out {} times of {} copies",
        store.active_loan_count(dune.id).await?,
        dune.copies
    );

    match store.borrow(dune.id, cory.id).await {
        Err(StoreError::NoCopiesAvailable { .. }) => {
            println!("Cory is out of luck: no copies available")
        }
        other => anyhow::bail!("expected the shelf to be empty, got {other:?}"),
    }

    // ========================================================================
    // A return frees a copy
    // ========================================================================

    let outcome = store.return_loan(loan1.id).await?;
    println!("Ada returned her copy (closed now: {})", outcome.closed_now());

    // A second return of the same loan is benign.
    let outcome = store.return_loan(loan1.id).await?;
    println!("Desk double-scanned the barcode (closed now: {})", outcome.closed_now());

    let loan3 = store.borrow(dune.id, cory.id).await?;
    println!("Cory borrows the freed copy (loan {})", loan3.id);

    // ========================================================================
    // The ledger, newest first
    // ========================================================================

    println!("\nLoan ledger:");
    for view in store.list_loans().await? {
        let status = match view.returned_on {
            Some(on) => format!("returned {on}"),
            None => "out".to_string(),
        };
        println!(
            "  {} -> {} (borrowed {}, {})",
            view.book_title, view.member_name, view.borrowed_on, status
        );
    }

    Ok(())
}
