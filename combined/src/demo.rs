//! Book scenario: three units of work against one record, then its history.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use common::{AppResult, OptionExt};
use domain::{Book, TableEntity};
use table_store::{EntityRepository, TableClient, TableStoreConfig, UnitOfWork};

pub async fn run(
    client: Arc<dyn TableClient>,
    config: &TableStoreConfig,
    publisher: &str,
    rollback_delete: bool,
) -> AppResult<()> {
    let book_id = Uuid::new_v4();
    let row_key = book_id.to_string();

    // Insert
    let uow = UnitOfWork::from_config(client.clone(), config);
    let books = uow.repository::<Book>()?;
    books.ensure_table_exists().await?;
    let book = books
        .insert(
            Book::new(book_id, publisher)
                .with_author("Jo Bloke")
                .with_title(".NET Core Journey"),
        )
        .await?;
    println!("{}", book);
    uow.commit()?;

    // Update
    let (partition, row) = (publisher.to_string(), row_key.clone());
    let updated = UnitOfWork::from_config(client.clone(), config)
        .run(move |uow| {
            Box::pin(async move {
                let books = uow.repository::<Book>()?;
                let book = books.find(&partition, &row).await?.ok_or_not_found()?;
                books.update(book.with_author("Josephine Bloke")).await
            })
        })
        .await?;
    println!("{}", updated);

    // Delete
    let uow = UnitOfWork::from_config(client.clone(), config);
    let books = uow.repository::<Book>()?;
    let book = books.find(publisher, &row_key).await?.ok_or_not_found()?;
    books.delete(book).await?;
    if rollback_delete {
        let summary = uow.close().await?;
        info!(undone = summary.undone, "Delete rolled back");
        println!("Delete rolled back");
    } else {
        uow.commit()?;
        println!("Deleted");
    }

    print_history(client, publisher, &row_key).await
}

async fn print_history(client: Arc<dyn TableClient>, publisher: &str, row_key: &str) -> AppResult<()> {
    let uow = UnitOfWork::begin(client);
    let books = uow.repository::<Book>()?;

    match books.find(publisher, row_key).await? {
        Some(book) => println!("\nCurrent: {}", book),
        None => println!("\nCurrent: <none>"),
    }

    let history = books.history(publisher, row_key).await?;
    println!("Audit trail ({} records):", history.len());
    for record in history {
        println!(
            "  {}  author={:<16} deleted={:<5} by={}",
            record.key.row_key,
            record.author,
            record.is_deleted(),
            record.base.modified_by.as_deref().unwrap_or("-")
        );
    }

    uow.commit()
}
