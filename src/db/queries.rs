use std::collections::HashSet;

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::book::NewBook;

/// Outcome of attempting to persist one validated row.
pub enum InsertOutcome {
    Inserted(Uuid),
    /// Another job inserted the same title first; the unique index on
    /// `LOWER(title)` closes the race the per-job snapshot leaves open.
    DuplicateTitle,
}

/// Insert a validated book into the catalog.
pub async fn insert_book(pool: &PgPool, book: &NewBook) -> Result<InsertOutcome, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO books (title, author, price, publication_date)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(&book.title)
    .bind(&book.author)
    .bind(book.price)
    .bind(book.publication_date)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => Ok(InsertOutcome::Inserted(row.try_get("id")?)),
        Err(sqlx::Error::Database(dbe)) if dbe.is_unique_violation() => {
            Ok(InsertOutcome::DuplicateTitle)
        }
        Err(e) => Err(e),
    }
}

/// Snapshot of all catalog titles, lowercased, used to seed a job's
/// duplicate-detection set. Taken once at job start; concurrent inserts from
/// other jobs are not reflected.
pub async fn catalog_titles(pool: &PgPool) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query("SELECT LOWER(title) AS title FROM books")
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(|r| r.try_get("title")).collect()
}
