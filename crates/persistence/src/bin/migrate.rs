#![deny(warnings)]

use persistence::{default_sqlite_url, init_db, SqliteRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    let pool = init_db(&url).await?;
    // Sanity: the schema must answer an empty lookup without error.
    let repo = SqliteRepository::new(pool);
    let missing = repo.load_user("__migrate_probe__").await?;
    assert!(missing.is_none());
    println!("DB migrated at {}", url);
    Ok(())
}
