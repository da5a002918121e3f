use anyhow::{Context, Result};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DatabaseTransaction, Statement,
    TransactionTrait,
};
use std::{path::PathBuf, time::Duration};
use tokio::fs;

/// Key for the advisory lock held while migrations run.
const MIGRATION_LOCK_KEY: i64 = 0x5354_4f52_4546;

/// Create a SeaORM connection.
pub async fn create_orm_conn(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(20)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);
    let conn = Database::connect(options).await?;
    Ok(conn)
}

/// Apply the SQL files in `migrations/` in filename order.
///
/// Applied files are recorded in `schema_migrations` and skipped on the next
/// run. Each file is applied inside one transaction, and concurrent runners
/// wait on a Postgres advisory lock.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let files = migration_files().await?;

    let txn = conn.begin().await?;
    exec(&txn, format!("SELECT pg_advisory_xact_lock({MIGRATION_LOCK_KEY})")).await?;
    exec(
        &txn,
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"
        .to_string(),
    )
    .await?;

    let backend = txn.get_database_backend();
    for file in files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .context("migration file name is not valid UTF-8")?
            .to_string();

        let applied = txn
            .query_one(Statement::from_sql_and_values(
                backend,
                "SELECT name FROM schema_migrations WHERE name = $1",
                [name.clone().into()],
            ))
            .await?
            .is_some();
        if applied {
            continue;
        }

        tracing::info!(migration = %name, "applying migration");
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands.
        for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            exec(&txn, stmt.to_string())
                .await
                .with_context(|| format!("migration {name} failed"))?;
        }

        txn.execute(Statement::from_sql_and_values(
            backend,
            "INSERT INTO schema_migrations (name) VALUES ($1)",
            [name.into()],
        ))
        .await?;
    }

    txn.commit().await?;
    Ok(())
}

async fn migration_files() -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir("migrations")
        .await
        .context("migrations directory not found")?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn exec(txn: &DatabaseTransaction, sql: String) -> Result<()> {
    let backend = txn.get_database_backend();
    txn.execute(Statement::from_string(backend, sql)).await?;
    Ok(())
}
