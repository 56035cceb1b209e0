use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub async fn init_db(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    info!("🔌 Opening SQLite queue store at {}...", db_url);

    let pool = connect_with_retry(db_url).await?;

    let schema = include_str!("../schema.sql");
    apply_schema(&pool, schema).await?;

    info!("✅ Database connected and schema applied.");
    Ok(pool)
}

async fn connect_with_retry(db_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let max_retries = 5;
    let delay = Duration::from_secs(1);

    let options = SqliteConnectOptions::from_str(db_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    // In-memory databases live and die with their single connection.
    let pool_options = if db_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(8)
    };

    let mut last_err = None;
    for i in 1..=max_retries {
        match pool_options
            .clone()
            .connect_with(options.clone())
            .await
        {
            Ok(p) => return Ok(p),
            Err(e) => {
                warn!(
                    "⚠️  DB Connection attempt {}/{} failed: {}. Retrying...",
                    i, max_retries, e
                );
                last_err = Some(e);
                sleep(delay).await;
            }
        }
    }
    Err(last_err.unwrap_or(sqlx::Error::PoolTimedOut))
}

async fn apply_schema(pool: &SqlitePool, schema: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for (i, sql) in split_sql(schema).iter().enumerate() {
        if let Err(e) = sqlx::query(sql).execute(&mut *tx).await {
            tracing::error!("🚨 Schema Error in statement #{}:\n{}", i + 1, sql);
            return Err(e);
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Splits a schema into statements on `;` line endings, ignoring `--`
/// comments.
fn split_sql(raw: &str) -> Vec<String> {
    let mut cmds = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let code = match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        };
        let code = code.trim_end();
        if code.trim().is_empty() {
            continue;
        }

        current.push_str(code);
        current.push('\n');

        if code.ends_with(';') {
            cmds.push(current.trim().to_string());
            current.clear();
        }
    }

    if !current.trim().is_empty() {
        cmds.push(current.trim().to_string());
    }
    cmds
}
