//! Connection pool setup and the read-retry helper used by every service.

use std::future::Future;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::utils::error::is_transient;
use crate::utils::{ApiError, ApiResult};

/// Opens (creating if needed) the SQLite database at `url` and runs all
/// pending migrations.
pub async fn create_pool(url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(url.trim_start_matches("sqlite://"))
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Retries `op` up to twice more on a transient connection error, with
/// exponential backoff starting at 50ms. Reads only — callers that write
/// must not wrap mutating statements in this helper.
pub async fn with_read_retry<T, F, Fut>(mut op: F) -> ApiResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < 2 && is_transient(&err) => {
                attempt += 1;
                let backoff = Duration::from_millis(50 * 2u64.pow(attempt - 1));
                tracing::warn!(attempt, ?backoff, error = %err, "retrying transient read error");
                tokio::time::sleep(backoff).await;
            },
            Err(err) => return Err(ApiError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn read_retry_gives_up_after_two_retries() {
        let calls = AtomicUsize::new(0);
        let result: ApiResult<()> = with_read_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::PoolClosed) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn read_retry_succeeds_without_retrying_on_non_transient_error() {
        let calls = AtomicUsize::new(0);
        let result: ApiResult<()> = with_read_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(sqlx::Error::RowNotFound) }
        })
        .await;

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
