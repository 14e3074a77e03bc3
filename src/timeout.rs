use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Await a future under an optional deadline
///
/// `net/timeout` is enforced per pending stage: when the limit elapses the
/// pending operation is dropped and the caller observes [`Error::Timeout`]
/// exactly once. Without a limit the future is awaited as-is.
pub async fn with_timeout<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(Error::from),
        None => Ok(future.await),
    }
}

/// Like [`with_timeout`], flattening the result of a fallible stage
pub async fn try_with_timeout<T, F>(limit: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_timeout(limit, future).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_fires() {
        let result = with_timeout(
            Some(Duration::from_millis(10)),
            tokio::time::sleep(Duration::from_secs(5)),
        )
        .await;
        assert_eq!(result.unwrap_err(), Error::Timeout);
    }

    #[tokio::test]
    async fn test_no_deadline_passes_through() {
        let result = with_timeout(None, async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_flattened_stage_error() {
        let result: Result<()> =
            try_with_timeout(None, async { Err(Error::network("connection_refused")) }).await;
        assert_eq!(result.unwrap_err(), Error::network("connection_refused"));
    }
}
