// SPDX-FileCopyrightText: 2026 Concierge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::future::Future;
use std::time::Duration;

use concierge_core::ConciergeError;

/// Await `fut` for at most `limit`; expiry becomes [`ConciergeError::Timeout`].
pub(crate) async fn within<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, ConciergeError>
where
    F: Future<Output = Result<T, ConciergeError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConciergeError::Timeout {
            operation: operation.to_string(),
            duration: limit,
        }),
    }
}
