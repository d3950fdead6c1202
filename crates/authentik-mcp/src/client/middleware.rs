//! Middleware for the HTTP client.

use std::time::Instant;

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

/// Logs every outbound request at debug level.
///
/// Only method, host, path, status and latency are recorded. Query strings and
/// headers can carry tokens and are never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTracing;

#[async_trait::async_trait]
impl Middleware for RequestTracing {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let host = req.url().host_str().unwrap_or_default().to_string();
        let path = req.url().path().to_string();
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => tracing::debug!(
                %method,
                %host,
                %path,
                status = response.status().as_u16(),
                elapsed_ms,
                "Outbound request completed"
            ),
            Err(e) => tracing::debug!(
                %method,
                %host,
                %path,
                elapsed_ms,
                error = %e,
                "Outbound request failed"
            ),
        }

        result
    }
}
