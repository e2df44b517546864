use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends one HTTP request. The seam where tests or proxies swap in a
/// different transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
