use std::future::Future;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::debug;

use crate::config::HaproxyConfig;
use crate::report::RawReport;

/// Longest body excerpt included in a status error.
const ERROR_BODY_LIMIT: usize = 256;

/// Producer of stats reports.
pub trait ReportSource: Send + Sync {
    /// Fetch one complete report.
    fn fetch_report(&self) -> impl Future<Output = Result<RawReport>> + Send;
}

/// HAProxy stats page fetched over HTTP.
pub struct HttpSource {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
}

impl HttpSource {
    /// Create a new stats page client.
    pub fn new(cfg: &HaproxyConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            http,
            url: cfg.url.clone(),
            username: cfg.username.clone(),
            password: cfg.password.clone(),
        })
    }

    /// Stats page URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ReportSource for HttpSource {
    async fn fetch_report(&self) -> Result<RawReport> {
        let start = Instant::now();

        let mut request = self.http.get(&self.url);
        if !self.username.is_empty() || !self.password.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("requesting {}", self.url))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "unexpected status {} from {}: {}",
                status,
                self.url,
                excerpt(&body)
            );
        }

        let body = response
            .bytes()
            .await
            .with_context(|| format!("reading response body from {}", self.url))?;

        debug!(
            url = %self.url,
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fetched stats report",
        );

        Ok(RawReport::new(body.to_vec()))
    }
}

/// Trims a response body for inclusion in an error message.
fn excerpt(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }

    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
