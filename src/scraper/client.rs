//! Blocking HTTP client with configurable politeness (delay between requests) and bounded retries.

use crate::scraper::{Fetch, Fetched, Page, ScraperError};
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; ao3dl/0.1)";
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_DELAY_SECS: u64 = 2;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts per request (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 5;
/// Default backoff delays in seconds after each failed attempt (1s, 2s, 4s, 8s).
const DEFAULT_BACKOFF_SECS: [u64; 4] = [1, 2, 4, 8];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 4] = [30, 60, 90, 120];

/// Marker in the final response URL when the archive gates a page behind login.
const RESTRICTED_MARKER: &str = "restricted=true";

/// Blocking HTTP client that enforces a delay between requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Option<Instant>,
    retry_count: u32,
    backoff_secs: Vec<u64>,
}

impl PoliteClient {
    /// Build a polite client with default User-Agent, timeout, and delay.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    /// Builder for custom User-Agent, delay, timeout, and retries.
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// GET with retries for transient failures.
    ///
    /// Retries on timeout, connection errors, and any non-200 status. Other transport
    /// errors are returned immediately. A final URL carrying the restricted marker is
    /// reported as [Fetched::Restricted] without retrying.
    pub fn get_with_retry(&mut self, url: &str) -> Result<Fetched, ScraperError> {
        let max_attempts = self.retry_count;
        let mut last_reason = String::from("no attempt made");
        for attempt in 0..max_attempts {
            self.wait_delay();
            tracing::debug!(url, attempt = attempt + 1, max_attempts, "GET");
            let result = self.inner.get(url).send();
            self.last_request = Some(Instant::now());
            match result {
                Ok(response) => {
                    let final_url = response.url().to_string();
                    if final_url.contains(RESTRICTED_MARKER) {
                        return Ok(Fetched::Restricted { url: final_url });
                    }
                    let status = response.status();
                    if status.as_u16() == 200 {
                        let body = response.text().map_err(|e| ScraperError::BodyRead {
                            url: url.to_string(),
                            source: e,
                        })?;
                        return Ok(Fetched::Page(Page {
                            url: final_url,
                            body,
                        }));
                    }
                    last_reason = format!("HTTP {}", status.as_u16());
                    tracing::debug!(url, status = status.as_u16(), "non-200 response");
                    if attempt + 1 < max_attempts {
                        let schedule: &[u64] = if status.as_u16() == 429 {
                            &BACKOFF_429_SECS
                        } else {
                            &self.backoff_secs
                        };
                        std::thread::sleep(backoff_for(schedule, attempt));
                    }
                }
                Err(e) => {
                    if !(e.is_timeout() || e.is_connect()) {
                        return Err(ScraperError::Network {
                            url: url.to_string(),
                            source: e,
                        });
                    }
                    tracing::debug!(url, error = %e, "transient request failure");
                    last_reason = e.to_string();
                    if attempt + 1 < max_attempts {
                        std::thread::sleep(backoff_for(&self.backoff_secs, attempt));
                    }
                }
            }
        }
        Err(ScraperError::RetryExhausted {
            url: url.to_string(),
            attempts: max_attempts,
            reason: last_reason,
        })
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

/// Delay before the next attempt; reuses the last entry when the schedule is short.
fn backoff_for(schedule: &[u64], attempt: u32) -> Duration {
    let secs = schedule
        .get(attempt as usize)
        .or_else(|| schedule.last())
        .copied()
        .unwrap_or(0);
    Duration::from_secs(secs)
}

impl Fetch for PoliteClient {
    fn fetch(&mut self, url: &str) -> Result<Fetched, ScraperError> {
        self.get_with_retry(url)
    }
}

/// Builder for PoliteClient with optional User-Agent, delay, timeout, and retry settings.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_secs: u64,
    timeout_secs: u64,
    retry_count: u32,
    retry_backoff_secs: Vec<u64>,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_secs: DEFAULT_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_backoff_secs: DEFAULT_BACKOFF_SECS.to_vec(),
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Set delay between requests in seconds. Default 2.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    /// Set request timeout in seconds. Default 10.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set number of attempts per request (default 5, minimum 1).
    pub fn retry_count(mut self, n: u32) -> Self {
        self.retry_count = n.max(1);
        self
    }

    /// Set backoff delays in seconds before each retry. If shorter than retry_count - 1, the last value is reused.
    pub fn retry_backoff_secs(mut self, secs: Vec<u64>) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    /// Build the blocking client and polite wrapper.
    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PoliteClient {
            inner,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
            retry_count: self.retry_count,
            backoff_secs: self.retry_backoff_secs,
        })
    }
}
