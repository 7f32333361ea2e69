//! Blocking HTTP agent with rate limiting, retries and caching
//!
//! All upstream traffic goes through one agent so the rate limit and
//! retry policy apply globally. Successive network requests are spaced
//! at least `1 / rate_limit` seconds apart; transport failures and 5xx
//! responses are retried with exponential backoff. Successful bodies
//! are stored in the response cache when one is attached, and cache
//! hits bypass both the network and the throttle.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::cache::{CacheError, HttpCache};
use crate::core::config::Config;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur during HTTP operations
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request to {url} failed with status {status}")]
    Status { status: u16, url: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid JSON from {url}: {message}")]
    Json { url: String, message: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Synchronous HTTP agent shared by all source clients
pub struct HttpAgent {
    client: reqwest::blocking::Client,
    min_interval: Duration,
    retries: u32,
    backoff: f64,
    cache: Option<HttpCache>,
    cache_ttl: Duration,
    last_request: RefCell<Option<Instant>>,
}

impl HttpAgent {
    /// Build an agent from settings, optionally with a response cache
    pub fn new(config: &Config, cache: Option<HttpCache>) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            min_interval: Duration::from_secs_f64(1.0 / config.rate_limit()),
            retries: config.retries(),
            backoff: config.backoff(),
            cache,
            cache_ttl: Duration::from_secs(config.cache_ttl_secs()),
            last_request: RefCell::new(None),
        })
    }

    /// GET a URL, returning the body. Non-2xx statuses are errors.
    pub fn get(&self, url: &str) -> Result<String, HttpError> {
        let (status, body) = self.get_with_status(url)?;
        if status >= 400 {
            return Err(HttpError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(body)
    }

    /// GET a URL and decode the body as JSON
    pub fn get_json(&self, url: &str) -> Result<serde_json::Value, HttpError> {
        let body = self.get(url)?;
        serde_json::from_str(&body).map_err(|e| HttpError::Json {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET a URL, returning (status, body).
    ///
    /// 4xx responses are returned to the caller rather than retried -
    /// some services put structured error detail in the body. 5xx and
    /// transport errors are retried with exponential backoff. Cache
    /// hits are reported with status 200.
    pub fn get_with_status(&self, url: &str) -> Result<(u16, String), HttpError> {
        if let Some(cache) = &self.cache {
            if let Some(body) = cache.lookup(url, self.cache_ttl)? {
                return Ok((200, body));
            }
        }

        let mut last_error: Option<HttpError> = None;
        for attempt in 0..self.retries {
            if attempt > 0 {
                std::thread::sleep(backoff_delay(self.backoff, attempt - 1));
            }
            self.throttle();

            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text()?;
                    if status >= 500 {
                        last_error = Some(HttpError::Status {
                            status,
                            url: url.to_string(),
                        });
                        continue;
                    }
                    if status < 400 {
                        if let Some(cache) = &self.cache {
                            cache.store(url, &body)?;
                        }
                    }
                    return Ok((status, body));
                }
                Err(e) => {
                    last_error = Some(HttpError::Transport(e));
                }
            }
        }

        Err(last_error.expect("at least one attempt is made"))
    }

    /// Sleep until at least `min_interval` has passed since the last
    /// network request
    fn throttle(&self) {
        let mut last = self.last_request.borrow_mut();
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                std::thread::sleep(self.min_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Backoff delay before retry `attempt` (0-based): backoff * 2^attempt
fn backoff_delay(backoff: f64, attempt: u32) -> Duration {
    Duration::from_secs_f64(backoff.max(0.0) * f64::from(1u32 << attempt.min(16)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config(retries: u32) -> Config {
        Config {
            rate_limit: Some(1000.0),
            retries: Some(retries),
            backoff: Some(0.0),
            ..Config::default()
        }
    }

    #[test]
    fn test_backoff_delay_doubles() {
        assert_eq!(backoff_delay(0.5, 0), Duration::from_secs_f64(0.5));
        assert_eq!(backoff_delay(0.5, 1), Duration::from_secs_f64(1.0));
        assert_eq!(backoff_delay(0.5, 3), Duration::from_secs_f64(4.0));
        assert_eq!(backoff_delay(-1.0, 0), Duration::ZERO);
    }

    #[test]
    fn test_throttle_spaces_requests() {
        let config = Config {
            rate_limit: Some(50.0), // 20ms interval
            ..Config::default()
        };
        let agent = HttpAgent::new(&config, None).unwrap();

        let start = Instant::now();
        agent.throttle();
        agent.throttle();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cache_hit_skips_network() {
        let tmp = tempdir().unwrap();
        let cache = HttpCache::open_at(&tmp.path().join("cache.db")).unwrap();

        // Port 9 is discard; nothing listens in the test environment
        let url = "http://127.0.0.1:9/api";
        cache.store(url, "cached body").unwrap();

        let agent = HttpAgent::new(&test_config(1), Some(cache)).unwrap();
        let (status, body) = agent.get_with_status(url).unwrap();
        assert_eq!(status, 200);
        assert_eq!(body, "cached body");
    }

    #[test]
    fn test_unreachable_host_is_transport_error() {
        let agent = HttpAgent::new(&test_config(2), None).unwrap();
        let err = agent.get("http://127.0.0.1:9/api").unwrap_err();
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
