//! HTTP client with rate limiting for the search backend.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting so that fast scrolling cannot flood the backend
//! * Consistent timeouts and headers
//!
//! # Rate Limiting
//!
//! * 10 calls per 1-second interval
//! * Allows bursts up to the maximum calls per interval
//! * Requests that would exceed the limit are delayed
//!
//! # Example
//!
//! ```rust
//! use tunescroll::http::Client;
//!
//! let client = Client::new(&config)?;
//! let request = client.get(url);
//! let response = client.execute(request).await?;
//! ```

use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    self,
    header::{HeaderValue, ACCEPT},
    Method, Url,
};

use crate::{config::Config, error::Result};

/// HTTP client with built-in rate limiting.
///
/// Cheap to clone: clones share the connection pool and the rate limiter.
#[derive(Clone)]
pub struct Client {
    /// Unlimited request client for special cases.
    ///
    /// Direct access to underlying client without rate limiting.
    pub unlimited: reqwest::Client,

    /// Rate limiter shared between clones.
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl Client {
    /// Rolling window for the rate limit.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(1);

    /// Maximum allowed calls per interval.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 10;

    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Duration to wait for individual network reads.
    ///
    /// A stalled page surfaces as a transport failure instead of leaving
    /// the fetcher loading forever.
    const READ_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    ///
    /// # Panics
    ///
    /// Panics if rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(Self::READ_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent);

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: Arc::new(governor::RateLimiter::direct(quota)),
        })
    }

    /// Builds a request with specified method and URL.
    pub fn request<U>(&self, method: Method, url: U) -> reqwest::Request
    where
        U: Into<Url>,
    {
        reqwest::Request::new(method, url.into())
    }

    /// Builds a GET request.
    pub fn get<U>(&self, url: U) -> reqwest::Request
    where
        U: Into<Url>,
    {
        self.request(Method::GET, url)
    }

    /// Executes a request with rate limiting.
    ///
    /// The returned future owns everything it needs, so it can outlive the
    /// client and be polled from an event loop.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the network errors.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + Send + 'static {
        let rate_limiter = Arc::clone(&self.rate_limiter);
        let client = self.unlimited.clone();

        async move { rate_limiter.until_ready().await }
            .then(move |()| client.execute(request).map_err(Into::into))
    }
}
