//! HTTP driver implementation
//!
//! This module loads pages with plain HTTP requests:
//! - Building HTTP clients with the configured user agent and timeouts
//! - GET requests for raw content
//! - Pages that keep the last fetched document as their content
//! - Error classification (timeouts vs. status codes vs. transport errors)

use crate::config::NetworkConfig;
use crate::driver::{Browser, DriverError, DriverResult, FetchOptions, OnFailure, Page, WaitUntil};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

/// Builds an HTTP client from the network configuration
///
/// # Arguments
///
/// * `config` - The network configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &NetworkConfig) -> Result<Client, reqwest::Error> {
    let user_agent = config.user_agent.clone().unwrap_or_else(|| {
        format!(
            "{}/{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )
    });

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one GET and applies the failure policy
async fn get(
    client: &Client,
    url: &str,
    timeout: Duration,
    on_failure: OnFailure,
) -> DriverResult<Vec<u8>> {
    let started = Instant::now();
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            DriverError::Timeout {
                url: url.to_string(),
                elapsed: started.elapsed(),
            }
        } else {
            DriverError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    };

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(classify)?;

    let status = response.status();
    if !status.is_success() && on_failure == OnFailure::Raise {
        return Err(DriverError::Http {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.bytes().await.map_err(classify)?;
    tracing::debug!("GET {} -> {} ({} bytes)", url, status.as_u16(), body.len());
    Ok(body.to_vec())
}

/// Browser backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpBrowser {
    client: Client,
    navigation_timeout: Duration,
}

impl HttpBrowser {
    pub fn new(config: &NetworkConfig) -> DriverResult<Self> {
        let client = build_http_client(config).map_err(|e| DriverError::Client(e.to_string()))?;
        Ok(Self {
            client,
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
        })
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> DriverResult<Vec<u8>> {
        get(&self.client, url, options.timeout, options.on_failure).await
    }

    async fn new_page(&self) -> DriverResult<Box<dyn Page>> {
        Ok(Box::new(HttpPage {
            client: self.client.clone(),
            timeout: self.navigation_timeout,
            url: None,
            body: None,
            closed: false,
        }))
    }
}

/// A page whose content is the last document fetched into it
#[derive(Debug)]
pub struct HttpPage {
    client: Client,
    timeout: Duration,
    url: Option<String>,
    body: Option<String>,
    closed: bool,
}

impl HttpPage {
    async fn load(&mut self, url: &str) -> DriverResult<()> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let body = get(&self.client, url, self.timeout, OnFailure::Raise).await?;
        self.url = Some(url.to_string());
        self.body = Some(String::from_utf8_lossy(&body).into_owned());
        Ok(())
    }
}

#[async_trait]
impl Page for HttpPage {
    // Every load state is reached once the body has been read
    async fn goto(&mut self, url: &str, _wait_until: WaitUntil) -> DriverResult<()> {
        self.load(url).await
    }

    async fn content(&self) -> DriverResult<String> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.body.clone().ok_or(DriverError::NoDocument)
    }

    /// Re-requests the current document so lazily filled parts can appear
    async fn focus(&mut self, _selector: &str) -> DriverResult<()> {
        let url = self.url.clone().ok_or(DriverError::NoDocument)?;
        self.load(&url).await
    }

    fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        self.body = None;
        Ok(())
    }
}
