//! Network access handed to extractors

use crate::cache::{CacheKey, ContentCache};
use crate::crawler::RateLimiter;
use crate::driver::{recognize, Browser, FetchOptions, Page, WaitUntil};
use crate::retry::{attempt, retry_on_timeout, timed, BackoffPolicy};
use crate::Result;
use std::time::Duration;
use tokio::sync::Mutex;

/// Everything a product extraction may touch
///
/// Every request goes through the shared rate limiter, is bounded by a
/// timeout and is retried with backoff while it keeps timing out.
pub struct ProductContext<'a> {
    pub browser: &'a dyn Browser,
    pub limiter: &'a RateLimiter,
    /// Document cache; `None` when raw HTML is not kept
    pub cache: Option<&'a ContentCache>,
    pub site: &'a str,
    pub date: &'a str,
    /// Category the product was found in
    pub category: &'a str,
    /// Listing page the product was found on; `None` in URL list mode
    pub page: Option<u32>,
    pub policy: BackoffPolicy,
    pub request_timeout: Duration,
    pub navigation_timeout: Duration,
    /// Attempts to get past lazily loaded content
    pub lazy_retries: u32,
}

impl<'a> ProductContext<'a> {
    /// Cache key of a product page in this context
    pub fn product_key(&self, product_id: &str) -> CacheKey {
        CacheKey::product(self.site, self.date, self.category, self.page, product_id)
    }

    /// Cache key of this context's listing page
    pub fn listing_key(&self) -> Option<CacheKey> {
        self.page
            .map(|page| CacheKey::category_page(self.site, self.date, self.category, page))
    }

    /// Fetches `url` through the rate limiter
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let options = FetchOptions {
            timeout: self.request_timeout,
            ..FetchOptions::default()
        };

        let options = &options;
        let limit = self.request_timeout + Duration::from_secs(1);

        retry_on_timeout(&self.policy, url, move || async move {
            self.limiter.acquire().await;
            // Outer guard in case the driver ignores its own timeout
            timed(url, limit, async move {
                attempt(self.browser.fetch(url, options), recognize)
                    .await
                    .unwrap_or_else(|fatal| Err(fatal.into()))
            })
            .await
        })
        .await
    }

    /// Returns the cached document under `key`, or fetches and caches it
    ///
    /// With `refresh` the cache is bypassed and the fetched content replaces
    /// the cached copy.
    pub async fn load(&self, url: &str, key: &CacheKey, refresh: bool) -> Result<Vec<u8>> {
        if !refresh {
            if let Some(cache) = self.cache {
                if let Some(content) = cache.get(key)? {
                    tracing::debug!("Using cached document for {}", url);
                    return Ok(content);
                }
            }
        }

        let content = self.fetch(url).await?;
        self.store(key, &content)?;
        Ok(content)
    }

    /// Saves `content` under `key` when caching is enabled
    pub fn store(&self, key: &CacheKey, content: &[u8]) -> Result<()> {
        if let Some(cache) = self.cache {
            cache.save(key, content)?;
        }
        Ok(())
    }

    /// Opens a page and navigates it to `url`
    ///
    /// The caller owns the returned page and must close it.
    pub async fn open(&self, url: &str) -> Result<Box<dyn Page>> {
        let page = Mutex::new(attempt(self.browser.new_page(), recognize).await??);
        let slot = &page;
        let limit = self.navigation_timeout + Duration::from_secs(1);

        let navigated = retry_on_timeout(&self.policy, url, move || async move {
            self.limiter.acquire().await;
            timed(url, limit, async move {
                let mut page = slot.lock().await;
                attempt(page.goto(url, WaitUntil::Load), recognize)
                    .await
                    .unwrap_or_else(|fatal| Err(fatal.into()))
            })
            .await
        })
        .await;

        let mut page = page.into_inner();
        match navigated {
            Ok(()) => Ok(page),
            Err(e) => {
                if let Err(close) = page.close().await {
                    tracing::debug!("Failed to close page for {}: {}", url, close);
                }
                Err(e)
            }
        }
    }
}
