//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator walks every category of the configured window through
//! `NOT_STARTED -> PAGINATING -> DONE`:
//! - the category state is loaded (or created) from the state store
//! - listing pages are fetched (or read from the cache) one after another
//! - the products of a page are processed in chunks, each product writing
//!   its rows to the page's CSV file before it is checkpointed as done
//! - a page is checkpointed only when none of its products failed
//!
//! A failure aborts the current product, page or category only. Whatever
//! was checkpointed stays on disk, so running the crawl again resumes it.

use crate::cache::{CacheKey, ContentCache};
use crate::config::{Category, Config};
use crate::crawler::scheduler::{run_chunked, select_window, ChunkSizer};
use crate::crawler::RateLimiter;
use crate::driver::{parse, Browser, HttpBrowser, ParserEngine};
use crate::extract::{ProductContext, ProductRef, SelectorExtractor, SiteExtractor};
use crate::output::{append_run_report, report_path, CrawlSummary, CsvSink, CUSTOM_URLS};
use crate::retry::{retry_on_timeout, BackoffPolicy};
use crate::state::CategoryState;
use crate::storage::{open_storage, RunStatus, StateStore, STATE_DB_FILE};
use crate::{ConfigError, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Counters shared by all tasks of a run
#[derive(Debug, Default)]
struct Progress {
    categories_done: AtomicUsize,
    categories_skipped: AtomicUsize,
    categories_failed: AtomicUsize,
    pages: AtomicUsize,
    products_done: AtomicUsize,
    products_skipped: AtomicUsize,
    products_failed: AtomicUsize,
    rows: AtomicUsize,
}

impl Progress {
    fn bump(counter: &AtomicUsize, by: usize) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        for counter in [
            &self.categories_done,
            &self.categories_skipped,
            &self.categories_failed,
            &self.pages,
            &self.products_done,
            &self.products_skipped,
            &self.products_failed,
            &self.rows,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CategoryOutcome {
    Done,
    AlreadyDone,
    /// A page had failed products; the category resumes there next run
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProductOutcome {
    Written(usize),
    Skipped,
}

/// One listing page as seen by its product workers
#[derive(Clone, Copy)]
struct Listing<'a> {
    category: &'a Category,
    pageno: u32,
    url: &'a str,
    content: &'a [u8],
    engine: ParserEngine,
    count: usize,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    config_hash: String,
    date: String,
    storage: Arc<dyn StateStore>,
    browser: Arc<dyn Browser>,
    extractor: Arc<dyn SiteExtractor>,
    limiter: Arc<RateLimiter>,
    cache: Option<ContentCache>,
    sink: CsvSink,
    policy: BackoffPolicy,
    // Shared across categories so failures anywhere shrink the chunks
    sizer: Mutex<ChunkSizer>,
    progress: Progress,
}

impl Coordinator {
    /// Creates a coordinator from its collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - The crawl configuration
    /// * `storage` - Checkpoint store shared by all tasks
    /// * `browser` - Driver used for every request
    /// * `extractor` - Site-specific extraction logic
    pub fn new(
        config: Config,
        storage: Arc<dyn StateStore>,
        browser: Arc<dyn Browser>,
        extractor: Arc<dyn SiteExtractor>,
    ) -> Self {
        let root = PathBuf::from(&config.output.directory);
        let cache = config
            .checkpoint
            .save_html
            .then(|| ContentCache::new(&root));

        Self {
            date: config.crawl_date(),
            config_hash: String::new(),
            limiter: Arc::new(RateLimiter::from_config(&config.network)),
            policy: BackoffPolicy::from_config(&config.network),
            sizer: Mutex::new(ChunkSizer::new(
                config.products.min_chunk_size,
                config.products.max_chunk_size,
            )),
            sink: CsvSink::new(root),
            cache,
            storage,
            browser,
            extractor,
            config: Arc::new(config),
            progress: Progress::default(),
        }
    }

    /// Builds a coordinator with the HTTP driver, the declarative extractor
    /// and the SQLite state store below the site directory
    pub fn from_config(config: Config, config_hash: impl Into<String>) -> Result<Self> {
        let extract = config.extract.clone().ok_or_else(|| {
            ConfigError::Validation("an [extract] table is required to crawl".to_string())
        })?;
        let extractor = SelectorExtractor::new(extract)?;
        let browser = HttpBrowser::new(&config.network)?;
        let storage = open_storage(&config.site_dir().join(STATE_DB_FILE))?;

        Ok(Self::new(config, Arc::new(storage), Arc::new(browser), Arc::new(extractor))
            .with_config_hash(config_hash))
    }

    /// Sets the configuration hash recorded with the run
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Shares an existing limiter instead of the one built from the config
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Date stamp this coordinator crawls
    pub fn date(&self) -> &str {
        &self.date
    }

    fn site(&self) -> &str {
        &self.config.site.name
    }

    /// Runs the crawl to completion
    ///
    /// Categories (or the configured product URLs) are processed, the run is
    /// recorded in the state store and a run report is appended.
    pub async fn run(&self) -> Result<CrawlSummary> {
        self.progress.reset();
        let run_id = self
            .storage
            .create_run(self.site(), &self.date, &self.config_hash)?;
        let started_at = chrono::Local::now();
        let start_time = Instant::now();

        tracing::info!(
            "Starting crawl run {} for {} ({})",
            run_id,
            self.site(),
            self.date
        );

        let crawled = if self.config.urls.is_empty() {
            self.crawl_categories().await
        } else {
            self.crawl_urls().await
        };

        let status = if crawled.is_ok() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.storage.complete_run(run_id, status)?;

        let summary = self.summary(start_time.elapsed());
        let run_number = self.storage.count_runs(self.site(), &self.date)?;
        let report = report_path(Path::new(&self.config.output.directory), self.site(), &self.date);
        if let Err(e) = append_run_report(&report, run_number, started_at, chrono::Local::now(), &summary) {
            tracing::warn!("Failed to write run report {}: {}", report.display(), e);
        }

        crawled?;
        tracing::info!(
            "Crawl completed: {} products ({} rows) in {:?}",
            summary.products_done,
            summary.rows,
            summary.elapsed
        );

        Ok(summary)
    }

    async fn crawl_categories(&self) -> Result<()> {
        let categories = &self.config.category;
        let window = select_window(
            categories,
            self.config.categories.start.as_deref(),
            self.config.categories.end.as_deref(),
        );
        let chunk_size = self.config.categories.chunk_size;

        tracing::info!(
            "Crawling {} of {} categories, {} at a time",
            window.len(),
            categories.len(),
            chunk_size
        );

        let report = run_chunked(window.iter().collect(), chunk_size, move |category| async move {
            let outcome = self.crawl_category(category).await;
            match &outcome {
                Ok(CategoryOutcome::Done) => Progress::bump(&self.progress.categories_done, 1),
                Ok(CategoryOutcome::AlreadyDone) => {
                    Progress::bump(&self.progress.categories_skipped, 1)
                }
                Ok(CategoryOutcome::Interrupted) => {
                    Progress::bump(&self.progress.categories_failed, 1)
                }
                Err(e) => {
                    tracing::error!("Category {} aborted: {}", category.name, e);
                    Progress::bump(&self.progress.categories_failed, 1);
                }
            }
            outcome
        })
        .await;

        tracing::info!(
            "Categories: {} done, {} already done, {} unfinished ({} chunks)",
            Progress::get(&self.progress.categories_done),
            Progress::get(&self.progress.categories_skipped),
            Progress::get(&self.progress.categories_failed),
            report.chunks
        );
        Ok(())
    }

    async fn crawl_category(&self, category: &Category) -> Result<CategoryOutcome> {
        let site = self.site();
        let date = self.date.as_str();
        let checkpoint = self.config.checkpoint.category_states;
        let start_page = self.config.site.start_page;

        let mut state = if checkpoint {
            match self
                .storage
                .load_category_state(site, &category.name, date, start_page)?
            {
                Some(state) => state,
                None => {
                    tracing::info!("Category {} already done for {}", category.name, date);
                    return Ok(CategoryOutcome::AlreadyDone);
                }
            }
        } else {
            CategoryState::new(site, &category.name, date, start_page)
        };

        tracing::info!("Visiting category {} from page {}", category.name, state.pageno);

        loop {
            let pageno = state.pageno;
            let page_url = self.extractor.page_url(category, pageno)?;
            let ctx = self.context(&category.name, Some(pageno));
            let key = CacheKey::category_page(site, date, &category.name, pageno);

            let mut content = ctx.load(&page_url, &key, false).await?;
            let mut engine = ParserEngine::Document;
            let count = match self.count_products(&page_url, &content, engine) {
                Err(e) if e.kind() == ErrorKind::ParseFailure => {
                    tracing::warn!("{}; re-fetching with the fragment parser", e);
                    content = ctx.load(&page_url, &key, true).await?;
                    engine = ParserEngine::Fragment;
                    self.count_products(&page_url, &content, engine)?
                }
                other => other?,
            };

            let count = match count {
                Some(count) if count > 0 => count,
                _ => {
                    tracing::info!(
                        "No products on page {} of {}, category finished",
                        pageno,
                        category.name
                    );
                    break;
                }
            };

            let chunk_size = self.chunk_size();
            tracing::info!(
                "Crawling page {} of {}: {} products, {} at a time",
                pageno,
                category.name,
                count,
                chunk_size
            );

            let listing = Listing {
                category,
                pageno,
                url: &page_url,
                content: &content,
                engine,
                count,
            };
            let ctx = &ctx;
            let report = run_chunked((0..count).collect(), chunk_size, move |index| async move {
                self.crawl_product(ctx, listing, index).await
            })
            .await;

            self.record_page(report.is_clean());
            if !report.is_clean() {
                tracing::error!(
                    "Page {} of {} ({}): {} of {} products failed, stopping the category",
                    pageno,
                    category.name,
                    page_url,
                    report.failed + report.panicked,
                    count
                );
                return Ok(CategoryOutcome::Interrupted);
            }

            Progress::bump(&self.progress.pages, 1);
            state.advance();
            if checkpoint {
                self.storage.save_category_state(&state)?;
            }
        }

        state.finish();
        if checkpoint {
            self.storage.save_category_state(&state)?;
        }
        tracing::info!("Category {} done", category.name);

        Ok(CategoryOutcome::Done)
    }

    /// Processes one product and keeps the counters
    async fn crawl_product(
        &self,
        ctx: &ProductContext<'_>,
        listing: Listing<'_>,
        index: usize,
    ) -> Result<ProductOutcome> {
        let outcome = self.process_product(ctx, listing, index).await;

        match &outcome {
            Ok(ProductOutcome::Written(rows)) => {
                Progress::bump(&self.progress.products_done, 1);
                Progress::bump(&self.progress.rows, *rows);
            }
            Ok(ProductOutcome::Skipped) => Progress::bump(&self.progress.products_skipped, 1),
            Err(e) => {
                tracing::error!(
                    "Product #{} on page {} of {} ({}) failed: {}",
                    index,
                    listing.pageno,
                    listing.category.name,
                    listing.url,
                    e
                );
                Progress::bump(&self.progress.products_failed, 1);
            }
        }

        outcome
    }

    async fn process_product(
        &self,
        ctx: &ProductContext<'_>,
        listing: Listing<'_>,
        index: usize,
    ) -> Result<ProductOutcome> {
        let product = match self.resolve(listing.url, listing.content, listing.engine, index) {
            Ok(product) => product,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(
                    "Product #{} not resolvable on {}, re-fetching the page",
                    index,
                    listing.url
                );
                let key = CacheKey::category_page(
                    self.site(),
                    &self.date,
                    &listing.category.name,
                    listing.pageno,
                );
                let fresh = ctx.load(listing.url, &key, true).await?;
                self.resolve(listing.url, &fresh, listing.engine, index)?
            }
            Err(e) => return Err(e),
        };

        let state = if self.config.checkpoint.product_states {
            match self.storage.load_or_create_product_state(
                self.site(),
                &product.id,
                &listing.category.name,
                &self.date,
            )? {
                Some(state) => Some(state),
                None => {
                    tracing::debug!("Product {} already done, skipping", product.id);
                    return Ok(ProductOutcome::Skipped);
                }
            }
        } else {
            None
        };

        let rows = retry_on_timeout(&self.policy, &product.url, || {
            self.extractor.extract_rows(ctx, &product)
        })
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) if e.kind() == ErrorKind::InconsistentData && listing.count > 1 => {
                tracing::warn!("Skipping product {} ({}): {}", product.id, product.url, e);
                return Ok(ProductOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        let path = self.sink.page_path(
            self.site(),
            &self.date,
            &listing.category.name,
            listing.pageno,
        );
        let written = self.sink.append_rows(&path, &self.config.column, &rows)?;

        if let Some(mut state) = state {
            state.finish();
            self.storage.save_product_state(&state)?;
        }

        tracing::info!("Crawled product {} ({} rows)", product.id, written);
        Ok(ProductOutcome::Written(written))
    }

    /// URL list mode: every configured URL is one product
    async fn crawl_urls(&self) -> Result<()> {
        let urls = &self.config.urls;
        let chunk_size = self.config.products.max_chunk_size.min(10);
        let path = self.sink.custom_urls_path(self.site(), &self.date);
        let ctx = self.context(CUSTOM_URLS, None);

        tracing::info!("Crawling {} product URLs, {} at a time", urls.len(), chunk_size);

        let (ctx, path) = (&ctx, path.as_path());
        let report = run_chunked(urls.iter().collect(), chunk_size, move |url| async move {
            let outcome = self.crawl_url(ctx, path, url).await;
            match &outcome {
                Ok(ProductOutcome::Written(rows)) => {
                    Progress::bump(&self.progress.products_done, 1);
                    Progress::bump(&self.progress.rows, *rows);
                }
                Ok(ProductOutcome::Skipped) => {
                    Progress::bump(&self.progress.products_skipped, 1)
                }
                Err(e) => {
                    tracing::error!("Product URL {} failed: {}", url, e);
                    Progress::bump(&self.progress.products_failed, 1);
                }
            }
            outcome
        })
        .await;

        tracing::info!(
            "Product URLs: {} written, {} failed",
            report.succeeded.len(),
            report.failed + report.panicked
        );
        Ok(())
    }

    async fn crawl_url(
        &self,
        ctx: &ProductContext<'_>,
        path: &Path,
        url: &str,
    ) -> Result<ProductOutcome> {
        // Product ids are only known after extraction; the URL keys the state
        let state = if self.config.checkpoint.product_states {
            match self
                .storage
                .load_or_create_product_state(self.site(), url, CUSTOM_URLS, &self.date)?
            {
                Some(state) => Some(state),
                None => {
                    tracing::debug!("Product URL {} already done, skipping", url);
                    return Ok(ProductOutcome::Skipped);
                }
            }
        } else {
            None
        };

        let rows = retry_on_timeout(&self.policy, url, || self.extractor.extract_url(ctx, url)).await?;
        let written = self.sink.append_rows(path, &self.config.column, &rows)?;

        if let Some(mut state) = state {
            state.finish();
            self.storage.save_product_state(&state)?;
        }

        tracing::info!("Crawled product URL {} ({} rows)", url, written);
        Ok(ProductOutcome::Written(written))
    }

    fn count_products(&self, url: &str, content: &[u8], engine: ParserEngine) -> Result<Option<usize>> {
        let document = parse(url, content, engine)?;
        self.extractor.count_products(&document)
    }

    fn resolve(&self, url: &str, content: &[u8], engine: ParserEngine, index: usize) -> Result<ProductRef> {
        let document = parse(url, content, engine)?;
        self.extractor.product_ref(&document, index, url)
    }

    fn context<'a>(&'a self, category: &'a str, page: Option<u32>) -> ProductContext<'a> {
        let network = &self.config.network;
        ProductContext {
            browser: self.browser.as_ref(),
            limiter: self.limiter.as_ref(),
            cache: self.cache.as_ref(),
            site: self.site(),
            date: &self.date,
            category,
            page,
            policy: self.policy,
            request_timeout: Duration::from_secs(network.request_timeout_secs),
            navigation_timeout: Duration::from_millis(network.navigation_timeout_ms),
            lazy_retries: network.lazy_retries,
        }
    }

    fn chunk_size(&self) -> usize {
        match self.sizer.lock() {
            Ok(sizer) => sizer.current(),
            Err(_) => self.config.products.min_chunk_size.max(1),
        }
    }

    fn record_page(&self, clean: bool) {
        if let Ok(mut sizer) = self.sizer.lock() {
            sizer.record(clean);
        }
    }

    fn summary(&self, elapsed: Duration) -> CrawlSummary {
        let p = &self.progress;
        CrawlSummary {
            site: self.site().to_string(),
            date: self.date.clone(),
            categories_done: Progress::get(&p.categories_done),
            categories_skipped: Progress::get(&p.categories_skipped),
            categories_failed: Progress::get(&p.categories_failed),
            pages: Progress::get(&p.pages),
            products_done: Progress::get(&p.products_done),
            products_skipped: Progress::get(&p.products_skipped),
            products_failed: Progress::get(&p.products_failed),
            rows: Progress::get(&p.rows),
            elapsed,
        }
    }
}

/// Runs a complete crawl with the built-in driver and extractor
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the state store below the site directory
/// 2. Build the HTTP driver and the selector extractor
/// 3. Crawl the category window (or the configured product URLs)
/// 4. Record the run and append the run report
///
/// # Arguments
///
/// * `config` - The crawl configuration
/// * `config_hash` - Hash of the configuration file, recorded with the run
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::load_config_with_hash;
/// use catalog_harvest::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("harvest.toml"))?;
/// let summary = run_crawl(config, hash).await?;
/// println!("{} products", summary.products_done);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: impl Into<String>) -> Result<CrawlSummary> {
    let coordinator = Coordinator::from_config(config, config_hash)?;
    coordinator.run().await
}
