//! Chunked scheduling of crawl work
//!
//! Work items run in contiguous chunks. All items of a chunk are driven
//! concurrently on the calling task and the next chunk only starts once every
//! item of the current one has finished. A failing or panicking item never
//! cancels its siblings; it is logged and counted in the [`ChunkReport`].

use crate::config::Category;
use crate::Result;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Outcome of a [`run_chunked`] pass
#[derive(Debug)]
pub struct ChunkReport<O> {
    /// Number of chunks started
    pub chunks: usize,

    /// Values of the items that succeeded, in item order
    pub succeeded: Vec<O>,

    /// Items that returned an error
    pub failed: usize,

    /// Items that panicked
    pub panicked: usize,
}

impl<O> ChunkReport<O> {
    fn new() -> Self {
        Self {
            chunks: 0,
            succeeded: Vec::new(),
            failed: 0,
            panicked: 0,
        }
    }

    /// True when no item failed or panicked
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.panicked == 0
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed + self.panicked
    }
}

/// Runs `worker` over `items` in chunks of at most `chunk_size`
///
/// A `chunk_size` of zero is treated as one. Errors and panics of single
/// items are caught here; the worker is expected to have logged the context
/// it knows about (url, page, index) before returning an error.
///
/// # Arguments
///
/// * `items` - Work items, processed in order chunk by chunk
/// * `chunk_size` - Maximum number of items in flight at once
/// * `worker` - Produces the future processing one item
pub async fn run_chunked<T, O, F, Fut>(items: Vec<T>, chunk_size: usize, mut worker: F) -> ChunkReport<O>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<O>>,
{
    let chunk_size = chunk_size.max(1);
    let mut report = ChunkReport::new();
    let mut items = items.into_iter().peekable();

    while items.peek().is_some() {
        let chunk: Vec<Fut> = items.by_ref().take(chunk_size).map(&mut worker).collect();
        report.chunks += 1;
        tracing::trace!("Starting chunk {} ({} items)", report.chunks, chunk.len());

        let outcomes = join_all(
            chunk
                .into_iter()
                .map(|fut| AssertUnwindSafe(fut).catch_unwind()),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                Ok(Ok(value)) => report.succeeded.push(value),
                Ok(Err(e)) => {
                    tracing::debug!("Work item failed: {}", e);
                    report.failed += 1;
                }
                Err(payload) => {
                    tracing::error!("Work item panicked: {}", panic_message(payload.as_ref()));
                    report.panicked += 1;
                }
            }
        }
    }

    report
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Selects the inclusive window of categories between `start` and `end`
///
/// Names are matched exactly. A start name that is not found falls back to
/// the first category and an end name that is not found falls back to the
/// last one. An end that precedes the start yields an empty window.
pub fn select_window<'a>(
    categories: &'a [Category],
    start: Option<&str>,
    end: Option<&str>,
) -> &'a [Category] {
    if categories.is_empty() {
        return categories;
    }

    let position = |name: &str| categories.iter().position(|c| c.name == name);

    let first = match start {
        Some(name) => position(name).unwrap_or_else(|| {
            tracing::warn!(
                "Start category '{}' not found, starting from '{}'",
                name,
                categories[0].name
            );
            0
        }),
        None => 0,
    };

    let last_index = categories.len() - 1;
    let last = match end {
        Some(name) => position(name).unwrap_or_else(|| {
            tracing::warn!(
                "End category '{}' not found, ending with '{}'",
                name,
                categories[last_index].name
            );
            last_index
        }),
        None => last_index,
    };

    if last < first {
        tracing::warn!(
            "End category '{}' comes before start category '{}', nothing to crawl",
            categories[last].name,
            categories[first].name
        );
        return &categories[0..0];
    }

    &categories[first..=last]
}

/// Product chunk size that adapts to how pages go
///
/// Starts at `max`. A page with failed products halves the size, a clean
/// page grows it by one. The size always stays within `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizer {
    min: usize,
    max: usize,
    current: usize,
}

impl ChunkSizer {
    pub fn new(min: usize, max: usize) -> Self {
        let min = min.max(1);
        let max = max.max(min);
        Self {
            min,
            max,
            current: max,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Records the outcome of one page
    pub fn record(&mut self, clean: bool) {
        let next = if clean {
            (self.current + 1).min(self.max)
        } else {
            (self.current / 2).max(self.min)
        };

        if next != self.current {
            tracing::debug!("Product chunk size {} -> {}", self.current, next);
        }
        self.current = next;
    }
}
