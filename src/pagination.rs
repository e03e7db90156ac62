//! Paginated fetching and merging of search results.
//!
//! The [`Fetcher`] is a plain state machine: it decides *which* page to
//! request and applies *completed* responses, while the caller performs the
//! actual I/O. This keeps the ordering rules in one place:
//!
//! * Every effective-query change starts a new [`Generation`] and a fresh
//!   [`Catalog`]
//! * At most one page is in flight per generation (the `loading` gate)
//! * Responses tagged with another generation are discarded without
//!   touching any state, whatever order they arrive in
//! * A failed page ends pagination for its generation
//!
//! # Example
//!
//! ```rust
//! let mut fetcher = Fetcher::new(&config);
//!
//! if let Some(request) = fetcher.set_query("jazz") {
//!     let result = search.fetch_page(request.query.clone(), request.page).await;
//!     fetcher.complete(request.complete(result))?;
//! }
//! ```

use std::fmt;

use crate::{
    catalog::{Catalog, Merge, MergePolicy},
    config::Config,
    error::Result,
    events::Event,
    track::Track,
};

/// Fetch epoch, incremented on every effective-query change.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pagination progress for the current generation.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct PageState {
    /// The next page to request, starting at 1.
    pub page: u32,

    /// Whether more pages may be requested.
    pub has_more: bool,

    /// Whether a page is in flight.
    pub loading: bool,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            page: 1,
            has_more: true,
            loading: false,
        }
    }
}

/// A page fetch to be performed by the caller.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: Generation,
    pub query: String,
    pub page: u32,
}

impl PageRequest {
    /// Tags the outcome of this request for [`Fetcher::complete`].
    #[must_use]
    pub fn complete(self, result: Result<Vec<Track>>) -> PageResponse {
        PageResponse {
            generation: self.generation,
            page: self.page,
            result,
        }
    }
}

/// Outcome of a [`PageRequest`], tagged with the generation it belongs to.
#[derive(Debug)]
pub struct PageResponse {
    pub generation: Generation,
    pub page: u32,
    pub result: Result<Vec<Track>>,
}

/// What [`Fetcher::complete`] did with a response.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Completion {
    /// The response belonged to a superseded generation and was dropped.
    Stale,

    /// The page was merged into the catalog.
    Merged {
        page: u32,
        received: usize,
        merge: Merge,
        has_more: bool,
    },
}

#[derive(Debug)]
pub struct Fetcher {
    page_size: usize,
    max_pages: u32,
    policy: MergePolicy,

    query: Option<String>,
    generation: Generation,
    catalog: Catalog,
    state: PageState,
    failed: bool,

    event_tx: Option<tokio::sync::mpsc::UnboundedSender<Event>>,
}

impl Fetcher {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let generation = Generation::default();
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            policy: config.merge_policy,

            query: None,
            generation,
            catalog: Catalog::new(generation),
            state: PageState::default(),
            failed: false,

            event_tx: None,
        }
    }

    /// Registers a channel to receive pagination events.
    pub fn register(&mut self, event_tx: tokio::sync::mpsc::UnboundedSender<Event>) {
        self.event_tx = Some(event_tx);
    }

    fn notify(&self, event: Event) {
        if let Some(event_tx) = &self.event_tx {
            if let Err(e) = event_tx.send(event) {
                error!("failed to send event: {e}");
            }
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn page_state(&self) -> PageState {
        self.state
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Switches to a new effective query.
    ///
    /// Starts a new generation with an empty catalog and returns the
    /// request for its first page. Surrounding whitespace is ignored.
    /// Returns `None` without changing anything when `query` is blank or
    /// equal to the current query.
    pub fn set_query(&mut self, query: impl AsRef<str>) -> Option<PageRequest> {
        let query = query.as_ref().trim();
        if query.is_empty() {
            trace!("ignoring blank query");
            return None;
        }

        if self.query.as_deref() == Some(query) {
            trace!("query \"{query}\" unchanged");
            return None;
        }

        self.generation = self.generation.next();
        self.catalog = Catalog::new(self.generation);
        self.state = PageState::default();
        self.failed = false;
        debug!("query \"{query}\" starts generation {}", self.generation);

        self.query = Some(query.to_owned());
        self.notify(Event::QueryChanged(self.generation));

        self.request_next_page()
    }

    /// Requests the next page, if one may be requested.
    ///
    /// Returns `None` while a page is in flight or after pagination ended,
    /// so rapid repeated triggers collapse into a single request.
    pub fn request_next_page(&mut self) -> Option<PageRequest> {
        if self.state.loading || !self.state.has_more {
            return None;
        }

        let query = self.query.clone()?;

        if self.state.page > self.max_pages {
            debug!("page limit of {} reached", self.max_pages);
            self.state.has_more = false;
            return None;
        }

        self.state.loading = true;
        trace!(
            "requesting page {} of \"{query}\" for generation {}",
            self.state.page,
            self.generation
        );

        Some(PageRequest {
            generation: self.generation,
            query,
            page: self.state.page,
        })
    }

    /// Re-arms pagination after it ended because of a failure.
    ///
    /// The next [`request_next_page`](Self::request_next_page) will retry
    /// the page that failed. Pagination that ended because the results ran
    /// out stays ended.
    pub fn reset_pagination(&mut self) {
        if !self.failed {
            return;
        }

        debug!("re-arming page {} after failure", self.state.page);
        self.failed = false;
        self.state.has_more = true;
    }

    /// Applies a completed page fetch.
    ///
    /// # Errors
    ///
    /// Returns the transport failure of the response, after pagination for
    /// the current generation has been ended. The catalog is left as it was.
    pub fn complete(&mut self, response: PageResponse) -> Result<Completion> {
        let PageResponse {
            generation,
            page,
            result,
        } = response;

        if generation != self.generation || !self.state.loading || page != self.state.page {
            debug!(
                "discarding stale page {page} of generation {generation} (current: {})",
                self.generation
            );
            return Ok(Completion::Stale);
        }

        self.state.loading = false;

        let tracks = match result {
            Ok(tracks) => tracks,
            Err(e) => {
                self.state.has_more = false;
                self.failed = true;
                self.notify(Event::FetchFailed { generation, page });
                return Err(e);
            }
        };

        let received = tracks.len();
        let merge = self.catalog.merge(page, tracks, self.policy);

        if received == 0 || received < self.page_size || page >= self.max_pages {
            self.state.has_more = false;
        }
        self.state.page = page.saturating_add(1);

        debug!(
            "page {page} of generation {generation}: {received} received, {} added, {} total",
            merge.added,
            self.catalog.len()
        );

        let has_more = self.state.has_more;
        self.notify(Event::PageLoaded {
            generation,
            page,
            added: merge.added,
            has_more,
        });

        Ok(Completion::Merged {
            page,
            received,
            merge,
            has_more,
        })
    }
}
