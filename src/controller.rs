//! Event loop tying the fetcher, the player and the search backend together.
//!
//! The [`Controller`] is what a front end talks to. It applies user
//! [`Command`]s, performs the page fetches the [`Fetcher`] asks for, and
//! feeds fetch completions and resource notifications back into the state
//! machines, one at a time:
//!
//! ```text
//! Command ──► handle() ──► Fetcher ──► PageRequest ──► Search::fetch_page
//!                 │                                         │
//!                 ▼                                         ▼
//!               Player ◄── ResourceEvent      poll_next() ◄─┘
//! ```
//!
//! Fetches run concurrently with everything else, but their outcomes are
//! applied in the controller's own task, so the fetcher and the player
//! never see interleaved updates. Failures are logged and reported as
//! [`Event`]s; none of them stop the loop.

use futures_util::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{
    catalog::Catalog,
    config::Config,
    error::Result,
    events::Event,
    pagination::{Completion, Fetcher, PageRequest, PageResponse},
    player::{PlaybackState, Player},
    resource::{Output, ResourceEvent},
    search::Search,
    track::TrackId,
};

/// User intent, as issued by a front end.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Switches to a new effective query.
    SetQuery(String),

    /// Requests the next page of results.
    LoadMore,

    /// Re-arms pagination after a failed page.
    ResetPagination,

    PlayAt(usize),
    Select(TrackId),
    TogglePlay,

    /// Seeks to a position in seconds.
    Seek(f64),

    Next,
    Prev,
    Stop,
}

enum Wakeup {
    Page(PageResponse),
    Resource(ResourceEvent),
}

pub struct Controller<S: Search, O: Output> {
    search: S,
    fetcher: Fetcher,
    player: Player<O>,

    /// Page fetches in flight, including superseded ones.
    pending: FuturesUnordered<BoxFuture<'static, PageResponse>>,
}

impl<S: Search, O: Output> Controller<S, O> {
    #[must_use]
    pub fn new(config: &Config, search: S, output: O) -> Self {
        Self {
            search,
            fetcher: Fetcher::new(config),
            player: Player::new(output),
            pending: FuturesUnordered::new(),
        }
    }

    /// Registers a channel to receive pagination and playback events.
    pub fn register(&mut self, event_tx: UnboundedSender<Event>) {
        self.fetcher.register(event_tx.clone());
        self.player.register(event_tx);
    }

    #[must_use]
    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    #[must_use]
    pub fn player(&self) -> &Player<O> {
        &self.player
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        self.fetcher.catalog()
    }

    #[must_use]
    pub fn playback_state(&self) -> PlaybackState {
        self.player.state()
    }

    /// Number of page fetches that have not completed yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Applies a command.
    ///
    /// # Errors
    ///
    /// Returns playback start failures. They are also reported as
    /// [`Event::PlaybackFailed`] and leave the controller usable.
    pub fn handle(&mut self, command: Command) -> Result<()> {
        trace!("command: {command:?}");

        match command {
            Command::SetQuery(query) => {
                if let Some(request) = self.fetcher.set_query(query) {
                    self.player.stop();
                    self.fetch(request);
                }
            }

            Command::LoadMore => {
                if let Some(request) = self.fetcher.request_next_page() {
                    self.fetch(request);
                }
            }

            Command::ResetPagination => self.fetcher.reset_pagination(),

            Command::PlayAt(index) => self.player.play_at(self.fetcher.catalog(), index)?,
            Command::Select(id) => self.player.select(self.fetcher.catalog(), &id)?,
            Command::TogglePlay => self.player.toggle_play(self.fetcher.catalog())?,
            Command::Seek(seconds) => self.player.seek(self.fetcher.catalog(), seconds),
            Command::Next => self.player.next(self.fetcher.catalog())?,
            Command::Prev => self.player.prev(self.fetcher.catalog())?,
            Command::Stop => self.player.stop(),
        }

        Ok(())
    }

    fn fetch(&mut self, request: PageRequest) {
        let fetch = self.search.fetch_page(request.query.clone(), request.page);
        self.pending
            .push(fetch.map(move |result| request.complete(result)).boxed());
    }

    /// Waits for the next fetch completion or resource notification and
    /// applies it.
    ///
    /// Cancel safe: nothing is applied until the wait is over.
    ///
    /// # Errors
    ///
    /// Returns page fetch failures and failures to start an auto-advanced
    /// track. Both are also reported as events.
    pub async fn poll_next(&mut self) -> Result<()> {
        let wakeup = tokio::select! {
            Some(response) = self.pending.next(), if !self.pending.is_empty() => {
                Wakeup::Page(response)
            }
            Some(event) = self.player.recv_resource_event() => Wakeup::Resource(event),
        };

        match wakeup {
            Wakeup::Page(response) => {
                if let Completion::Merged { page, received, .. } = self.fetcher.complete(response)?
                {
                    trace!("applied page {page} with {received} tracks");
                }
                Ok(())
            }
            Wakeup::Resource(event) => self
                .player
                .handle_resource_event(self.fetcher.catalog(), event),
        }
    }

    /// Runs until `commands` is closed.
    pub async fn run(&mut self, mut commands: UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(e) = self.handle(command) {
                            warn!("{e}");
                        }
                    }
                    None => break,
                },

                result = self.poll_next() => {
                    if let Err(e) = result {
                        warn!("{e}");
                    }
                }
            }
        }

        debug!("command channel closed");
        self.player.stop();
    }
}
