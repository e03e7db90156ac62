//! Events emitted while browsing and playing back search results.
//!
//! Front ends receive these over the channel registered with
//! [`Controller::register`](crate::controller::Controller::register) to
//! render state changes without polling.
//!
//! # Example
//!
//! ```rust
//! use tunescroll::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::PageLoaded { added, .. } => println!("{added} more tracks"),
//!         Event::TrackChanged(index) => println!("now playing #{index}"),
//!         Event::PlaybackFailed(index) => println!("could not start #{index}"),
//!         // ... handle other events ...
//!         _ => {}
//!     }
//! }
//! ```

use crate::pagination::Generation;

/// Events that can be emitted by the fetcher or the player.
///
/// Pagination Events:
/// * [`QueryChanged`](Self::QueryChanged) - A new catalog generation started
/// * [`PageLoaded`](Self::PageLoaded) - A page was merged into the catalog
/// * [`FetchFailed`](Self::FetchFailed) - A page could not be fetched
///
/// Playback Events:
/// * [`TrackChanged`](Self::TrackChanged) - A different track was loaded
/// * [`Play`](Self::Play) / [`Pause`](Self::Pause) - Transport changes
/// * [`Stopped`](Self::Stopped) - The player went idle
/// * [`Finished`](Self::Finished) - The last track of the catalog ended
/// * [`PlaybackFailed`](Self::PlaybackFailed) - Playback could not start
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// The effective query changed and the catalog was cleared.
    QueryChanged(Generation),

    /// A page was merged into the catalog.
    PageLoaded {
        generation: Generation,
        page: u32,
        added: usize,
        has_more: bool,
    },

    /// Fetching a page failed. Pagination ended for this generation.
    FetchFailed { generation: Generation, page: u32 },

    /// Playback has started or resumed.
    Play,

    /// Playback has paused.
    Pause,

    /// The track at this catalog index was loaded.
    TrackChanged(usize),

    /// The player released its resource and went idle.
    Stopped,

    /// The last track in the catalog played to its end.
    Finished,

    /// Playback of the track at this catalog index could not start.
    PlaybackFailed(usize),
}
