//! Sequential playback over the catalog.
//!
//! The [`Player`] owns the current catalog index, the transport state and
//! at most one playable resource:
//!
//! * **Idle**: no index, no resource
//! * **Playing**: a resource for the track at the index is running
//! * **Paused**: the resource exists but is suspended
//!
//! The catalog is passed in by reference on every call. The player binds to
//! the generation of the catalog it started playing from; as soon as it is
//! handed a catalog of another generation it releases its resource and
//! goes idle before doing anything else.
//!
//! Out-of-range indices are ignored. At the ends of the catalog, `next()`
//! and `prev()` leave the player untouched, while a track ending on its own
//! at the last index pauses playback.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{
    catalog::Catalog,
    error::Result,
    events::Event,
    pagination::Generation,
    resource::{Notification, Output, Resource, ResourceEvent, Subscription, Ticket},
    track::{Track, TrackId},
};

/// Transport status derived from the [`PlaybackState`].
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum Status {
    #[default]
    Idle,
    Playing,
    Paused,
}

#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct PlaybackState {
    pub index: Option<usize>,
    pub playing: bool,
    pub position: Duration,
    pub duration: Duration,
}

impl PlaybackState {
    #[must_use]
    pub fn status(&self) -> Status {
        match (self.index, self.playing) {
            (None, _) => Status::Idle,
            (Some(_), true) => Status::Playing,
            (Some(_), false) => Status::Paused,
        }
    }
}

pub struct Player<O: Output> {
    output: O,
    resource: Option<O::Resource>,
    ticket: Ticket,
    generation: Option<Generation>,
    state: PlaybackState,

    resource_tx: UnboundedSender<ResourceEvent>,
    resource_rx: UnboundedReceiver<ResourceEvent>,
    event_tx: Option<UnboundedSender<Event>>,
}

impl<O: Output> Player<O> {
    #[must_use]
    pub fn new(output: O) -> Self {
        let (resource_tx, resource_rx) = mpsc::unbounded_channel();
        Self {
            output,
            resource: None,
            ticket: Ticket::default(),
            generation: None,
            state: PlaybackState::default(),

            resource_tx,
            resource_rx,
            event_tx: None,
        }
    }

    /// Registers a channel to receive playback events.
    pub fn register(&mut self, event_tx: UnboundedSender<Event>) {
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
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.state.status()
    }

    /// The track at the current index, if it is still in `catalog`.
    #[must_use]
    pub fn current_track<'a>(&self, catalog: &'a Catalog) -> Option<&'a Track> {
        if self.generation != Some(catalog.generation()) {
            return None;
        }

        self.state.index.and_then(|index| catalog.get(index))
    }

    /// Waits for the next notification from an owned resource.
    pub async fn recv_resource_event(&mut self) -> Option<ResourceEvent> {
        self.resource_rx.recv().await
    }

    /// Returns a pending resource notification without waiting.
    pub fn try_recv_resource_event(&mut self) -> Option<ResourceEvent> {
        self.resource_rx.try_recv().ok()
    }

    /// Goes idle when `catalog` is not the one playback started from.
    fn sync(&mut self, catalog: &Catalog) {
        if self.state.index.is_none() && self.resource.is_none() {
            return;
        }

        let replaced = self.generation != Some(catalog.generation());
        let out_of_range = self.state.index.is_some_and(|index| index >= catalog.len());
        if replaced || out_of_range {
            debug!("catalog replaced; stopping playback");
            self.stop();
        }
    }

    /// Stops and detaches the owned resource, if any.
    ///
    /// Invalidates the ticket so that notifications still queued from the
    /// released resource are ignored.
    fn release(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            trace!("releasing resource {}", self.ticket);
            resource.release();
        }

        self.ticket = self.ticket.next();
    }

    /// Releases the resource and goes idle.
    pub fn stop(&mut self) {
        if self.state.index.is_none() && self.resource.is_none() {
            return;
        }

        self.release();
        self.state = PlaybackState::default();
        self.generation = None;
        self.notify(Event::Stopped);
    }

    /// Starts playback of the track at `index`.
    ///
    /// Any owned resource is released before the new one is acquired.
    /// Out-of-range indices are ignored.
    ///
    /// # Errors
    ///
    /// Returns the playback start failure. If the resource refused to
    /// start, the player stays paused at `index`; if no resource could be
    /// acquired at all, the player is idle.
    pub fn play_at(&mut self, catalog: &Catalog, index: usize) -> Result<()> {
        self.sync(catalog);

        let Some(track) = catalog.get(index) else {
            trace!("ignoring out of range index {index} ({} tracks)", catalog.len());
            return Ok(());
        };

        self.release();
        self.generation = Some(catalog.generation());
        self.state = PlaybackState {
            index: Some(index),
            ..PlaybackState::default()
        };

        let subscription = Subscription::new(self.ticket, self.resource_tx.clone());
        match self.output.acquire(&track.preview_url, subscription) {
            Ok(resource) => self.resource = Some(resource),
            Err(e) => {
                warn!("failed to load {track}: {e}");
                self.state = PlaybackState::default();
                self.generation = None;
                self.notify(Event::PlaybackFailed(index));
                self.notify(Event::Stopped);
                return Err(e);
            }
        }

        info!("loaded {track}");
        self.notify(Event::TrackChanged(index));

        self.resume(index)
    }

    fn resume(&mut self, index: usize) -> Result<()> {
        let Some(resource) = self.resource.as_mut() else {
            return Ok(());
        };

        match resource.play() {
            Ok(()) => {
                self.state.playing = true;
                self.notify(Event::Play);
                Ok(())
            }
            Err(e) => {
                warn!("failed to start track {index}: {e}");
                self.state.playing = false;
                self.notify(Event::PlaybackFailed(index));
                Err(e)
            }
        }
    }

    /// Resolves `id` against the current catalog and plays it.
    ///
    /// Unknown identifiers are ignored.
    ///
    /// # Errors
    ///
    /// Returns the playback start failure, as [`play_at`](Self::play_at).
    pub fn select(&mut self, catalog: &Catalog, id: &TrackId) -> Result<()> {
        match catalog.position(id) {
            Some(index) => self.play_at(catalog, index),
            None => {
                trace!("ignoring unknown track {id}");
                Ok(())
            }
        }
    }

    /// Flips between playing and paused. Does nothing when idle.
    ///
    /// # Errors
    ///
    /// Returns the failure to resume; the player stays paused.
    pub fn toggle_play(&mut self, catalog: &Catalog) -> Result<()> {
        self.sync(catalog);

        let Some(index) = self.state.index else {
            return Ok(());
        };

        if self.state.playing {
            if let Some(resource) = self.resource.as_mut() {
                resource.pause();
            }
            self.state.playing = false;
            self.notify(Event::Pause);
            Ok(())
        } else {
            self.resume(index)
        }
    }

    /// Moves the position to `seconds`, clamped to the known duration.
    ///
    /// Does nothing when idle. Before the resource reported its duration
    /// every seek lands on zero.
    pub fn seek(&mut self, catalog: &Catalog, seconds: f64) {
        self.sync(catalog);

        let Some(resource) = self.resource.as_mut() else {
            return;
        };

        let seconds = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.state.duration.as_secs_f64())
        };

        let position = Duration::from_secs_f64(seconds);
        resource.set_current_time(position);
        self.state.position = position;
    }

    /// Plays the following track. Does nothing at the last track.
    ///
    /// # Errors
    ///
    /// Returns the playback start failure, as [`play_at`](Self::play_at).
    pub fn next(&mut self, catalog: &Catalog) -> Result<()> {
        self.sync(catalog);

        match self.state.index {
            Some(index) if index + 1 < catalog.len() => self.play_at(catalog, index + 1),
            _ => Ok(()),
        }
    }

    /// Plays the preceding track. Does nothing at the first track.
    ///
    /// # Errors
    ///
    /// Returns the playback start failure, as [`play_at`](Self::play_at).
    pub fn prev(&mut self, catalog: &Catalog) -> Result<()> {
        self.sync(catalog);

        match self.state.index {
            Some(index) if index > 0 => self.play_at(catalog, index - 1),
            _ => Ok(()),
        }
    }

    /// Applies a notification from the owned resource.
    ///
    /// Notifications from released resources are ignored. When the track
    /// ends, playback advances to the next track or pauses at the last one.
    ///
    /// # Errors
    ///
    /// Returns the playback start failure of the auto-advanced track.
    pub fn handle_resource_event(&mut self, catalog: &Catalog, event: ResourceEvent) -> Result<()> {
        if event.ticket != self.ticket || self.resource.is_none() {
            trace!("ignoring notification from released resource {}", event.ticket);
            return Ok(());
        }

        self.sync(catalog);
        let Some(index) = self.state.index else {
            return Ok(());
        };

        match event.notification {
            Notification::MetadataReady(duration) => {
                trace!("duration: {:.1}s", duration.as_secs_f32());
                self.state.duration = duration;
            }
            Notification::TimeUpdate(position) => {
                self.state.position = position;
            }
            Notification::Ended => {
                if index + 1 < catalog.len() {
                    debug!("track {index} ended; advancing");
                    return self.play_at(catalog, index + 1);
                }

                debug!("last track ended");
                self.state.playing = false;
                self.notify(Event::Pause);
                self.notify(Event::Finished);
            }
        }

        Ok(())
    }
}

impl<O: Output> Drop for Player<O> {
    fn drop(&mut self) {
        if let Some(mut resource) = self.resource.take() {
            resource.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use url::Url;

    use super::*;
    use crate::{catalog::MergePolicy, error::Error, error::ErrorKind};

    #[derive(Debug, Default)]
    struct Log {
        acquired: Vec<Url>,
        live: usize,
        max_live: usize,
        subscriptions: Vec<Subscription>,
        positions: Vec<Duration>,
        refuse_play: bool,
        refuse_acquire: bool,
    }

    #[derive(Clone, Default)]
    struct FakeOutput(Rc<RefCell<Log>>);

    struct FakeResource {
        log: Rc<RefCell<Log>>,
        released: bool,
    }

    impl Output for FakeOutput {
        type Resource = FakeResource;

        fn acquire(&mut self, url: &Url, subscription: Subscription) -> Result<FakeResource> {
            let mut log = self.0.borrow_mut();
            if log.refuse_acquire {
                return Err(Error::not_found("no such preview"));
            }

            log.acquired.push(url.clone());
            log.subscriptions.push(subscription);
            log.live += 1;
            log.max_live = log.max_live.max(log.live);

            Ok(FakeResource {
                log: Rc::clone(&self.0),
                released: false,
            })
        }
    }

    impl Resource for FakeResource {
        fn play(&mut self) -> Result<()> {
            if self.log.borrow().refuse_play {
                return Err(Error::permission_denied("autoplay blocked"));
            }
            Ok(())
        }

        fn pause(&mut self) {}

        fn set_current_time(&mut self, position: Duration) {
            self.log.borrow_mut().positions.push(position);
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.log.borrow_mut().live -= 1;
            }
        }
    }

    impl Drop for FakeResource {
        fn drop(&mut self) {
            self.release();
        }
    }

    fn catalog(generation: Generation, len: usize) -> Catalog {
        let tracks = (0..len)
            .map(|n| Track {
                id: TrackId::from(format!("t{n}")),
                title: format!("Title {n}"),
                artist: "Artist".to_owned(),
                album_art: format!("https://art.test/{n}.jpg").parse().unwrap(),
                preview_url: format!("https://audio.test/{n}.m4a").parse().unwrap(),
            })
            .collect();

        let mut catalog = Catalog::new(generation);
        catalog.merge(1, tracks, MergePolicy::DropDuplicates);
        catalog
    }

    fn last_subscription(output: &FakeOutput) -> Subscription {
        output.0.borrow().subscriptions.last().cloned().unwrap()
    }

    fn pump(player: &mut Player<FakeOutput>, catalog: &Catalog) {
        while let Some(event) = player.try_recv_resource_event() {
            player.handle_resource_event(catalog, event).unwrap();
        }
    }

    #[test]
    fn starts_idle() {
        let player = Player::new(FakeOutput::default());
        assert_eq!(player.status(), Status::Idle);
        assert_eq!(player.state(), PlaybackState::default());
    }

    #[test]
    fn play_at_acquires_preview() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 5);

        player.play_at(&catalog, 2).unwrap();

        let state = player.state();
        assert_eq!(state.index, Some(2));
        assert!(state.playing);
        assert_eq!(state.position, Duration::ZERO);
        assert_eq!(state.duration, Duration::ZERO);
        assert_eq!(
            output.0.borrow().acquired,
            [catalog.get(2).unwrap().preview_url.clone()]
        );
        assert_eq!(player.current_track(&catalog).unwrap().id.as_str(), "t2");
    }

    #[test]
    fn out_of_range_index_is_ignored() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 5);

        player.play_at(&catalog, 5).unwrap();
        assert_eq!(player.status(), Status::Idle);

        player.play_at(&catalog, 1).unwrap();
        player.play_at(&catalog, 99).unwrap();
        assert_eq!(player.state().index, Some(1));
        assert!(player.state().playing);
        assert_eq!(output.0.borrow().acquired.len(), 1);
    }

    #[test]
    fn only_one_resource_is_ever_live() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 5);

        player.play_at(&catalog, 0).unwrap();
        player.next(&catalog).unwrap();
        player.play_at(&catalog, 4).unwrap();
        player.prev(&catalog).unwrap();
        player.play_at(&catalog, 3).unwrap();

        let log = output.0.borrow();
        assert_eq!(log.acquired.len(), 5);
        assert_eq!(log.live, 1);
        assert_eq!(log.max_live, 1);
    }

    #[test]
    fn ended_advances_to_next_track() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 5);

        player.play_at(&catalog, 0).unwrap();
        last_subscription(&output).ended();
        pump(&mut player, &catalog);

        assert_eq!(player.status(), Status::Playing);
        assert_eq!(player.state().index, Some(1));
    }

    #[test]
    fn ended_at_last_track_pauses() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 5);

        player.play_at(&catalog, 4).unwrap();
        last_subscription(&output).ended();
        pump(&mut player, &catalog);

        let state = player.state();
        assert!(!state.playing);
        assert_eq!(state.index, Some(4));
        assert_eq!(player.status(), Status::Paused);
        assert_eq!(output.0.borrow().live, 1);
    }

    #[test]
    fn next_and_prev_stop_at_boundaries() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 3);

        player.play_at(&catalog, 2).unwrap();
        player.next(&catalog).unwrap();
        assert_eq!(player.state().index, Some(2));
        assert!(player.state().playing);

        player.play_at(&catalog, 0).unwrap();
        player.prev(&catalog).unwrap();
        assert_eq!(player.state().index, Some(0));
        assert!(player.state().playing);

        assert_eq!(output.0.borrow().acquired.len(), 2);
    }

    #[test]
    fn idle_transport_is_a_noop() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 3);

        player.toggle_play(&catalog).unwrap();
        player.seek(&catalog, 10.0);
        player.next(&catalog).unwrap();
        player.prev(&catalog).unwrap();

        assert_eq!(player.state(), PlaybackState::default());
        assert!(output.0.borrow().acquired.is_empty());
    }

    #[test]
    fn toggle_flips_playing_and_paused() {
        let mut player = Player::new(FakeOutput::default());
        let catalog = catalog(Generation::default(), 3);

        player.play_at(&catalog, 1).unwrap();
        player.toggle_play(&catalog).unwrap();
        assert_eq!(player.status(), Status::Paused);
        player.toggle_play(&catalog).unwrap();
        assert_eq!(player.status(), Status::Playing);
    }

    #[test]
    fn seek_is_clamped_to_duration() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 3);

        player.play_at(&catalog, 0).unwrap();
        last_subscription(&output).metadata_ready(Duration::from_secs(200));
        pump(&mut player, &catalog);
        assert_eq!(player.state().duration, Duration::from_secs(200));

        player.seek(&catalog, -5.0);
        assert_eq!(player.state().position, Duration::ZERO);

        player.seek(&catalog, 250.0);
        assert_eq!(player.state().position, Duration::from_secs(200));

        player.seek(&catalog, f64::NAN);
        assert_eq!(player.state().position, Duration::ZERO);

        assert_eq!(
            output.0.borrow().positions,
            [Duration::ZERO, Duration::from_secs(200), Duration::ZERO]
        );
    }

    #[test]
    fn time_updates_track_position() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 3);

        player.play_at(&catalog, 0).unwrap();
        last_subscription(&output).time_update(Duration::from_secs(12));
        pump(&mut player, &catalog);

        assert_eq!(player.state().position, Duration::from_secs(12));
    }

    #[test]
    fn released_resource_notifications_are_ignored() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 5);

        player.play_at(&catalog, 0).unwrap();
        let old = last_subscription(&output);
        player.play_at(&catalog, 3).unwrap();

        old.metadata_ready(Duration::from_secs(99));
        old.ended();
        pump(&mut player, &catalog);

        assert_eq!(player.state().index, Some(3));
        assert_eq!(player.state().duration, Duration::ZERO);
        assert!(player.state().playing);
    }

    #[test]
    fn blocked_start_leaves_player_paused() {
        let output = FakeOutput::default();
        output.0.borrow_mut().refuse_play = true;
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 3);

        let err = player.play_at(&catalog, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(player.status(), Status::Paused);
        assert_eq!(player.state().index, Some(1));

        let err = player.toggle_play(&catalog).unwrap_err();
        assert_eq!(err.kind, ErrorKind::PermissionDenied);
        assert_eq!(player.status(), Status::Paused);

        output.0.borrow_mut().refuse_play = false;
        player.toggle_play(&catalog).unwrap();
        assert_eq!(player.status(), Status::Playing);
    }

    #[test]
    fn failed_acquisition_leaves_player_idle() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let catalog = catalog(Generation::default(), 3);

        player.play_at(&catalog, 0).unwrap();
        output.0.borrow_mut().refuse_acquire = true;

        let err = player.play_at(&catalog, 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(player.status(), Status::Idle);
        assert_eq!(output.0.borrow().live, 0);
    }

    #[test]
    fn replaced_catalog_forces_idle() {
        let output = FakeOutput::default();
        let mut player = Player::new(output.clone());
        let old = catalog(Generation::default(), 5);
        let new = catalog(Generation::default().next(), 5);

        player.play_at(&old, 2).unwrap();
        let subscription = last_subscription(&output);
        assert!(player.current_track(&new).is_none());

        player.toggle_play(&new).unwrap();
        assert_eq!(player.status(), Status::Idle);
        assert_eq!(output.0.borrow().live, 0);

        // The old resource can no longer drive the player.
        subscription.ended();
        pump(&mut player, &new);
        assert_eq!(player.status(), Status::Idle);
    }

    #[test]
    fn select_resolves_ids_at_call_time() {
        let mut player = Player::new(FakeOutput::default());
        let catalog = catalog(Generation::default(), 4);

        player.select(&catalog, &TrackId::from("t3")).unwrap();
        assert_eq!(player.state().index, Some(3));

        player.select(&catalog, &TrackId::from("missing")).unwrap();
        assert_eq!(player.state().index, Some(3));
    }

    #[test]
    fn events_follow_transport() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut player = Player::new(FakeOutput::default());
        player.register(event_tx);
        let catalog = catalog(Generation::default(), 2);

        player.play_at(&catalog, 0).unwrap();
        player.toggle_play(&catalog).unwrap();
        player.stop();

        let events: Vec<_> = std::iter::from_fn(|| event_rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            [
                Event::TrackChanged(0),
                Event::Play,
                Event::Pause,
                Event::Stopped
            ]
        );
    }
}
