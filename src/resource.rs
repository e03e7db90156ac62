//! Playable resources and their notification stream.
//!
//! Playing a track means acquiring an opaque [`Resource`] for its preview
//! URL from an [`Output`]. The resource reports progress asynchronously
//! through the [`Subscription`] it was handed on acquisition:
//!
//! * `metadata_ready(duration)` once the length is known
//! * `time_update(position)` while playing
//! * `ended()` when playback reached the end
//!
//! Every acquisition gets a fresh [`Ticket`]. Notifications carry the ticket
//! of the subscription that produced them, so the player can ignore
//! anything still in flight from a resource it already released.

use std::{fmt, time::Duration};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinHandle,
};
use url::Url;

use crate::error::{Error, Result};

/// Identifies one resource subscription.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    #[must_use]
    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Notification {
    MetadataReady(Duration),
    TimeUpdate(Duration),
    Ended,
}

/// A notification tagged with the subscription it came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceEvent {
    pub ticket: Ticket,
    pub notification: Notification,
}

/// Notifier handed to a resource on acquisition.
#[derive(Clone, Debug)]
pub struct Subscription {
    ticket: Ticket,
    event_tx: UnboundedSender<ResourceEvent>,
}

impl Subscription {
    #[must_use]
    pub fn new(ticket: Ticket, event_tx: UnboundedSender<ResourceEvent>) -> Self {
        Self { ticket, event_tx }
    }

    #[must_use]
    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    pub fn metadata_ready(&self, duration: Duration) {
        self.send(Notification::MetadataReady(duration));
    }

    pub fn time_update(&self, position: Duration) {
        self.send(Notification::TimeUpdate(position));
    }

    pub fn ended(&self) {
        self.send(Notification::Ended);
    }

    fn send(&self, notification: Notification) {
        // The receiver only goes away when the player is dropped.
        let _ = self.event_tx.send(ResourceEvent {
            ticket: self.ticket,
            notification,
        });
    }
}

/// An active, controllable playback unit for one track.
pub trait Resource {
    /// Starts or resumes playback.
    ///
    /// # Errors
    ///
    /// Returns an error when the environment refuses to start playback.
    fn play(&mut self) -> Result<()>;

    /// Suspends playback, keeping the position.
    fn pause(&mut self);

    fn set_current_time(&mut self, position: Duration);

    /// Stops playback and detaches the subscription.
    ///
    /// Must be safe to call more than once.
    fn release(&mut self);
}

/// Source of playable resources.
pub trait Output {
    type Resource: Resource;

    /// Acquires a resource for `url` that reports through `subscription`.
    ///
    /// # Errors
    ///
    /// Returns an error when no resource can be created for `url`.
    fn acquire(&mut self, url: &Url, subscription: Subscription) -> Result<Self::Resource>;
}

/// Output that plays silence on a timer.
///
/// Every resource reports a fixed length and ticks its position while
/// playing. Nothing is downloaded or decoded, which makes it suitable for
/// dry runs of the queue logic. Requires a Tokio runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ClockOutput {
    length: Duration,
    tick: Duration,
}

impl ClockOutput {
    pub const DEFAULT_TICK: Duration = Duration::from_millis(250);

    #[must_use]
    pub fn new(length: Duration) -> Self {
        Self {
            length,
            tick: Self::DEFAULT_TICK,
        }
    }

    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

impl Output for ClockOutput {
    type Resource = ClockResource;

    fn acquire(&mut self, url: &Url, subscription: Subscription) -> Result<Self::Resource> {
        if self.tick.is_zero() {
            return Err(Error::invalid_argument("clock tick must be positive"));
        }

        debug!(
            "clock resource {} for {url} ({:.1}s)",
            subscription.ticket(),
            self.length.as_secs_f32()
        );

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_clock(self.length, self.tick, subscription, control_rx));

        Ok(ClockResource {
            control_tx,
            task: Some(task),
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum Control {
    Play,
    Pause,
    Seek(Duration),
}

#[derive(Debug)]
pub struct ClockResource {
    control_tx: UnboundedSender<Control>,
    task: Option<JoinHandle<()>>,
}

impl ClockResource {
    fn control(&self, control: Control) -> Result<()> {
        if self.task.is_none() {
            return Err(Error::failed_precondition("clock resource was released"));
        }

        self.control_tx
            .send(control)
            .map_err(|_| Error::failed_precondition("clock task has stopped"))
    }
}

impl Resource for ClockResource {
    fn play(&mut self) -> Result<()> {
        self.control(Control::Play)
    }

    fn pause(&mut self) {
        let _ = self.control(Control::Pause);
    }

    fn set_current_time(&mut self, position: Duration) {
        let _ = self.control(Control::Seek(position));
    }

    fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ClockResource {
    fn drop(&mut self) {
        self.release();
    }
}

async fn run_clock(
    length: Duration,
    tick: Duration,
    subscription: Subscription,
    mut control_rx: UnboundedReceiver<Control>,
) {
    subscription.metadata_ready(length);

    let mut position = Duration::ZERO;
    let mut playing = false;
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            control = control_rx.recv() => match control {
                Some(Control::Play) => {
                    if position >= length {
                        position = Duration::ZERO;
                    }
                    playing = true;
                    interval.reset();
                }
                Some(Control::Pause) => playing = false,
                Some(Control::Seek(to)) => {
                    position = to.min(length);
                    subscription.time_update(position);
                }
                None => break,
            },

            _ = interval.tick(), if playing => {
                position = (position + tick).min(length);
                subscription.time_update(position);

                if position >= length {
                    playing = false;
                    subscription.ended();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        "https://audio.test/1.m4a".parse().unwrap()
    }

    async fn next(event_rx: &mut UnboundedReceiver<ResourceEvent>) -> Notification {
        event_rx.recv().await.unwrap().notification
    }

    #[tokio::test(start_paused = true)]
    async fn clock_reports_length_progress_and_end() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut output = ClockOutput::new(Duration::from_secs(1)).with_tick(Duration::from_millis(500));
        let mut resource = output
            .acquire(&url(), Subscription::new(Ticket(7), event_tx))
            .unwrap();

        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.ticket, Ticket(7));
        assert_eq!(event.notification, Notification::MetadataReady(Duration::from_secs(1)));

        resource.play().unwrap();
        assert_eq!(next(&mut event_rx).await, Notification::TimeUpdate(Duration::from_millis(500)));
        assert_eq!(next(&mut event_rx).await, Notification::TimeUpdate(Duration::from_secs(1)));
        assert_eq!(next(&mut event_rx).await, Notification::Ended);

        resource.release();
    }

    #[tokio::test(start_paused = true)]
    async fn clock_seeks_within_bounds() {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let mut output = ClockOutput::new(Duration::from_secs(30));
        let mut resource = output
            .acquire(&url(), Subscription::new(Ticket::default(), event_tx))
            .unwrap();
        next(&mut event_rx).await;

        resource.set_current_time(Duration::from_secs(90));
        assert_eq!(next(&mut event_rx).await, Notification::TimeUpdate(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn released_clock_refuses_to_play() {
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let mut output = ClockOutput::new(Duration::from_secs(30));
        let mut resource = output
            .acquire(&url(), Subscription::new(Ticket::default(), event_tx))
            .unwrap();

        resource.release();
        resource.release();

        assert!(resource.play().is_err());
    }
}
