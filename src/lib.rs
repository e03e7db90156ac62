//! Browse paginated track search results and play their previews in order.
//!
//! The crate is built around two state machines that do no I/O themselves:
//!
//! * [`pagination::Fetcher`] turns an effective query into page requests and
//!   merges their responses into a [`catalog::Catalog`], discarding
//!   responses that belong to a superseded query
//! * [`player::Player`] walks the catalog one track at a time, owning at
//!   most one playable [`resource::Resource`]
//!
//! [`controller::Controller`] drives both from a single task, performing
//! the page fetches through a [`search::Search`] backend and feeding
//! resource notifications back into the player.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod http;
pub mod pagination;
pub mod player;
pub mod query;
pub mod resource;
pub mod search;
pub mod track;
