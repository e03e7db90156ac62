//! Ordered collection of tracks discovered for one query generation.
//!
//! The catalog is append-only while its generation is current and is
//! replaced wholesale when the query changes. Every entry has a unique
//! identifier; how colliding identifiers from later pages are handled is
//! decided by the [`MergePolicy`].

use std::collections::HashSet;

use serde::Deserialize;

use crate::{
    pagination::Generation,
    track::{Track, TrackId},
};

/// How to merge a page whose identifiers collide with known tracks.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// Drop incoming tracks whose identifier is already present.
    #[default]
    DropDuplicates,

    /// Keep colliding tracks under a synthetic identifier scoped to the
    /// page they arrived on.
    Rekey,
}

/// Result of merging one page into the catalog.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Merge {
    /// Tracks appended to the catalog.
    pub added: usize,

    /// Tracks dropped because of an identifier collision.
    pub dropped: usize,

    /// Tracks appended under a synthetic identifier.
    pub rekeyed: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Catalog {
    generation: Generation,
    tracks: Vec<Track>,
    ids: HashSet<TrackId>,
}

impl Catalog {
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            generation,
            tracks: Vec::new(),
            ids: HashSet::new(),
        }
    }

    /// The query generation this catalog was built for.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Resolves an identifier to its current position.
    ///
    /// Synthetic identifiers depend on the page a track arrived on, so
    /// callers must resolve at the time of use instead of caching indices.
    #[must_use]
    pub fn position(&self, id: &TrackId) -> Option<usize> {
        if !self.ids.contains(id) {
            return None;
        }

        self.tracks.iter().position(|track| &track.id == id)
    }

    /// Appends a page of tracks in response order.
    ///
    /// Collisions are checked against the catalog as well as against
    /// tracks earlier in the same page.
    pub fn merge(&mut self, page: u32, tracks: Vec<Track>, policy: MergePolicy) -> Merge {
        let mut merge = Merge::default();

        for mut track in tracks {
            if self.ids.contains(&track.id) {
                match policy {
                    MergePolicy::DropDuplicates => {
                        trace!("dropping duplicate track {} from page {page}", track.id);
                        merge.dropped += 1;
                        continue;
                    }
                    MergePolicy::Rekey => {
                        let id = self.synthetic_id(&track.id, page);
                        trace!("re-keying duplicate track {} to {id}", track.id);
                        track.id = id;
                        merge.rekeyed += 1;
                    }
                }
            }

            self.ids.insert(track.id.clone());
            self.tracks.push(track);
            merge.added += 1;
        }

        merge
    }

    fn synthetic_id(&self, id: &TrackId, page: u32) -> TrackId {
        let base = format!("{id}~p{page}");
        let mut candidate = TrackId::from(base.as_str());

        let mut suffix = 1_usize;
        while self.ids.contains(&candidate) {
            suffix += 1;
            candidate = TrackId::from(format!("{base}.{suffix}"));
        }

        candidate
    }
}
