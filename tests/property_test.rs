//! Property-based tests for catalog merging and stale response handling.

use std::collections::HashSet;

use proptest::prelude::*;
use tunescroll::{
    catalog::{Catalog, MergePolicy},
    config::Config,
    pagination::{Completion, Fetcher},
    track::{Track, TrackId},
};

fn track(id: &str) -> Track {
    Track {
        id: TrackId::from(id),
        title: format!("Title {id}"),
        artist: "Artist".to_owned(),
        album_art: format!("https://art.test/{id}.jpg").parse().unwrap(),
        preview_url: format!("https://audio.test/{id}.m4a").parse().unwrap(),
    }
}

/// Pages of identifiers drawn from a small alphabet so that collisions are
/// common, both across and within pages.
fn arbitrary_pages() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(prop::collection::vec("[a-f]{1,2}", 0..25), 1..8)
}

proptest! {
    /// Property: dropping duplicates keeps the first occurrence of every id,
    /// in arrival order
    #[test]
    fn drop_duplicates_keeps_first_occurrences(pages in arbitrary_pages()) {
        let mut catalog = Catalog::default();
        for (n, page) in pages.iter().enumerate() {
            let page_number = u32::try_from(n + 1).unwrap();
            catalog.merge(page_number, page.iter().map(|id| track(id)).collect(), MergePolicy::DropDuplicates);
        }

        let mut seen = HashSet::new();
        let expected: Vec<&str> = pages
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect();
        let actual: Vec<&str> = catalog.iter().map(|t| t.id.as_str()).collect();

        prop_assert_eq!(actual, expected);
    }

    /// Property: rekeying keeps every track and never produces a collision
    #[test]
    fn rekey_keeps_everything_unique(pages in arbitrary_pages()) {
        let mut catalog = Catalog::default();
        let mut total = 0;
        for (n, page) in pages.iter().enumerate() {
            let page_number = u32::try_from(n + 1).unwrap();
            total += page.len();
            let merge = catalog.merge(page_number, page.iter().map(|id| track(id)).collect(), MergePolicy::Rekey);
            prop_assert_eq!(merge.added, page.len());
            prop_assert_eq!(merge.dropped, 0);
        }

        prop_assert_eq!(catalog.len(), total);
        let ids: HashSet<_> = catalog.iter().map(|t| t.id.clone()).collect();
        prop_assert_eq!(ids.len(), total);

        // Titles are untouched, so the order of arrival is preserved.
        let titles: Vec<String> = catalog.iter().map(|t| t.title.clone()).collect();
        let expected: Vec<String> = pages.iter().flatten().map(|id| format!("Title {id}")).collect();
        prop_assert_eq!(titles, expected);
    }

    /// Property: responses for superseded queries never change the catalog
    #[test]
    fn superseded_responses_are_inert(
        stale_ids in prop::collection::vec("[a-z]{3}", 0..30),
        switches in 1usize..5,
    ) {
        let mut fetcher = Fetcher::new(&Config::default());

        let mut stale = Vec::new();
        for n in 0..switches {
            stale.push(fetcher.set_query(format!("query {n}")).unwrap());
        }
        let current = fetcher.set_query("current").unwrap();
        fetcher.complete(current.complete(Ok(vec![track("keep")]))).unwrap();

        let catalog: Vec<Track> = fetcher.catalog().tracks().to_vec();
        let state = fetcher.page_state();

        for request in stale.into_iter().rev() {
            let tracks = stale_ids.iter().map(|id| track(id)).collect();
            let completion = fetcher.complete(request.complete(Ok(tracks))).unwrap();
            prop_assert_eq!(completion, Completion::Stale);
        }

        prop_assert_eq!(fetcher.catalog().tracks(), catalog.as_slice());
        prop_assert_eq!(fetcher.page_state(), state);
    }
}
