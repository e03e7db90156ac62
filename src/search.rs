//! Search backend collaborator.
//!
//! The fetcher only needs one operation from its environment: fetch one
//! page of results for a query. [`HttpSearch`] implements it against the
//! JSON search endpoint:
//!
//! ```text
//! GET <base_url>/search?q=<urlencoded query>&page=<n>
//! ```
//!
//! The response is a JSON array of [`Track`] records. `[]`, or an array
//! shorter than the page size, signals the end of the results.

use futures_util::{future::BoxFuture, FutureExt};
use reqwest::Url;

use crate::{config::Config, error::Result, http, track::Track};

/// Fetches pages of search results.
pub trait Search {
    /// Fetches page `page` (starting at 1) of the results for `query`.
    ///
    /// The future must not borrow from `self`: it may still be pending when
    /// the query changes, in which case its output is discarded.
    fn fetch_page(&self, query: String, page: u32) -> BoxFuture<'static, Result<Vec<Track>>>;
}

pub struct HttpSearch {
    client: http::Client,
    endpoint: Url,
}

impl HttpSearch {
    const SEARCH_PATH: &'static str = "search";

    /// Creates a search backend for the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the search
    /// endpoint cannot be derived from the base URL.
    pub fn new(config: &Config) -> Result<Self> {
        let client = http::Client::new(config)?;

        // `join` replaces the last segment unless the path ends in a slash.
        let mut base_url = config.base_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let endpoint = base_url.join(Self::SEARCH_PATH)?;
        debug!("search endpoint: {endpoint}");

        Ok(Self { client, endpoint })
    }

    fn url(&self, query: &str, page: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("page", &page.to_string());
        url
    }
}

impl Search for HttpSearch {
    fn fetch_page(&self, query: String, page: u32) -> BoxFuture<'static, Result<Vec<Track>>> {
        let url = self.url(&query, page);
        trace!("GET {url}");

        let response = self.client.execute(self.client.get(url));
        async move {
            let response = response.await?.error_for_status()?;
            let tracks = response.json::<Vec<Track>>().await?;
            Ok(tracks)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_encodes_query_and_page() {
        let config = Config {
            base_url: "https://music.test/api/".parse().unwrap(),
            ..Config::default()
        };
        let search = HttpSearch::new(&config).unwrap();

        let url = search.url("miles & coltrane", 3);
        assert_eq!(
            url.as_str(),
            "https://music.test/api/search?q=miles+%26+coltrane&page=3"
        );
    }

    #[test]
    fn base_url_path_is_kept_without_trailing_slash() {
        for base_url in ["https://music.test/api", "https://music.test/api/"] {
            let config = Config {
                base_url: base_url.parse().unwrap(),
                ..Config::default()
            };
            assert!(config.validate().is_ok());

            let search = HttpSearch::new(&config).unwrap();
            assert_eq!(
                search.url("jazz", 1).as_str(),
                "https://music.test/api/search?q=jazz&page=1"
            );
        }

        let config = Config {
            base_url: "https://music.test".parse().unwrap(),
            ..Config::default()
        };
        let search = HttpSearch::new(&config).unwrap();
        assert_eq!(
            search.url("jazz", 1).as_str(),
            "https://music.test/search?q=jazz&page=1"
        );
    }
}
