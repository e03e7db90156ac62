//! Runtime configuration.
//!
//! Defaults are usable as-is against a backend on `localhost`. A TOML file
//! can override any of the user-facing settings:
//!
//! ```toml
//! base_url = "https://music.example.com/api/"
//! page_size = 20
//! max_pages = 10
//! merge_policy = "drop-duplicates" # or "rekey"
//! preview_secs = 30
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use url::Url;

use crate::{
    catalog::MergePolicy,
    error::{Error, Result},
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    #[serde(skip)]
    pub app_name: String,
    #[serde(skip)]
    pub user_agent: String,

    /// Base URL of the search backend; `search` is resolved against it.
    pub base_url: Url,

    /// Expected length of a full page. A shorter page ends pagination.
    pub page_size: usize,

    /// Hard cap on the number of pages fetched per query.
    pub max_pages: u32,

    pub merge_policy: MergePolicy,

    /// Length reported by the silent clock output, in seconds.
    pub preview_secs: u64,
}

impl Config {
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8080/";
    pub const DEFAULT_PAGE_SIZE: usize = 20;
    pub const DEFAULT_MAX_PAGES: u32 = 10;
    pub const DEFAULT_PREVIEW_SECS: u64 = 30;

    /// Loads the configuration from a TOML file, falling back to defaults
    /// for anything the file leaves out.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// contains invalid values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that the fetcher relies on.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the page size or page limit is zero,
    /// or when the base URL cannot carry a path.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::invalid_argument("page size must be positive"));
        }

        if self.max_pages == 0 {
            return Err(Error::invalid_argument("page limit must be positive"));
        }

        if self.base_url.cannot_be_a_base() {
            return Err(Error::invalid_argument(format!(
                "base url {} cannot be a base",
                self.base_url
            )));
        }

        Ok(())
    }

    #[must_use]
    pub fn preview_length(&self) -> Duration {
        Duration::from_secs(self.preview_secs)
    }

    fn user_agent(app_name: &str, app_version: &str) -> String {
        let os_name = match std::env::consts::OS {
            "macos" => "osx",
            other => other,
        };
        let os_version = sysinfo::System::os_version().unwrap_or_else(|| String::from("0"));

        // `/` and `;` would break the product token layout.
        let illegal_chars = |chr: char| chr == '/' || chr == ';';
        let os_version = os_version.replace(illegal_chars, "-");

        format!("{app_name}/{app_version} (Rust; {os_name}/{os_version})")
    }
}

impl Default for Config {
    fn default() -> Self {
        let app_name = env!("CARGO_PKG_NAME").to_owned();
        let app_version = env!("CARGO_PKG_VERSION").to_owned();
        let user_agent = Self::user_agent(&app_name, &app_version);
        trace!("user agent: {user_agent}");

        let base_url = Url::parse(Self::DEFAULT_BASE_URL).expect("invalid default base url");

        Self {
            app_name,
            user_agent,

            base_url,
            page_size: Self::DEFAULT_PAGE_SIZE,
            max_pages: Self::DEFAULT_MAX_PAGES,
            merge_policy: MergePolicy::default(),
            preview_secs: Self::DEFAULT_PREVIEW_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.page_size, 20);
        assert_eq!(config.merge_policy, MergePolicy::DropDuplicates);
        assert!(config.user_agent.starts_with("tunescroll/"));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
            base_url = "https://music.test/api/"
            page_size = 50
            merge_policy = "rekey"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url.as_str(), "https://music.test/api/");
        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_pages, Config::DEFAULT_MAX_PAGES);
        assert_eq!(config.merge_policy, MergePolicy::Rekey);
        assert_eq!(config.app_name, "tunescroll");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("pagesize = 5").is_err());
    }

    #[test]
    fn zero_page_size_is_invalid() {
        let config = Config {
            page_size: 0,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidArgument);
    }
}
