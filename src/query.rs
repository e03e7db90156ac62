//! Effective query resolution.
//!
//! What the catalog is built from depends on two inputs: free-text search
//! typed by the user and a stored [`Preference`] such as a genre or mood
//! picked during onboarding. Non-blank search text always wins.
//!
//! The preference is passed in by value. Where it is stored and how it is
//! chosen is up to the front end.

use std::fmt;

use serde::Deserialize;

/// A named, stored query.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Deserialize)]
pub struct Preference {
    /// Label shown to the user, e.g. `Jazz`.
    pub name: String,

    /// Query sent to the search backend, e.g. `jazz standards`.
    pub query: String,
}

impl Preference {
    #[must_use]
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            query: query.into(),
        }
    }
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.query)
    }
}

/// Resolves the query to search for.
///
/// Returns the trimmed search text when it is not blank, otherwise the
/// trimmed query of the preference. Returns `None` when neither yields
/// anything to search for.
#[must_use]
pub fn effective(search: Option<&str>, preference: Option<&Preference>) -> Option<String> {
    [search, preference.map(|p| p.query.as_str())]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|query| !query.is_empty())
        .map(ToOwned::to_owned)
}
