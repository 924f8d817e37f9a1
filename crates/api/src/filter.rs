//! Presentation-side credential filtering.
//!
//! Applied after the company-scoped fetch. This is display convenience,
//! not an authorization boundary: scoping to a tenant happens in the store
//! query, never here.

use entity::credential;

/// Case-insensitive substring match over name or login.
pub fn matches_search(name: &str, login: &str, term: &str) -> bool {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    name.to_lowercase().contains(&needle) || login.to_lowercase().contains(&needle)
}

/// Narrow `credentials` by an optional search term and kind. Idempotent.
pub fn apply(
    credentials: Vec<credential::Model>,
    term: Option<&str>,
    kind: Option<credential::Kind>,
) -> Vec<credential::Model> {
    credentials
        .into_iter()
        .filter(|c| kind.map_or(true, |k| c.kind == k))
        .filter(|c| term.map_or(true, |t| matches_search(&c.name, &c.login, t)))
        .collect()
}
