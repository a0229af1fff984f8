//! Connection strings of the form `scm:<provider>:<url>`.
//!
//! The delimiter after the provider may also be `|`, which lets URLs that
//! contain colons be written without ambiguity (`scm:svn|svn://host/repo`).

const PREFIX: &str = "scm:";

fn split(connection: &str) -> Option<(&str, &str)> {
    let rest = connection.trim().strip_prefix(PREFIX)?;
    let at = rest.find(&[':', '|'][..])?;
    let (name, remainder) = rest.split_at(at);
    if name.is_empty() {
        return None;
    }
    Some((name, &remainder[1..]))
}

/// Provider name of a connection string, e.g. `git` for
/// `scm:git:https://example.org/repo.git`.
pub fn provider_name(connection: &str) -> Option<String> {
    split(connection).map(|(name, _)| name.to_string())
}

/// The provider-specific URL that follows the provider name.
pub fn provider_url(connection: &str) -> Option<String> {
    split(connection)
        .map(|(_, url)| url.to_string())
        .filter(|url| !url.is_empty())
}
