/// Normalizes a homeserver base URL: strips query and fragment, trailing
/// slashes, and any trailing well-known discovery suffix (`/_matrix/static`,
/// `/_matrix/client`, or `/_matrix/client/vN`). Whatever base path remains is
/// preserved and endpoint paths are joined after it.
pub fn normalize_homeserver_url(raw: &str) -> String {
    let mut url = raw.trim();
    if let Some(idx) = url.find('#') {
        url = &url[..idx];
    }
    if let Some(idx) = url.find('?') {
        url = &url[..idx];
    }
    let mut url = url.trim_end_matches('/').to_string();

    if let Some(stripped) = strip_well_known_suffix(&url) {
        url = stripped;
    }
    url.trim_end_matches('/').to_string()
}

fn strip_well_known_suffix(url: &str) -> Option<String> {
    if let Some(idx) = url.rfind("/_matrix/client/v") {
        let rest = &url[idx + "/_matrix/client/v".len()..];
        if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
            return Some(url[..idx].to_string());
        }
    }
    for suffix in ["/_matrix/client", "/_matrix/static"] {
        if let Some(prefix) = url.strip_suffix(suffix) {
            return Some(prefix.to_string());
        }
    }
    None
}

/// Extracts the authority host from a normalized base URL, used as the `via`
/// server on hierarchy state events. Falls back to the domain part of the
/// bot's user ID when the URL has no recognizable host.
pub fn server_name_from_url_or_user(base_url: &str, user_id: &str) -> String {
    let after_scheme = base_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(base_url);
    let host = after_scheme.split('/').next().unwrap_or("");
    if !host.is_empty() {
        return host.to_string();
    }
    user_id
        .split_once(':')
        .map(|(_, server)| server.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_query_and_fragment() {
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org/"),
            "https://matrix.example.org"
        );
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org/?ref=docs#section"),
            "https://matrix.example.org"
        );
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org///"),
            "https://matrix.example.org"
        );
    }

    #[test]
    fn strips_well_known_suffixes() {
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org/_matrix/static/"),
            "https://matrix.example.org"
        );
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org/_matrix/client"),
            "https://matrix.example.org"
        );
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org/_matrix/client/v3"),
            "https://matrix.example.org"
        );
        assert_eq!(
            normalize_homeserver_url("https://matrix.example.org/_matrix/client/v11"),
            "https://matrix.example.org"
        );
    }

    #[test]
    fn preserves_a_residual_base_path() {
        assert_eq!(
            normalize_homeserver_url("https://example.org/matrix/_matrix/client/v3"),
            "https://example.org/matrix"
        );
        assert_eq!(
            normalize_homeserver_url("https://example.org/matrix/"),
            "https://example.org/matrix"
        );
    }

    #[test]
    fn leaves_non_version_paths_alone() {
        assert_eq!(
            normalize_homeserver_url("https://example.org/_matrix/client/versions"),
            "https://example.org/_matrix/client/versions"
        );
    }

    #[test]
    fn via_server_prefers_the_homeserver_host() {
        assert_eq!(
            server_name_from_url_or_user("https://matrix.example.org", "@bot:example.org"),
            "matrix.example.org"
        );
        assert_eq!(
            server_name_from_url_or_user("https://matrix.example.org:8448", "@bot:example.org"),
            "matrix.example.org:8448"
        );
    }

    #[test]
    fn via_server_falls_back_to_the_user_id_suffix() {
        assert_eq!(
            server_name_from_url_or_user("", "@bot:example.org"),
            "example.org"
        );
    }
}
