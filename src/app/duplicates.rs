use anyhow::Result;
use url::Url;

use crate::app::error::{FieldErrorCode, ValidationErrors};
use crate::domain::link::LinkKind;
use crate::infra::store::StoreTx;

/// Comparison key for a url: no scheme, no leading `www.`, lowercased host,
/// always ending in `/`.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_scheme = match trimmed.find("://") {
        Some(index) => &trimmed[index + 3..],
        None => trimmed,
    };

    let (host, rest) = match without_scheme.find('/') {
        Some(index) => without_scheme.split_at(index),
        None => (without_scheme, ""),
    };
    let host = host.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut key = format!("{}{}", host, rest);
    if !key.ends_with('/') {
        key.push('/');
    }
    key
}

/// Parses a user-supplied website or group url. Only absolute http(s) urls
/// with a host are accepted.
pub fn parse_http_url(raw: &str) -> Result<Url, ValidationErrors> {
    let invalid = || ValidationErrors::single("url", FieldErrorCode::InvalidUrl, "Enter a valid URL.");
    let parsed = Url::parse(raw.trim()).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid());
    }
    match parsed.host_str() {
        Some(host) if host.contains('.') => Ok(parsed),
        _ => Err(invalid()),
    }
}

/// True when another record of `kind` (outside `own_ids`) already points at
/// the same normalized url. Draft and published rows both count.
pub async fn is_duplicate(
    tx: &mut dyn StoreTx,
    kind: LinkKind,
    candidate_url: &str,
    own_ids: &[i64],
) -> Result<bool> {
    let key = normalize_url(candidate_url);
    let matches = tx.find_by_url_key(kind, &key).await?;
    Ok(matches.iter().any(|id| !own_ids.contains(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_and_www_do_not_matter() {
        let expected = "example.com/";
        for raw in [
            "http://example.com",
            "https://example.com/",
            "https://www.example.com",
            "HTTPS://WWW.Example.COM/",
            "example.com",
        ] {
            assert_eq!(normalize_url(raw), expected, "{}", raw);
        }
    }

    #[test]
    fn keys_compare_whole_not_by_suffix() {
        let key = normalize_url("https://example.com");
        assert_ne!(normalize_url("https://notexample.com"), key);
        assert!(normalize_url("https://notexample.com").ends_with(&key));
    }

    #[test]
    fn path_case_is_kept() {
        assert_eq!(normalize_url("https://t.me/NewsChannel/"), "t.me/NewsChannel/");
        assert_eq!(normalize_url("https://instagram.com/nasa"), "instagram.com/nasa/");
    }

    #[test]
    fn only_a_leading_www_is_stripped() {
        assert_eq!(normalize_url("https://awww.example.com/"), "awww.example.com/");
    }

    #[test]
    fn accepts_http_urls_with_a_domain() {
        let parsed = parse_http_url(" https://www.example.com/about ").unwrap();
        assert_eq!(parsed.host_str(), Some("www.example.com"));
    }

    #[test]
    fn rejects_other_schemes_and_bare_hosts() {
        for raw in ["ftp://example.com", "not a url", "http://localhost/", "mailto:a@b.c"] {
            let errors = parse_http_url(raw).unwrap_err();
            assert!(errors.has("url", FieldErrorCode::InvalidUrl), "{}", raw);
        }
    }
}
