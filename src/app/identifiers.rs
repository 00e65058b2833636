//! Per-platform rules for channel and page identifiers, and the canonical
//! URL each identifier maps to.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::app::error::{FieldErrorCode, ValidationErrors};
use crate::domain::link::{Application, LinkKind};

const TELEGRAM_LINK: &str = "https://t.me/";
const SOROUSH_LINK: &str = "https://sapp.ir/";
const GAP_LINK: &str = "https://gap.im/";
const IGAP_LINK: &str = "https://profile.igap.net/";
const EITAA_LINK: &str = "https://eitaa.com/";
const INSTAGRAM_LINK: &str = "https://instagram.com/";

static LETTER_LED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*[A-Za-z0-9]$").expect("valid regex"));
static WORD_AND_DOTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("valid regex"));
static ALNUM_LED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_]*[A-Za-z0-9]$").expect("valid regex"));
static INSTAGRAM_PAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_](?:[A-Za-z0-9_.]{0,28}[A-Za-z0-9_])?$").expect("valid regex")
});

const INVALID_NAME: &str = "This name is invalid.";
const SHORT_NAME: &str = "This name is too short.";
const UNSUPPORTED_APPLICATION: &str = "This application is not registered in the system.";

struct ChannelRule {
    pattern: &'static Lazy<Regex>,
    min_len: usize,
}

fn channel_rule(application: Application) -> Option<ChannelRule> {
    let (pattern, min_len) = match application {
        Application::Telegram => (&LETTER_LED, 5),
        Application::Soroush => (&WORD_AND_DOTS, 6),
        Application::Gap => (&LETTER_LED, 6),
        Application::Igap => (&LETTER_LED, 5),
        Application::Eitaa => (&ALNUM_LED, 4),
        Application::Whatsapp => return None,
    };
    Some(ChannelRule { pattern, min_len })
}

/// Strips surrounding whitespace and a leading `@`.
pub fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed).to_string()
}

/// Checks an already-normalized identifier. Errors are scoped to the kind's
/// identifier field; a name can be both malformed and too short.
pub fn validate_identifier(
    kind: LinkKind,
    identifier: &str,
    application: Option<Application>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    match kind {
        LinkKind::Website | LinkKind::Group => {}
        LinkKind::Channel => {
            let rule = application.and_then(channel_rule);
            match rule {
                Some(rule) => {
                    if !rule.pattern.is_match(identifier) {
                        errors.add("channel_id", FieldErrorCode::InvalidIdentifier, INVALID_NAME);
                    }
                    if identifier.chars().count() < rule.min_len {
                        errors.add("channel_id", FieldErrorCode::IdentifierTooShort, SHORT_NAME);
                    }
                }
                None => errors.add(
                    "application",
                    FieldErrorCode::UnsupportedApplication,
                    UNSUPPORTED_APPLICATION,
                ),
            }
        }
        LinkKind::Instagram => {
            if !INSTAGRAM_PAGE.is_match(identifier) || identifier.contains("..") {
                errors.add(
                    "page_id",
                    FieldErrorCode::InvalidIdentifier,
                    "Instagram id is incorrect.",
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Canonical, trailing-slash terminated URL of a channel or Instagram page.
pub fn build_url(
    kind: LinkKind,
    identifier: &str,
    application: Option<Application>,
) -> Result<String, ValidationErrors> {
    let base = match (kind, application) {
        (LinkKind::Instagram, _) => INSTAGRAM_LINK,
        (LinkKind::Channel, Some(Application::Telegram)) => TELEGRAM_LINK,
        (LinkKind::Channel, Some(Application::Soroush)) => SOROUSH_LINK,
        (LinkKind::Channel, Some(Application::Gap)) => GAP_LINK,
        (LinkKind::Channel, Some(Application::Igap)) => IGAP_LINK,
        (LinkKind::Channel, Some(Application::Eitaa)) => EITAA_LINK,
        _ => {
            return Err(ValidationErrors::single(
                "application",
                FieldErrorCode::UnsupportedApplication,
                UNSUPPORTED_APPLICATION,
            ))
        }
    };
    Ok(format!("{}{}/", base, identifier))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(identifier: &str, application: Application) -> Result<(), ValidationErrors> {
        validate_identifier(LinkKind::Channel, identifier, Some(application))
    }

    #[test]
    fn strips_at_sign_and_whitespace() {
        assert_eq!(normalize_identifier(" @newschannel "), "newschannel");
        assert_eq!(normalize_identifier("plain"), "plain");
    }

    #[test]
    fn telegram_accepts_letter_led_names() {
        assert!(channel("newschannel", Application::Telegram).is_ok());
        assert!(channel("news_24", Application::Telegram).is_ok());
    }

    #[test]
    fn telegram_rejects_bad_shapes() {
        for bad in ["1news", "news_", "news-room", "نیوز"] {
            let errors = channel(bad, Application::Telegram).unwrap_err();
            assert!(
                errors.has("channel_id", FieldErrorCode::InvalidIdentifier),
                "{} should be invalid",
                bad
            );
        }
    }

    #[test]
    fn minimum_lengths_per_application() {
        let cases = [
            (Application::Telegram, "abcd", "abcde"),
            (Application::Soroush, "abcde", "abcdef"),
            (Application::Gap, "abcde", "abcdef"),
            (Application::Igap, "abcd", "abcde"),
            (Application::Eitaa, "abc", "abcd"),
        ];
        for (application, short, long_enough) in cases {
            let errors = channel(short, application).unwrap_err();
            assert!(errors.has("channel_id", FieldErrorCode::IdentifierTooShort));
            assert!(!errors.has("channel_id", FieldErrorCode::InvalidIdentifier));
            assert!(channel(long_enough, application).is_ok());
        }
    }

    #[test]
    fn short_and_malformed_reports_both() {
        let errors = channel("a", Application::Telegram).unwrap_err();
        assert!(errors.has("channel_id", FieldErrorCode::InvalidIdentifier));
        assert!(errors.has("channel_id", FieldErrorCode::IdentifierTooShort));
    }

    #[test]
    fn soroush_allows_dots_and_eitaa_allows_leading_digit() {
        assert!(channel("news.today", Application::Soroush).is_ok());
        assert!(channel("24news", Application::Eitaa).is_ok());
        assert!(channel("24news", Application::Gap).is_err());
    }

    #[test]
    fn whatsapp_has_no_channels() {
        let errors = channel("somechannel", Application::Whatsapp).unwrap_err();
        assert!(errors.has("application", FieldErrorCode::UnsupportedApplication));
    }

    #[test]
    fn instagram_page_ids() {
        for good in ["a", "nasa", "the.rock", "_under_score_", "a1234567890123456789012345678z"] {
            assert!(
                validate_identifier(LinkKind::Instagram, good, None).is_ok(),
                "{} should be valid",
                good
            );
        }
        for bad in [".leading", "trailing.", "dou..ble", "has space", "a12345678901234567890123456789z"] {
            let errors = validate_identifier(LinkKind::Instagram, bad, None).unwrap_err();
            assert!(errors.has("page_id", FieldErrorCode::InvalidIdentifier), "{}", bad);
        }
    }

    #[test]
    fn builds_canonical_urls() {
        assert_eq!(
            build_url(LinkKind::Channel, "newschannel", Some(Application::Telegram)).unwrap(),
            "https://t.me/newschannel/"
        );
        assert_eq!(
            build_url(LinkKind::Channel, "news", Some(Application::Eitaa)).unwrap(),
            "https://eitaa.com/news/"
        );
        assert_eq!(
            build_url(LinkKind::Instagram, "nasa", None).unwrap(),
            "https://instagram.com/nasa/"
        );
    }

    #[test]
    fn unknown_application_has_no_url() {
        let errors =
            build_url(LinkKind::Channel, "group", Some(Application::Whatsapp)).unwrap_err();
        assert!(errors.has("application", FieldErrorCode::UnsupportedApplication));
        assert!(build_url(LinkKind::Website, "x", None).is_err());
    }
}
