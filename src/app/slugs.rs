use slug::slugify;

use crate::domain::link::LinkDetails;

/// Derives the public slug of a link. Recomputed on every save so it always
/// follows the current url or identifier.
pub fn derive_slug(url: &str, details: &LinkDetails) -> String {
    match details {
        LinkDetails::Website { .. } => website_slug(url),
        LinkDetails::Channel {
            application,
            channel_id,
        } => format!("{}-{}", application.as_db(), channel_id),
        LinkDetails::Group {
            application,
            group_uuid,
        } => slugify(format!("{}-{}", application.as_db(), group_uuid)),
        // Page ids are already path safe; `.` and `_` must stay distinct.
        LinkDetails::Instagram { page_id } => format!("ig-{}", page_id),
    }
}

fn website_slug(url: &str) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());
    let host = host.strip_prefix("www.").unwrap_or(&host);

    match host.rsplit_once('.') {
        Some((domain, tld)) => slugify(format!("{}-{}", domain, tld)),
        None => slugify(host),
    }
}
