use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// The four concrete link variants. Each one lives in its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Website,
    Channel,
    Group,
    Instagram,
}

impl LinkKind {
    pub const ALL: [LinkKind; 4] = [
        LinkKind::Website,
        LinkKind::Channel,
        LinkKind::Group,
        LinkKind::Instagram,
    ];

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "website" => Some(Self::Website),
            "channel" => Some(Self::Channel),
            "group" => Some(Self::Group),
            "instagram" => Some(Self::Instagram),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Channel => "channel",
            Self::Group => "group",
            Self::Instagram => "instagram",
        }
    }

    /// Accepts both the singular and the plural form used in URL paths.
    pub fn from_path(value: &str) -> Option<Self> {
        Self::from_db(value).or_else(|| Self::from_db(value.strip_suffix('s')?))
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Website => "websites",
            Self::Channel => "channels",
            Self::Group => "groups",
            Self::Instagram => "instagrams",
        }
    }

    /// Name of the user-supplied identifier field, for kinds that have one.
    pub fn identifier_field(&self) -> Option<&'static str> {
        match self {
            Self::Channel => Some("channel_id"),
            Self::Instagram => Some("page_id"),
            Self::Website | Self::Group => None,
        }
    }

    /// Field that carries duplicate-URL errors for this kind.
    pub fn duplicate_field(&self) -> &'static str {
        self.identifier_field().unwrap_or("url")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Draft,
    Published,
}

impl LinkStatus {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebsiteType {
    Iranian,
    Foreign,
}

impl WebsiteType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "iranian" => Some(Self::Iranian),
            "foreign" => Some(Self::Foreign),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Iranian => "iranian",
            Self::Foreign => "foreign",
        }
    }
}

/// Messaging platforms a channel or group can live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Application {
    Whatsapp,
    Telegram,
    Soroush,
    Gap,
    Igap,
    Eitaa,
}

impl Application {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "whatsapp" => Some(Self::Whatsapp),
            "telegram" => Some(Self::Telegram),
            "soroush" => Some(Self::Soroush),
            "gap" => Some(Self::Gap),
            "igap" => Some(Self::Igap),
            "eitaa" => Some(Self::Eitaa),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Whatsapp => "whatsapp",
            Self::Telegram => "telegram",
            Self::Soroush => "soroush",
            Self::Gap => "gap",
            Self::Igap => "igap",
            Self::Eitaa => "eitaa",
        }
    }

    /// WhatsApp has no public channels.
    pub fn supports_channels(&self) -> bool {
        !matches!(self, Self::Whatsapp)
    }
}

/// Variant-specific payload of a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkDetails {
    Website {
        website_type: WebsiteType,
    },
    Channel {
        application: Application,
        channel_id: String,
    },
    Group {
        application: Application,
        group_uuid: Uuid,
    },
    Instagram {
        page_id: String,
    },
}

impl LinkDetails {
    pub fn kind(&self) -> LinkKind {
        match self {
            Self::Website { .. } => LinkKind::Website,
            Self::Channel { .. } => LinkKind::Channel,
            Self::Group { .. } => LinkKind::Group,
            Self::Instagram { .. } => LinkKind::Instagram,
        }
    }

    pub fn application(&self) -> Option<Application> {
        match self {
            Self::Channel { application, .. } | Self::Group { application, .. } => {
                Some(*application)
            }
            Self::Website { .. } | Self::Instagram { .. } => None,
        }
    }
}

/// The user-editable part of a link plus its derived url. Two records with
/// equal content are the same submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkContent {
    pub title: String,
    pub url: String,
    pub category_id: Option<i64>,
    pub description: String,
    #[serde(flatten)]
    pub details: LinkDetails,
}

/// A persisted link row, either a root or a revision of one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub author_id: Uuid,
    pub slug: String,
    #[serde(flatten)]
    pub content: LinkContent,
    pub image_path: String,
    pub status: LinkStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Link {
    pub fn kind(&self) -> LinkKind {
        self.content.details.kind()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_published(&self) -> bool {
        self.status == LinkStatus::Published
    }

    /// Copies every user-visible column of `revision` onto this record,
    /// leaving id, parent and timestamps alone.
    pub fn absorb(&mut self, revision: &Link) {
        self.slug = revision.slug.clone();
        self.content = revision.content.clone();
        self.image_path = revision.image_path.clone();
        self.status = revision.status;
    }
}

/// A link row that has not been inserted yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLink {
    pub parent_id: Option<i64>,
    pub author_id: Uuid,
    pub slug: String,
    pub content: LinkContent,
    pub image_path: String,
    pub status: LinkStatus,
}

impl NewLink {
    pub fn kind(&self) -> LinkKind {
        self.content.details.kind()
    }
}

/// A root together with its pending revision, if any. Every mutation of a
/// link loads and locks one of these.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionPair {
    pub root: Link,
    pub child: Option<Link>,
}

impl RevisionPair {
    pub fn kind(&self) -> LinkKind {
        self.root.kind()
    }

    /// The record the author is currently editing.
    pub fn current(&self) -> &Link {
        self.child.as_ref().unwrap_or(&self.root)
    }

    pub fn ids(&self) -> Vec<i64> {
        let mut ids = vec![self.root.id];
        if let Some(child) = &self.child {
            ids.push(child.id);
        }
        ids
    }
}

/// How the author dashboard labels a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Draft,
    Published,
    Updated,
}

impl DisplayStatus {
    pub fn for_pair(pair: &RevisionPair) -> Self {
        match (&pair.root.status, pair.child.as_ref().map(|child| child.status)) {
            (LinkStatus::Published, Some(LinkStatus::Draft)) => Self::Updated,
            (_, Some(LinkStatus::Published)) | (LinkStatus::Published, None) => Self::Published,
            _ => Self::Draft,
        }
    }
}

/// Filters for the public directory listing.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub application: Option<Application>,
    pub website_type: Option<WebsiteType>,
    pub category_id: Option<i64>,
}

impl LinkFilter {
    /// Drops the filters that have no column on `kind`.
    pub fn for_kind(&self, kind: LinkKind) -> Self {
        Self {
            application: self
                .application
                .filter(|_| matches!(kind, LinkKind::Channel | LinkKind::Group)),
            website_type: self.website_type.filter(|_| kind == LinkKind::Website),
            category_id: self.category_id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }

    /// One extra row is fetched so callers can tell whether a next page exists.
    pub fn fetch_limit(&self) -> i64 {
        self.per_page as i64 + 1
    }
}

/// One page of results plus the number of the page after it, if any.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    /// Builds a page from rows fetched with `request.fetch_limit()`.
    pub fn from_rows(mut rows: Vec<T>, request: PageRequest) -> Self {
        let has_more = rows.len() > request.per_page as usize;
        rows.truncate(request.per_page as usize);
        Self {
            items: rows,
            next_page: has_more.then(|| request.page + 1),
        }
    }
}
