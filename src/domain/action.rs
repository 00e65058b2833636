use serde::{Serialize, Serializer};
use time::OffsetDateTime;

use crate::domain::link::LinkKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    LinkCreated,
    LinkUpdated,
    LinkReported,
    ContactUs,
}

impl ActionType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "link created" => Some(Self::LinkCreated),
            "link updated" => Some(Self::LinkUpdated),
            "link reported" => Some(Self::LinkReported),
            "contact us" => Some(Self::ContactUs),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::LinkCreated => "link created",
            Self::LinkUpdated => "link updated",
            Self::LinkReported => "link reported",
            Self::ContactUs => "contact us",
        }
    }
}

impl Serialize for ActionType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_db())
    }
}

/// The table an Action or Report points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKind {
    Link(LinkKind),
    Report,
    ContactMessage,
}

impl SubjectKind {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "report" => Some(Self::Report),
            "contact_message" => Some(Self::ContactMessage),
            other => LinkKind::from_db(other).map(Self::Link),
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Link(kind) => kind.as_db(),
            Self::Report => "report",
            Self::ContactMessage => "contact_message",
        }
    }
}

impl Serialize for SubjectKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_db())
    }
}

/// Typed replacement for a generic (content type, object id) reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubjectRef {
    #[serde(rename = "subject_type")]
    pub kind: SubjectKind,
    #[serde(rename = "subject_id")]
    pub id: i64,
}

impl SubjectRef {
    pub fn link(kind: LinkKind, id: i64) -> Self {
        Self {
            kind: SubjectKind::Link(kind),
            id,
        }
    }

    pub fn report(id: i64) -> Self {
        Self {
            kind: SubjectKind::Report,
            id,
        }
    }

    pub fn contact_message(id: i64) -> Self {
        Self {
            kind: SubjectKind::ContactMessage,
            id,
        }
    }
}

/// An entry in the moderation ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub id: i64,
    pub action_type: ActionType,
    #[serde(flatten)]
    pub subject: SubjectRef,
    pub is_acknowledged: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
