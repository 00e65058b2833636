use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Request,
    Suggestion,
    Advertisement,
    Support,
}

impl ContactType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "request" => Some(Self::Request),
            "suggestion" => Some(Self::Suggestion),
            "advertisement" => Some(Self::Advertisement),
            "support" => Some(Self::Support),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Suggestion => "suggestion",
            Self::Advertisement => "advertisement",
            Self::Support => "support",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactMessage {
    pub id: i64,
    pub email: String,
    pub contact_type: ContactType,
    pub text: String,
    pub is_acknowledged: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewContactMessage {
    pub email: String,
    pub contact_type: ContactType,
    pub text: String,
}
