use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::action::SubjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    InappropriateContent,
    MismatchedTitleDescription,
    BrokenLink,
}

impl ReportType {
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "inappropriate_content" => Some(Self::InappropriateContent),
            "mismatched_title_description" => Some(Self::MismatchedTitleDescription),
            "broken_link" => Some(Self::BrokenLink),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::InappropriateContent => "inappropriate_content",
            Self::MismatchedTitleDescription => "mismatched_title_description",
            Self::BrokenLink => "broken_link",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: i64,
    #[serde(flatten)]
    pub subject: SubjectRef,
    pub url: String,
    pub email: String,
    pub report_type: ReportType,
    pub text: String,
    pub is_acknowledged: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub subject: SubjectRef,
    pub url: String,
    pub email: String,
    pub report_type: ReportType,
    pub text: String,
}
