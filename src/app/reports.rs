use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::app::error::{FieldErrorCode, LinkError, ValidationErrors};
use crate::app::moderation::record_event;
use crate::domain::action::{ActionType, SubjectRef};
use crate::domain::link::LinkKind;
use crate::domain::report::{NewReport, Report, ReportType};
use crate::infra::store::LinkStore;

pub const MESSAGE_MAX_CHARS: usize = 1024;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Trimmed email, or an `invalid_email` error on `email`.
pub(crate) fn check_email(errors: &mut ValidationErrors, email: &str) -> String {
    let email = email.trim();
    if email.is_empty() {
        errors.add("email", FieldErrorCode::Required, "This field is required.");
    } else if !EMAIL.is_match(email) {
        errors.add("email", FieldErrorCode::InvalidEmail, "Enter a valid email address.");
    }
    email.to_string()
}

pub(crate) fn check_message(errors: &mut ValidationErrors, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        errors.add("text", FieldErrorCode::Required, "This field is required.");
    } else if text.chars().count() > MESSAGE_MAX_CHARS {
        errors.add(
            "text",
            FieldErrorCode::TooLong,
            format!("Ensure this value has at most {} characters.", MESSAGE_MAX_CHARS),
        );
    }
    text.to_string()
}

#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn LinkStore>,
}

impl ReportService {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self { store }
    }

    /// Files a report against a published link and queues it for review.
    /// The report keeps a copy of the url as it was when reported.
    pub async fn file_report(
        &self,
        kind: LinkKind,
        slug: &str,
        email: &str,
        report_type: &str,
        text: &str,
    ) -> Result<Report, LinkError> {
        let root = match self.store.find_pair_by_slug(kind, slug).await? {
            Some(pair) if pair.root.is_published() => pair.root,
            _ => return Err(LinkError::NotFound),
        };

        let mut errors = ValidationErrors::new();
        let email = check_email(&mut errors, email);
        let text = check_message(&mut errors, text);
        let report_type = ReportType::from_db(report_type.trim());
        if report_type.is_none() {
            errors.add(
                "report_type",
                FieldErrorCode::InvalidChoice,
                "Select a valid report type.",
            );
        }
        let Some(report_type) = report_type else {
            return Err(LinkError::Validation(errors));
        };
        errors.into_result()?;

        let mut tx = self.store.begin().await?;
        let report = tx
            .insert_report(&NewReport {
                subject: SubjectRef::link(kind, root.id),
                url: root.content.url.clone(),
                email,
                report_type,
                text,
            })
            .await?;
        record_event(
            tx.as_mut(),
            ActionType::LinkReported,
            SubjectRef::report(report.id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(kind = kind.as_db(), slug = %slug, report_id = report.id, "link reported");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        let mut errors = ValidationErrors::new();
        assert_eq!(check_email(&mut errors, " reader@example.com "), "reader@example.com");
        assert!(errors.is_empty());

        check_email(&mut errors, "not-an-email");
        assert!(errors.has("email", FieldErrorCode::InvalidEmail));
    }

    #[test]
    fn message_bounds() {
        let mut errors = ValidationErrors::new();
        check_message(&mut errors, "   ");
        assert!(errors.has("text", FieldErrorCode::Required));

        let mut errors = ValidationErrors::new();
        check_message(&mut errors, &"x".repeat(MESSAGE_MAX_CHARS + 1));
        assert!(errors.has("text", FieldErrorCode::TooLong));
    }
}
