use std::sync::Arc;

use crate::app::error::{FieldErrorCode, LinkError, ValidationErrors};
use crate::app::moderation::record_event;
use crate::app::reports::{check_email, check_message};
use crate::domain::action::{ActionType, SubjectRef};
use crate::domain::contact::{ContactMessage, ContactType, NewContactMessage};
use crate::infra::store::LinkStore;

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn LinkStore>,
}

impl ContactService {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self { store }
    }

    pub async fn submit_contact(
        &self,
        email: &str,
        contact_type: &str,
        text: &str,
    ) -> Result<ContactMessage, LinkError> {
        let mut errors = ValidationErrors::new();
        let email = check_email(&mut errors, email);
        let text = check_message(&mut errors, text);
        let Some(contact_type) = ContactType::from_db(contact_type.trim()) else {
            errors.add(
                "contact_type",
                FieldErrorCode::InvalidChoice,
                "Select a valid contact type.",
            );
            return Err(LinkError::Validation(errors));
        };
        errors.into_result()?;

        let mut tx = self.store.begin().await?;
        let message = tx
            .insert_contact(&NewContactMessage {
                email,
                contact_type,
                text,
            })
            .await?;
        record_event(
            tx.as_mut(),
            ActionType::ContactUs,
            SubjectRef::contact_message(message.id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(message_id = message.id, "contact message received");
        Ok(message)
    }
}
