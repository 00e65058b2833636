use anyhow::Result;
use std::sync::Arc;

use crate::app::error::LinkError;
use crate::domain::action::{Action, ActionType, SubjectKind, SubjectRef};
use crate::domain::link::{Page, PageRequest};
use crate::domain::requester::Requester;
use crate::infra::store::{LinkStore, StoreTx};

/// Records `event` on `subject`. There is one row per (type, subject):
/// firing an event again re-opens the existing row instead of adding one.
pub async fn record_event(
    tx: &mut dyn StoreTx,
    event: ActionType,
    subject: SubjectRef,
) -> Result<Action> {
    let action = tx.upsert_action(event, subject).await?;
    tracing::debug!(
        action_id = action.id,
        action_type = action.action_type.as_db(),
        subject_type = subject.kind.as_db(),
        subject_id = subject.id,
        "recorded moderation event"
    );
    Ok(action)
}

/// Closes the outstanding events of `subject`, optionally only those of one
/// type.
pub async fn acknowledge_events(
    tx: &mut dyn StoreTx,
    subject: SubjectRef,
    event: Option<ActionType>,
) -> Result<u64> {
    tx.acknowledge_subject_actions(subject, event).await
}

/// Marks an action handled, along with the report or contact message it
/// points at.
pub async fn acknowledge(tx: &mut dyn StoreTx, action: &Action) -> Result<Action> {
    let updated = tx.set_action_acknowledged(action.id, true).await?;
    match action.subject.kind {
        SubjectKind::Report => tx.acknowledge_report(action.subject.id).await?,
        SubjectKind::ContactMessage => tx.acknowledge_contact(action.subject.id).await?,
        SubjectKind::Link(_) => {}
    }
    Ok(updated)
}

#[derive(Clone)]
pub struct ModerationService {
    store: Arc<dyn LinkStore>,
}

impl ModerationService {
    pub fn new(store: Arc<dyn LinkStore>) -> Self {
        Self { store }
    }

    pub async fn list_unacknowledged_actions(&self, page: PageRequest) -> Result<Page<Action>> {
        let rows = self.store.list_unacknowledged_actions(page).await?;
        Ok(Page::from_rows(rows, page))
    }

    pub async fn count_unacknowledged_actions(&self) -> Result<i64> {
        self.store.count_unacknowledged_actions().await
    }

    pub async fn acknowledge_action(
        &self,
        id: i64,
        requester: &Requester,
    ) -> Result<Action, LinkError> {
        if !requester.is_moderator() {
            return Err(LinkError::PermissionDenied);
        }

        let mut tx = self.store.begin().await?;
        let action = tx.find_action(id).await?.ok_or(LinkError::NotFound)?;
        let updated = acknowledge(tx.as_mut(), &action).await?;
        tx.commit().await?;

        tracing::info!(action_id = id, "action acknowledged");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::link::LinkKind;
    use crate::domain::report::{NewReport, ReportType};
    use crate::infra::memory::MemoryStore;
    use uuid::Uuid;

    #[tokio::test]
    async fn repeated_events_share_one_row() {
        let store = Arc::new(MemoryStore::new());
        let subject = SubjectRef::link(LinkKind::Website, 3);

        let mut tx = store.begin().await.unwrap();
        let first = record_event(tx.as_mut(), ActionType::LinkCreated, subject)
            .await
            .unwrap();
        let second = record_event(tx.as_mut(), ActionType::LinkCreated, subject)
            .await
            .unwrap();
        let other = record_event(tx.as_mut(), ActionType::LinkUpdated, subject)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(store.count_unacknowledged_actions().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn only_moderators_acknowledge() {
        let store = Arc::new(MemoryStore::new());
        let mut tx = store.begin().await.unwrap();
        let report = tx
            .insert_report(&NewReport {
                subject: SubjectRef::link(LinkKind::Channel, 1),
                url: "https://t.me/newschannel/".into(),
                email: "reader@example.com".into(),
                report_type: ReportType::BrokenLink,
                text: "dead".into(),
            })
            .await
            .unwrap();
        let action = record_event(
            tx.as_mut(),
            ActionType::LinkReported,
            SubjectRef::report(report.id),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        let service = ModerationService::new(store.clone());
        let err = service
            .acknowledge_action(action.id, &Requester::author(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::PermissionDenied));

        let acknowledged = service
            .acknowledge_action(action.id, &Requester::moderator(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(acknowledged.is_acknowledged);
        assert_eq!(store.count_unacknowledged_actions().await.unwrap(), 0);

        let missing = service
            .acknowledge_action(9999, &Requester::moderator(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(missing, LinkError::NotFound));
    }
}
