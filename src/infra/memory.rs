//! In-process store used for local runs and the test suite. Transactions are
//! serialized behind one async mutex and roll back on drop.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::app::duplicates::normalize_url;
use crate::domain::action::{Action, ActionType, SubjectRef};
use crate::domain::category::Category;
use crate::domain::contact::{ContactMessage, NewContactMessage};
use crate::domain::link::{
    Link, LinkDetails, LinkFilter, LinkKind, NewLink, PageRequest, RevisionPair,
};
use crate::domain::report::{NewReport, Report};
use crate::infra::store::{LinkStore, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    links: BTreeMap<(LinkKind, i64), Link>,
    link_ids: HashMap<LinkKind, i64>,
    actions: BTreeMap<i64, Action>,
    reports: BTreeMap<i64, Report>,
    contacts: BTreeMap<i64, ContactMessage>,
    categories: BTreeMap<i64, Category>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn next_link_id(&mut self, kind: LinkKind) -> i64 {
        let counter = self.link_ids.entry(kind).or_insert(0);
        *counter += 1;
        *counter
    }

    fn rows(&self, kind: LinkKind) -> impl Iterator<Item = &Link> {
        self.links
            .range((kind, i64::MIN)..=(kind, i64::MAX))
            .map(|(_, link)| link)
    }

    fn pair_for_root(&self, root: &Link) -> RevisionPair {
        let child = self
            .rows(root.kind())
            .find(|link| link.parent_id == Some(root.id))
            .cloned();
        RevisionPair {
            root: root.clone(),
            child,
        }
    }

    fn pair_by_slug(&self, kind: LinkKind, slug: &str) -> Option<RevisionPair> {
        self.rows(kind)
            .find(|link| link.is_root() && link.slug == slug)
            .map(|root| self.pair_for_root(root))
    }

    fn pair_by_id(&self, kind: LinkKind, id: i64) -> Option<RevisionPair> {
        let row = self.links.get(&(kind, id))?;
        let root_id = row.parent_id.unwrap_or(row.id);
        let root = self.links.get(&(kind, root_id))?;
        Some(self.pair_for_root(root))
    }

    fn build_link(&mut self, new: &NewLink) -> Link {
        let now = OffsetDateTime::now_utc();
        Link {
            id: self.next_link_id(new.kind()),
            parent_id: new.parent_id,
            author_id: new.author_id,
            slug: new.slug.clone(),
            content: new.content.clone(),
            image_path: new.image_path.clone(),
            status: new.status,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let snapshot = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            snapshot: Some(snapshot),
        }))
    }

    async fn find_pair_by_slug(&self, kind: LinkKind, slug: &str) -> Result<Option<RevisionPair>> {
        Ok(self.state.lock().await.pair_by_slug(kind, slug))
    }

    async fn find_pair_by_id(&self, kind: LinkKind, id: i64) -> Result<Option<RevisionPair>> {
        Ok(self.state.lock().await.pair_by_id(kind, id))
    }

    async fn list_published(
        &self,
        kind: LinkKind,
        filter: &LinkFilter,
        page: PageRequest,
    ) -> Result<Vec<Link>> {
        let state = self.state.lock().await;
        let mut links: Vec<Link> = state
            .rows(kind)
            .filter(|link| link.is_root() && link.is_published())
            .filter(|link| {
                filter
                    .application
                    .map_or(true, |app| link.content.details.application() == Some(app))
            })
            .filter(|link| {
                filter.website_type.map_or(true, |wanted| {
                    matches!(
                        link.content.details,
                        LinkDetails::Website { website_type } if website_type == wanted
                    )
                })
            })
            .filter(|link| {
                filter
                    .category_id
                    .map_or(true, |id| link.content.category_id == Some(id))
            })
            .cloned()
            .collect();
        links.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(links
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.fetch_limit() as usize)
            .collect())
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Link>> {
        let state = self.state.lock().await;
        Ok(state
            .links
            .values()
            .filter(|link| link.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn list_unacknowledged_actions(&self, page: PageRequest) -> Result<Vec<Action>> {
        let state = self.state.lock().await;
        let mut actions: Vec<Action> = state
            .actions
            .values()
            .filter(|action| !action.is_acknowledged)
            .cloned()
            .collect();
        actions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));

        Ok(actions
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.fetch_limit() as usize)
            .collect())
    }

    async fn count_unacknowledged_actions(&self) -> Result<i64> {
        let state = self.state.lock().await;
        Ok(state
            .actions
            .values()
            .filter(|action| !action.is_acknowledged)
            .count() as i64)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let state = self.state.lock().await;
        let mut categories: Vec<Category> = state.categories.values().cloned().collect();
        categories.sort_by(|a, b| {
            a.display_order
                .cmp(&b.display_order)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(categories)
    }

    async fn list_image_paths(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let paths: BTreeSet<String> = state
            .links
            .values()
            .filter(|link| !link.image_path.is_empty())
            .map(|link| link.image_path.clone())
            .collect();
        Ok(paths.into_iter().collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_pair_by_slug(
        &mut self,
        kind: LinkKind,
        slug: &str,
    ) -> Result<Option<RevisionPair>> {
        Ok(self.guard.pair_by_slug(kind, slug))
    }

    async fn lock_pair_by_id(&mut self, kind: LinkKind, id: i64) -> Result<Option<RevisionPair>> {
        Ok(self.guard.pair_by_id(kind, id))
    }

    async fn lock_url_key(&mut self, _kind: LinkKind, _url_key: &str) -> Result<()> {
        // The whole store is already held.
        Ok(())
    }

    async fn find_by_url_key(&mut self, kind: LinkKind, url_key: &str) -> Result<Vec<i64>> {
        Ok(self
            .guard
            .rows(kind)
            .filter(|link| normalize_url(&link.content.url) == url_key)
            .map(|link| link.id)
            .collect())
    }

    async fn slug_owners(&mut self, kind: LinkKind, slug: &str) -> Result<Vec<i64>> {
        let mut owners: Vec<i64> = self
            .guard
            .rows(kind)
            .filter(|link| link.slug == slug)
            .map(|link| link.parent_id.unwrap_or(link.id))
            .collect();
        owners.sort_unstable();
        owners.dedup();
        Ok(owners)
    }

    async fn category_exists(&mut self, id: i64) -> Result<bool> {
        Ok(self.guard.categories.contains_key(&id))
    }

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link> {
        let root_taken = self
            .guard
            .rows(link.kind())
            .any(|row| row.is_root() && row.slug == link.slug);
        if link.parent_id.is_none() && root_taken {
            return Err(anyhow!("duplicate root slug {}", link.slug));
        }
        let stored = self.guard.build_link(link);
        self.guard
            .links
            .insert((stored.kind(), stored.id), stored.clone());
        Ok(stored)
    }

    async fn insert_child(&mut self, link: &NewLink) -> Result<Option<Link>> {
        let parent_id = link
            .parent_id
            .ok_or_else(|| anyhow!("revision without a parent"))?;
        let taken = self
            .guard
            .rows(link.kind())
            .any(|row| row.parent_id == Some(parent_id));
        if taken {
            return Ok(None);
        }
        let stored = self.guard.build_link(link);
        self.guard
            .links
            .insert((stored.kind(), stored.id), stored.clone());
        Ok(Some(stored))
    }

    async fn update_link(&mut self, link: &Link) -> Result<Link> {
        let slot = self
            .guard
            .links
            .get_mut(&(link.kind(), link.id))
            .ok_or_else(|| anyhow!("link {} not found", link.id))?;
        let mut updated = link.clone();
        updated.created_at = slot.created_at;
        updated.parent_id = slot.parent_id;
        updated.updated_at = OffsetDateTime::now_utc();
        *slot = updated.clone();
        Ok(updated)
    }

    async fn delete_link(&mut self, kind: LinkKind, id: i64) -> Result<bool> {
        let removed = self.guard.links.remove(&(kind, id)).is_some();
        if removed {
            // Children follow their root.
            self.guard
                .links
                .retain(|(row_kind, _), link| !(*row_kind == kind && link.parent_id == Some(id)));
        }
        Ok(removed)
    }

    async fn upsert_action(
        &mut self,
        action_type: ActionType,
        subject: SubjectRef,
    ) -> Result<Action> {
        let now = OffsetDateTime::now_utc();
        let existing = self
            .guard
            .actions
            .values_mut()
            .find(|action| action.action_type == action_type && action.subject == subject);
        if let Some(action) = existing {
            action.is_acknowledged = false;
            action.updated_at = now;
            return Ok(action.clone());
        }

        let action = Action {
            id: self.guard.next_id(),
            action_type,
            subject,
            is_acknowledged: false,
            created_at: now,
            updated_at: now,
        };
        self.guard.actions.insert(action.id, action.clone());
        Ok(action)
    }

    async fn find_action(&mut self, id: i64) -> Result<Option<Action>> {
        Ok(self.guard.actions.get(&id).cloned())
    }

    async fn set_action_acknowledged(&mut self, id: i64, acknowledged: bool) -> Result<Action> {
        let action = self
            .guard
            .actions
            .get_mut(&id)
            .ok_or_else(|| anyhow!("action {} not found", id))?;
        action.is_acknowledged = acknowledged;
        action.updated_at = OffsetDateTime::now_utc();
        Ok(action.clone())
    }

    async fn acknowledge_subject_actions(
        &mut self,
        subject: SubjectRef,
        action_type: Option<ActionType>,
    ) -> Result<u64> {
        let now = OffsetDateTime::now_utc();
        let mut changed = 0;
        for action in self.guard.actions.values_mut() {
            let matches = action.subject == subject
                && !action.is_acknowledged
                && action_type.map_or(true, |wanted| action.action_type == wanted);
            if matches {
                action.is_acknowledged = true;
                action.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert_report(&mut self, report: &NewReport) -> Result<Report> {
        let stored = Report {
            id: self.guard.next_id(),
            subject: report.subject,
            url: report.url.clone(),
            email: report.email.clone(),
            report_type: report.report_type,
            text: report.text.clone(),
            is_acknowledged: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.guard.reports.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn acknowledge_report(&mut self, id: i64) -> Result<()> {
        if let Some(report) = self.guard.reports.get_mut(&id) {
            report.is_acknowledged = true;
        }
        Ok(())
    }

    async fn acknowledge_reports_on(&mut self, subject: SubjectRef) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for report in self.guard.reports.values_mut() {
            if report.subject == subject && !report.is_acknowledged {
                report.is_acknowledged = true;
                ids.push(report.id);
            }
        }
        Ok(ids)
    }

    async fn insert_contact(&mut self, message: &NewContactMessage) -> Result<ContactMessage> {
        let stored = ContactMessage {
            id: self.guard.next_id(),
            email: message.email.clone(),
            contact_type: message.contact_type,
            text: message.text.clone(),
            is_acknowledged: false,
            created_at: OffsetDateTime::now_utc(),
        };
        self.guard.contacts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn acknowledge_contact(&mut self, id: i64) -> Result<()> {
        if let Some(message) = self.guard.contacts.get_mut(&id) {
            message.is_acknowledged = true;
        }
        Ok(())
    }

    async fn insert_category(
        &mut self,
        title: &str,
        display_order: i32,
    ) -> Result<Option<Category>> {
        if self.guard.categories.values().any(|c| c.title == title) {
            return Ok(None);
        }
        let category = Category {
            id: self.guard.next_id(),
            title: title.to_string(),
            display_order,
        };
        self.guard.categories.insert(category.id, category.clone());
        Ok(Some(category))
    }

    async fn delete_category(&mut self, id: i64) -> Result<bool> {
        if self.guard.categories.remove(&id).is_none() {
            return Ok(false);
        }
        for link in self.guard.links.values_mut() {
            if link.content.category_id == Some(id) {
                link.content.category_id = None;
            }
        }
        Ok(true)
    }

    async fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::link::{Application, LinkContent, LinkStatus};

    fn channel(parent_id: Option<i64>, channel_id: &str) -> NewLink {
        NewLink {
            parent_id,
            author_id: Uuid::nil(),
            slug: format!("telegram-{}", channel_id),
            content: LinkContent {
                title: "News".into(),
                url: format!("https://t.me/{}/", channel_id),
                category_id: None,
                description: String::new(),
                details: LinkDetails::Channel {
                    application: Application::Telegram,
                    channel_id: channel_id.into(),
                },
            },
            image_path: "images/channels/a.png".into(),
            status: LinkStatus::Draft,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_link(&channel(None, "newschannel")).await.unwrap();
        }
        assert!(store
            .find_pair_by_slug(LinkKind::Channel, "telegram-newschannel")
            .await
            .unwrap()
            .is_none());

        let mut tx = store.begin().await.unwrap();
        tx.insert_link(&channel(None, "newschannel")).await.unwrap();
        tx.commit().await.unwrap();
        drop(tx);
        assert!(store
            .find_pair_by_slug(LinkKind::Channel, "telegram-newschannel")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn second_child_loses() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let root = tx.insert_link(&channel(None, "newschannel")).await.unwrap();
        let first = tx
            .insert_child(&channel(Some(root.id), "newschannel2"))
            .await
            .unwrap();
        let second = tx
            .insert_child(&channel(Some(root.id), "newschannel3"))
            .await
            .unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn revision_slugs_belong_to_their_root() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let root = tx.insert_link(&channel(None, "newschannel")).await.unwrap();
        tx.insert_child(&channel(Some(root.id), "renamedchannel"))
            .await
            .unwrap();

        let owners = tx
            .slug_owners(LinkKind::Channel, "telegram-renamedchannel")
            .await
            .unwrap();
        assert_eq!(owners, vec![root.id]);
        assert!(tx
            .slug_owners(LinkKind::Channel, "telegram-otherchannel")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn upsert_reopens_existing_action() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let subject = SubjectRef::link(LinkKind::Channel, 1);
        let first = tx.upsert_action(ActionType::LinkCreated, subject).await.unwrap();
        tx.set_action_acknowledged(first.id, true).await.unwrap();
        let second = tx.upsert_action(ActionType::LinkCreated, subject).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(!second.is_acknowledged);
        tx.commit().await.unwrap();
        drop(tx);
        assert_eq!(store.count_unacknowledged_actions().await.unwrap(), 1);
    }
}
