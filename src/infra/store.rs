//! Persistence port. Every mutating operation runs inside one `StoreTx`;
//! reads that do not feed a write go through `LinkStore` directly.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::action::{Action, ActionType, SubjectRef};
use crate::domain::category::Category;
use crate::domain::contact::{ContactMessage, NewContactMessage};
use crate::domain::link::{Link, LinkFilter, LinkKind, NewLink, PageRequest, RevisionPair};
use crate::domain::report::{NewReport, Report};

#[async_trait]
pub trait LinkStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    async fn find_pair_by_slug(&self, kind: LinkKind, slug: &str) -> Result<Option<RevisionPair>>;

    /// `id` may name either the root or its child.
    async fn find_pair_by_id(&self, kind: LinkKind, id: i64) -> Result<Option<RevisionPair>>;

    /// Published roots, newest first. Returns up to `page.fetch_limit()` rows.
    async fn list_published(
        &self,
        kind: LinkKind,
        filter: &LinkFilter,
        page: PageRequest,
    ) -> Result<Vec<Link>>;

    /// Every row (roots and children, all kinds) written by `author_id`.
    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Link>>;

    /// Unacknowledged actions, most recently touched first.
    async fn list_unacknowledged_actions(&self, page: PageRequest) -> Result<Vec<Action>>;

    async fn count_unacknowledged_actions(&self) -> Result<i64>;

    async fn list_categories(&self) -> Result<Vec<Category>>;

    /// Distinct non-empty image paths referenced by any link row.
    async fn list_image_paths(&self) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait StoreTx: Send {
    /// Loads the root with this slug and its child, holding a write lock on
    /// both until commit or drop.
    async fn lock_pair_by_slug(&mut self, kind: LinkKind, slug: &str)
        -> Result<Option<RevisionPair>>;

    /// Same as `lock_pair_by_slug`, addressed by the id of either record.
    async fn lock_pair_by_id(&mut self, kind: LinkKind, id: i64) -> Result<Option<RevisionPair>>;

    /// Serializes concurrent submissions of one normalized url.
    async fn lock_url_key(&mut self, kind: LinkKind, url_key: &str) -> Result<()>;

    /// Ids of every row of `kind` stored under this normalized url.
    async fn find_by_url_key(&mut self, kind: LinkKind, url_key: &str) -> Result<Vec<i64>>;

    /// Root ids of every pair whose root or pending revision carries `slug`.
    async fn slug_owners(&mut self, kind: LinkKind, slug: &str) -> Result<Vec<i64>>;

    async fn category_exists(&mut self, id: i64) -> Result<bool>;

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link>;

    /// Inserts a revision unless its root already has one. `None` means
    /// another writer got there first.
    async fn insert_child(&mut self, link: &NewLink) -> Result<Option<Link>>;

    /// Writes every mutable column and bumps `updated_at`.
    async fn update_link(&mut self, link: &Link) -> Result<Link>;

    async fn delete_link(&mut self, kind: LinkKind, id: i64) -> Result<bool>;

    /// Inserts the (type, subject) action, or marks the existing one as
    /// unacknowledged again.
    async fn upsert_action(&mut self, action_type: ActionType, subject: SubjectRef)
        -> Result<Action>;

    async fn find_action(&mut self, id: i64) -> Result<Option<Action>>;

    async fn set_action_acknowledged(&mut self, id: i64, acknowledged: bool) -> Result<Action>;

    /// Acknowledges outstanding actions on `subject`, limited to
    /// `action_type` when given. Returns how many rows changed.
    async fn acknowledge_subject_actions(
        &mut self,
        subject: SubjectRef,
        action_type: Option<ActionType>,
    ) -> Result<u64>;

    async fn insert_report(&mut self, report: &NewReport) -> Result<Report>;

    async fn acknowledge_report(&mut self, id: i64) -> Result<()>;

    /// Acknowledges every open report against `subject` and returns their ids.
    async fn acknowledge_reports_on(&mut self, subject: SubjectRef) -> Result<Vec<i64>>;

    async fn insert_contact(&mut self, message: &NewContactMessage) -> Result<ContactMessage>;

    async fn acknowledge_contact(&mut self, id: i64) -> Result<()>;

    /// `None` when the title is taken.
    async fn insert_category(&mut self, title: &str, display_order: i32)
        -> Result<Option<Category>>;

    /// Links pointing at the category keep existing with no category.
    async fn delete_category(&mut self, id: i64) -> Result<bool>;

    async fn commit(&mut self) -> Result<()>;
}
