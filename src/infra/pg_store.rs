use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use uuid::Uuid;

use crate::app::duplicates::normalize_url;
use crate::domain::action::{Action, ActionType, SubjectKind, SubjectRef};
use crate::domain::category::Category;
use crate::domain::contact::{ContactMessage, ContactType, NewContactMessage};
use crate::domain::link::{
    Application, Link, LinkContent, LinkDetails, LinkFilter, LinkKind, LinkStatus, NewLink,
    PageRequest, RevisionPair, WebsiteType,
};
use crate::domain::report::{NewReport, Report, ReportType};
use crate::infra::db::Db;
use crate::infra::store::{LinkStore, StoreTx};

const LINK_COLUMNS: &str = "id, parent_id, author_id, slug, title, url, category_id, \
                            description, image_path, status, created_at, updated_at";

const ACTION_COLUMNS: &str =
    "id, action_type, subject_type, subject_id, is_acknowledged, created_at, updated_at";

fn variant_columns(kind: LinkKind) -> &'static [&'static str] {
    match kind {
        LinkKind::Website => &["website_type"],
        LinkKind::Channel => &["application", "channel_id"],
        LinkKind::Group => &["application", "group_uuid"],
        LinkKind::Instagram => &["page_id"],
    }
}

fn select_columns(kind: LinkKind) -> String {
    format!("{}, {}", LINK_COLUMNS, variant_columns(kind).join(", "))
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|index| format!("${}", index))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_details<'q>(
    query: Query<'q, Postgres, PgArguments>,
    details: &'q LinkDetails,
) -> Query<'q, Postgres, PgArguments> {
    match details {
        LinkDetails::Website { website_type } => query.bind(website_type.as_db()),
        LinkDetails::Channel {
            application,
            channel_id,
        } => query.bind(application.as_db()).bind(channel_id.as_str()),
        LinkDetails::Group {
            application,
            group_uuid,
        } => query.bind(application.as_db()).bind(*group_uuid),
        LinkDetails::Instagram { page_id } => query.bind(page_id.as_str()),
    }
}

fn parse_application(row: &PgRow) -> Result<Application> {
    let value: String = row.get("application");
    Application::from_db(&value).ok_or_else(|| anyhow!("unknown application: {}", value))
}

fn link_from_row(kind: LinkKind, row: &PgRow) -> Result<Link> {
    let details = match kind {
        LinkKind::Website => {
            let value: String = row.get("website_type");
            LinkDetails::Website {
                website_type: WebsiteType::from_db(&value)
                    .ok_or_else(|| anyhow!("unknown website type: {}", value))?,
            }
        }
        LinkKind::Channel => LinkDetails::Channel {
            application: parse_application(row)?,
            channel_id: row.get("channel_id"),
        },
        LinkKind::Group => LinkDetails::Group {
            application: parse_application(row)?,
            group_uuid: row.get("group_uuid"),
        },
        LinkKind::Instagram => LinkDetails::Instagram {
            page_id: row.get("page_id"),
        },
    };

    let status: String = row.get("status");
    let status =
        LinkStatus::from_db(&status).ok_or_else(|| anyhow!("unknown link status: {}", status))?;

    Ok(Link {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        author_id: row.get("author_id"),
        slug: row.get("slug"),
        content: LinkContent {
            title: row.get("title"),
            url: row.get("url"),
            category_id: row.get("category_id"),
            description: row.get("description"),
            details,
        },
        image_path: row.get("image_path"),
        status,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn action_from_row(row: &PgRow) -> Result<Action> {
    let action_type: String = row.get("action_type");
    let action_type = ActionType::from_db(&action_type)
        .ok_or_else(|| anyhow!("unknown action type: {}", action_type))?;
    let subject_type: String = row.get("subject_type");
    let subject_kind = SubjectKind::from_db(&subject_type)
        .ok_or_else(|| anyhow!("unknown subject type: {}", subject_type))?;

    Ok(Action {
        id: row.get("id"),
        action_type,
        subject: SubjectRef {
            kind: subject_kind,
            id: row.get("subject_id"),
        },
        is_acknowledged: row.get("is_acknowledged"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn category_from_row(row: &PgRow) -> Category {
    Category {
        id: row.get("id"),
        title: row.get("title"),
        display_order: row.get("display_order"),
    }
}

async fn fetch_pair(
    conn: &mut PgConnection,
    kind: LinkKind,
    root: Option<PgRow>,
    lock: bool,
) -> Result<Option<RevisionPair>> {
    let Some(root) = root else {
        return Ok(None);
    };
    let root = link_from_row(kind, &root)?;

    let sql = format!(
        "SELECT {} FROM {} WHERE parent_id = $1{}",
        select_columns(kind),
        kind.table(),
        if lock { " FOR UPDATE" } else { "" }
    );
    let child = sqlx::query(&sql)
        .bind(root.id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|row| link_from_row(kind, &row))
        .transpose()?;

    Ok(Some(RevisionPair { root, child }))
}

async fn root_id_of(conn: &mut PgConnection, kind: LinkKind, id: i64) -> Result<Option<i64>> {
    let sql = format!(
        "SELECT COALESCE(parent_id, id) AS root_id FROM {} WHERE id = $1",
        kind.table()
    );
    let root_id: Option<i64> = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(root_id)
}

#[derive(Clone)]
pub struct PgStore {
    db: Db,
}

impl PgStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LinkStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.db.pool().begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }

    async fn find_pair_by_slug(&self, kind: LinkKind, slug: &str) -> Result<Option<RevisionPair>> {
        let mut conn = self.db.pool().acquire().await?;
        let sql = format!(
            "SELECT {} FROM {} WHERE slug = $1 AND parent_id IS NULL",
            select_columns(kind),
            kind.table()
        );
        let root = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await?;
        fetch_pair(&mut conn, kind, root, false).await
    }

    async fn find_pair_by_id(&self, kind: LinkKind, id: i64) -> Result<Option<RevisionPair>> {
        let mut conn = self.db.pool().acquire().await?;
        let Some(root_id) = root_id_of(&mut conn, kind, id).await? else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            select_columns(kind),
            kind.table()
        );
        let root = sqlx::query(&sql)
            .bind(root_id)
            .fetch_optional(&mut *conn)
            .await?;
        fetch_pair(&mut conn, kind, root, false).await
    }

    async fn list_published(
        &self,
        kind: LinkKind,
        filter: &LinkFilter,
        page: PageRequest,
    ) -> Result<Vec<Link>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM {} WHERE parent_id IS NULL AND status = 'published'",
            select_columns(kind),
            kind.table()
        ));
        if let Some(application) = filter.application {
            builder.push(" AND application = ").push_bind(application.as_db());
        }
        if let Some(website_type) = filter.website_type {
            builder
                .push(" AND website_type = ")
                .push_bind(website_type.as_db());
        }
        if let Some(category_id) = filter.category_id {
            builder.push(" AND category_id = ").push_bind(category_id);
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(page.fetch_limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        let rows = builder.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(|row| link_from_row(kind, row)).collect()
    }

    async fn list_by_author(&self, author_id: Uuid) -> Result<Vec<Link>> {
        let mut links = Vec::new();
        for kind in LinkKind::ALL {
            let sql = format!(
                "SELECT {} FROM {} WHERE author_id = $1",
                select_columns(kind),
                kind.table()
            );
            let rows = sqlx::query(&sql)
                .bind(author_id)
                .fetch_all(self.db.pool())
                .await?;
            for row in &rows {
                links.push(link_from_row(kind, row)?);
            }
        }
        Ok(links)
    }

    async fn list_unacknowledged_actions(&self, page: PageRequest) -> Result<Vec<Action>> {
        let sql = format!(
            "SELECT {} FROM actions WHERE is_acknowledged = FALSE \
             ORDER BY updated_at DESC, id DESC LIMIT $1 OFFSET $2",
            ACTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(page.fetch_limit())
            .bind(page.offset())
            .fetch_all(self.db.pool())
            .await?;
        rows.iter().map(action_from_row).collect()
    }

    async fn count_unacknowledged_actions(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM actions WHERE is_acknowledged = FALSE")
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }

    async fn list_categories(&self) -> Result<Vec<Category>> {
        let rows = sqlx::query(
            "SELECT id, title, display_order FROM categories ORDER BY display_order, title",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.iter().map(category_from_row).collect())
    }

    async fn list_image_paths(&self) -> Result<Vec<String>> {
        let sql = LinkKind::ALL
            .iter()
            .map(|kind| format!("SELECT image_path FROM {} WHERE image_path <> ''", kind.table()))
            .collect::<Vec<_>>()
            .join(" UNION ");
        let paths: Vec<String> = sqlx::query_scalar(&sql).fetch_all(self.db.pool()).await?;
        Ok(paths)
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_mut()
            .map(|tx| &mut **tx)
            .ok_or_else(|| anyhow!("transaction already committed"))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_pair_by_slug(
        &mut self,
        kind: LinkKind,
        slug: &str,
    ) -> Result<Option<RevisionPair>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE slug = $1 AND parent_id IS NULL FOR UPDATE",
            select_columns(kind),
            kind.table()
        );
        let root = sqlx::query(&sql)
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await?;
        fetch_pair(conn, kind, root, true).await
    }

    async fn lock_pair_by_id(&mut self, kind: LinkKind, id: i64) -> Result<Option<RevisionPair>> {
        let conn = self.conn()?;
        let Some(root_id) = root_id_of(conn, kind, id).await? else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 FOR UPDATE",
            select_columns(kind),
            kind.table()
        );
        let root = sqlx::query(&sql)
            .bind(root_id)
            .fetch_optional(&mut *conn)
            .await?;
        fetch_pair(conn, kind, root, true).await
    }

    async fn lock_url_key(&mut self, kind: LinkKind, url_key: &str) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", kind.as_db(), url_key))
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn find_by_url_key(&mut self, kind: LinkKind, url_key: &str) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let sql = format!("SELECT id FROM {} WHERE url_key = $1", kind.table());
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(url_key)
            .fetch_all(conn)
            .await?;
        Ok(ids)
    }

    async fn slug_owners(&mut self, kind: LinkKind, slug: &str) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT DISTINCT COALESCE(parent_id, id) FROM {} WHERE slug = $1",
            kind.table()
        );
        let owners: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(slug)
            .fetch_all(conn)
            .await?;
        Ok(owners)
    }

    async fn category_exists(&mut self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(id)
            .fetch_one(conn)
            .await?;
        Ok(exists)
    }

    async fn insert_link(&mut self, link: &NewLink) -> Result<Link> {
        let kind = link.kind();
        let columns = variant_columns(kind);
        let sql = format!(
            "INSERT INTO {} (parent_id, author_id, slug, title, url, url_key, category_id, \
             description, image_path, status, {}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, {}) \
             RETURNING {}",
            kind.table(),
            columns.join(", "),
            placeholders(11, columns.len()),
            select_columns(kind)
        );
        let url_key = normalize_url(&link.content.url);
        let query = sqlx::query(&sql)
            .bind(link.parent_id)
            .bind(link.author_id)
            .bind(&link.slug)
            .bind(&link.content.title)
            .bind(&link.content.url)
            .bind(&url_key)
            .bind(link.content.category_id)
            .bind(&link.content.description)
            .bind(&link.image_path)
            .bind(link.status.as_db());
        let row = bind_details(query, &link.content.details)
            .fetch_one(self.conn()?)
            .await?;
        link_from_row(kind, &row)
    }

    async fn insert_child(&mut self, link: &NewLink) -> Result<Option<Link>> {
        let kind = link.kind();
        let columns = variant_columns(kind);
        let sql = format!(
            "INSERT INTO {} (parent_id, author_id, slug, title, url, url_key, category_id, \
             description, image_path, status, {}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, {}) \
             ON CONFLICT (parent_id) WHERE parent_id IS NOT NULL DO NOTHING \
             RETURNING {}",
            kind.table(),
            columns.join(", "),
            placeholders(11, columns.len()),
            select_columns(kind)
        );
        let url_key = normalize_url(&link.content.url);
        let query = sqlx::query(&sql)
            .bind(link.parent_id)
            .bind(link.author_id)
            .bind(&link.slug)
            .bind(&link.content.title)
            .bind(&link.content.url)
            .bind(&url_key)
            .bind(link.content.category_id)
            .bind(&link.content.description)
            .bind(&link.image_path)
            .bind(link.status.as_db());
        let row = bind_details(query, &link.content.details)
            .fetch_optional(self.conn()?)
            .await?;
        row.map(|row| link_from_row(kind, &row)).transpose()
    }

    async fn update_link(&mut self, link: &Link) -> Result<Link> {
        let kind = link.kind();
        let assignments = variant_columns(kind)
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{} = ${}", column, index + 10))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET slug = $2, title = $3, url = $4, url_key = $5, category_id = $6, \
             description = $7, image_path = $8, status = $9, {}, updated_at = now() \
             WHERE id = $1 RETURNING {}",
            kind.table(),
            assignments,
            select_columns(kind)
        );
        let url_key = normalize_url(&link.content.url);
        let query = sqlx::query(&sql)
            .bind(link.id)
            .bind(&link.slug)
            .bind(&link.content.title)
            .bind(&link.content.url)
            .bind(&url_key)
            .bind(link.content.category_id)
            .bind(&link.content.description)
            .bind(&link.image_path)
            .bind(link.status.as_db());
        let row = bind_details(query, &link.content.details)
            .fetch_one(self.conn()?)
            .await?;
        link_from_row(kind, &row)
    }

    async fn delete_link(&mut self, kind: LinkKind, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let sql = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&sql).bind(id).execute(conn).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_action(
        &mut self,
        action_type: ActionType,
        subject: SubjectRef,
    ) -> Result<Action> {
        let conn = self.conn()?;
        let sql = format!(
            "INSERT INTO actions (action_type, subject_type, subject_id) VALUES ($1, $2, $3) \
             ON CONFLICT (action_type, subject_type, subject_id) \
             DO UPDATE SET is_acknowledged = FALSE, updated_at = now() \
             RETURNING {}",
            ACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(action_type.as_db())
            .bind(subject.kind.as_db())
            .bind(subject.id)
            .fetch_one(conn)
            .await?;
        action_from_row(&row)
    }

    async fn find_action(&mut self, id: i64) -> Result<Option<Action>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM actions WHERE id = $1 FOR UPDATE", ACTION_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(conn).await?;
        row.as_ref().map(action_from_row).transpose()
    }

    async fn set_action_acknowledged(&mut self, id: i64, acknowledged: bool) -> Result<Action> {
        let conn = self.conn()?;
        let sql = format!(
            "UPDATE actions SET is_acknowledged = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            ACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(acknowledged)
            .fetch_one(conn)
            .await?;
        action_from_row(&row)
    }

    async fn acknowledge_subject_actions(
        &mut self,
        subject: SubjectRef,
        action_type: Option<ActionType>,
    ) -> Result<u64> {
        let conn = self.conn()?;
        let result = sqlx::query(
            "UPDATE actions SET is_acknowledged = TRUE, updated_at = now() \
             WHERE subject_type = $1 AND subject_id = $2 AND is_acknowledged = FALSE \
               AND ($3::text IS NULL OR action_type = $3)",
        )
        .bind(subject.kind.as_db())
        .bind(subject.id)
        .bind(action_type.map(|action_type| action_type.as_db()))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_report(&mut self, report: &NewReport) -> Result<Report> {
        let conn = self.conn()?;
        let row = sqlx::query(
            "INSERT INTO reports (subject_type, subject_id, url, email, report_type, text) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, subject_type, subject_id, url, email, report_type, text, \
                       is_acknowledged, created_at",
        )
        .bind(report.subject.kind.as_db())
        .bind(report.subject.id)
        .bind(&report.url)
        .bind(&report.email)
        .bind(report.report_type.as_db())
        .bind(&report.text)
        .fetch_one(conn)
        .await?;

        let report_type: String = row.get("report_type");
        let report_type = ReportType::from_db(&report_type)
            .ok_or_else(|| anyhow!("unknown report type: {}", report_type))?;
        Ok(Report {
            id: row.get("id"),
            subject: report.subject,
            url: row.get("url"),
            email: row.get("email"),
            report_type,
            text: row.get("text"),
            is_acknowledged: row.get("is_acknowledged"),
            created_at: row.get("created_at"),
        })
    }

    async fn acknowledge_report(&mut self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query("UPDATE reports SET is_acknowledged = TRUE WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn acknowledge_reports_on(&mut self, subject: SubjectRef) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        let ids: Vec<i64> = sqlx::query_scalar(
            "UPDATE reports SET is_acknowledged = TRUE \
             WHERE subject_type = $1 AND subject_id = $2 AND is_acknowledged = FALSE \
             RETURNING id",
        )
        .bind(subject.kind.as_db())
        .bind(subject.id)
        .fetch_all(conn)
        .await?;
        Ok(ids)
    }

    async fn insert_contact(&mut self, message: &NewContactMessage) -> Result<ContactMessage> {
        let conn = self.conn()?;
        let row = sqlx::query(
            "INSERT INTO contact_messages (email, contact_type, text) VALUES ($1, $2, $3) \
             RETURNING id, email, contact_type, text, is_acknowledged, created_at",
        )
        .bind(&message.email)
        .bind(message.contact_type.as_db())
        .bind(&message.text)
        .fetch_one(conn)
        .await?;

        let contact_type: String = row.get("contact_type");
        let contact_type = ContactType::from_db(&contact_type)
            .ok_or_else(|| anyhow!("unknown contact type: {}", contact_type))?;
        Ok(ContactMessage {
            id: row.get("id"),
            email: row.get("email"),
            contact_type,
            text: row.get("text"),
            is_acknowledged: row.get("is_acknowledged"),
            created_at: row.get("created_at"),
        })
    }

    async fn acknowledge_contact(&mut self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query("UPDATE contact_messages SET is_acknowledged = TRUE WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn insert_category(
        &mut self,
        title: &str,
        display_order: i32,
    ) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let row = sqlx::query(
            "INSERT INTO categories (title, display_order) VALUES ($1, $2) \
             ON CONFLICT (title) DO NOTHING \
             RETURNING id, title, display_order",
        )
        .bind(title)
        .bind(display_order)
        .fetch_optional(conn)
        .await?;
        Ok(row.as_ref().map(category_from_row))
    }

    async fn delete_category(&mut self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| anyhow!("transaction already committed"))?;
        tx.commit().await?;
        Ok(())
    }
}
