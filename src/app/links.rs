//! Link lifecycle: creation, revisions of published links, merge on
//! publish, deletion and visibility.
//!
//! A root row is what the directory shows. Editing a root never touches it
//! directly; the edit lands in a single draft child which a moderator later
//! publishes, folding it back into the root.

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::assets::{AssetManager, ImageUpload, StoredImage};
use crate::app::duplicates::{is_duplicate, normalize_url, parse_http_url};
use crate::app::error::{FieldErrorCode, LinkError, ValidationErrors};
use crate::app::identifiers::{build_url, normalize_identifier, validate_identifier};
use crate::app::moderation::{acknowledge_events, record_event};
use crate::app::slugs::derive_slug;
use crate::domain::action::{ActionType, SubjectRef};
use crate::domain::link::{
    Application, DisplayStatus, Link, LinkContent, LinkDetails, LinkFilter, LinkKind, LinkStatus,
    NewLink, Page, PageRequest, RevisionPair, WebsiteType,
};
use crate::domain::requester::Requester;
use crate::infra::store::{LinkStore, StoreTx};

pub const TITLE_MAX_CHARS: usize = 60;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Submitted values. On create every field the kind needs must be present;
/// on update missing fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct LinkInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub url: Option<String>,
    pub website_type: Option<WebsiteType>,
    pub application: Option<Application>,
    pub channel_id: Option<String>,
    pub page_id: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardEntry {
    #[serde(flatten)]
    pub link: Link,
    pub display_status: DisplayStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkCounts {
    pub websites: i64,
    pub channels: i64,
    pub groups: i64,
    pub instagrams: i64,
    pub total: i64,
}

fn required<'a>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => Some(value),
        None => {
            errors.add(field, FieldErrorCode::Required, "This field is required.");
            None
        }
    }
}

fn check_length(errors: &mut ValidationErrors, field: &str, value: &str, max: usize) {
    if value.chars().count() > max {
        errors.add(
            field,
            FieldErrorCode::TooLong,
            format!("Ensure this value has at most {} characters.", max),
        );
    }
}

fn required_choice<T: Copy>(errors: &mut ValidationErrors, field: &str, value: Option<T>) -> Option<T> {
    if value.is_none() {
        errors.add(field, FieldErrorCode::Required, "This field is required.");
    }
    value
}

/// Resolves the submitted values against `base` (the record being edited,
/// if any) and runs every field-level rule. Stateless checks only; the
/// store-backed ones live in `check_conflicts`.
pub fn build_content(
    kind: LinkKind,
    base: Option<&Link>,
    input: &LinkInput,
) -> Result<LinkContent, ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let base_content = base.map(|link| &link.content);
    let base_details = base_content.map(|content| &content.details);

    let title = required(
        &mut errors,
        "title",
        input
            .title
            .as_deref()
            .or(base_content.map(|content| content.title.as_str())),
    )
    .map(str::to_string);
    if let Some(title) = &title {
        check_length(&mut errors, "title", title, TITLE_MAX_CHARS);
    }

    let description = input
        .description
        .as_deref()
        .or(base_content.map(|content| content.description.as_str()))
        .unwrap_or("")
        .trim()
        .to_string();
    check_length(&mut errors, "description", &description, DESCRIPTION_MAX_CHARS);

    let category_id = input
        .category_id
        .or(base_content.and_then(|content| content.category_id));

    let base_url = base_content.map(|content| content.url.as_str());
    let base_application = base_details.and_then(LinkDetails::application);

    let resolved = match kind {
        LinkKind::Website => {
            let website_type = required_choice(
                &mut errors,
                "website_type",
                input.website_type.or(match base_details {
                    Some(LinkDetails::Website { website_type }) => Some(*website_type),
                    _ => None,
                }),
            );
            let url = required(&mut errors, "url", input.url.as_deref().or(base_url))
                .and_then(|raw| match parse_http_url(raw) {
                    Ok(parsed) => Some(parsed.to_string()),
                    Err(url_errors) => {
                        errors.merge(url_errors);
                        None
                    }
                });
            match (website_type, url) {
                (Some(website_type), Some(url)) => Some((url, LinkDetails::Website { website_type })),
                _ => None,
            }
        }
        LinkKind::Channel => {
            let application = required_choice(
                &mut errors,
                "application",
                input.application.or(base_application),
            );
            let channel_id = required(
                &mut errors,
                "channel_id",
                input.channel_id.as_deref().or(match base_details {
                    Some(LinkDetails::Channel { channel_id, .. }) => Some(channel_id.as_str()),
                    _ => None,
                }),
            )
            .map(normalize_identifier);

            match (application, channel_id) {
                (Some(application), Some(channel_id)) => {
                    let checked = validate_identifier(kind, &channel_id, Some(application))
                        .and_then(|_| build_url(kind, &channel_id, Some(application)));
                    match checked {
                        Ok(url) => Some((
                            url,
                            LinkDetails::Channel {
                                application,
                                channel_id,
                            },
                        )),
                        Err(identifier_errors) => {
                            errors.merge(identifier_errors);
                            None
                        }
                    }
                }
                _ => None,
            }
        }
        LinkKind::Group => {
            let application = required_choice(
                &mut errors,
                "application",
                input.application.or(base_application),
            );
            let url = required(&mut errors, "url", input.url.as_deref().or(base_url))
                .and_then(|raw| match parse_http_url(raw) {
                    Ok(parsed) => Some(parsed.to_string()),
                    Err(url_errors) => {
                        errors.merge(url_errors);
                        None
                    }
                });
            let group_uuid = match base_details {
                Some(LinkDetails::Group { group_uuid, .. }) => *group_uuid,
                _ => Uuid::new_v4(),
            };
            match (application, url) {
                (Some(application), Some(url)) => Some((
                    url,
                    LinkDetails::Group {
                        application,
                        group_uuid,
                    },
                )),
                _ => None,
            }
        }
        LinkKind::Instagram => {
            let page_id = required(
                &mut errors,
                "page_id",
                input.page_id.as_deref().or(match base_details {
                    Some(LinkDetails::Instagram { page_id }) => Some(page_id.as_str()),
                    _ => None,
                }),
            )
            .map(normalize_identifier);

            match page_id {
                Some(page_id) => {
                    let checked = validate_identifier(kind, &page_id, None)
                        .and_then(|_| build_url(kind, &page_id, None));
                    match checked {
                        Ok(url) => Some((url, LinkDetails::Instagram { page_id })),
                        Err(identifier_errors) => {
                            errors.merge(identifier_errors);
                            None
                        }
                    }
                }
                None => None,
            }
        }
    };

    match (title, resolved) {
        (Some(title), Some((url, details))) if errors.is_empty() => Ok(LinkContent {
            title,
            url,
            category_id,
            description,
            details,
        }),
        _ => Err(errors),
    }
}

#[derive(Clone)]
pub struct LinkService {
    store: Arc<dyn LinkStore>,
    assets: AssetManager,
}

impl LinkService {
    pub fn new(store: Arc<dyn LinkStore>, assets: AssetManager) -> Self {
        Self { store, assets }
    }

    pub async fn create_link(
        &self,
        kind: LinkKind,
        requester: &Requester,
        input: LinkInput,
    ) -> Result<Link, LinkError> {
        let mut errors = ValidationErrors::new();
        let content = build_content(kind, None, &input).map_err(|e| errors.merge(e)).ok();
        match &input.image {
            Some(upload) => {
                if let Err(image_errors) = self.assets.check_upload(upload) {
                    errors.merge(image_errors);
                }
            }
            None => errors.add("image", FieldErrorCode::Required, "An image is required."),
        }
        let (Some(content), Some(upload)) = (content, input.image.as_ref()) else {
            return Err(LinkError::Validation(errors));
        };
        errors.into_result()?;

        let slug = derive_slug(&content.url, &content.details);
        let mut tx = self.store.begin().await?;
        tx.lock_url_key(kind, &normalize_url(&content.url)).await?;
        check_conflicts(tx.as_mut(), kind, &content, &slug, &[]).await?;

        let image = self.assets.attach_image(kind, upload).await?;
        let new_link = NewLink {
            parent_id: None,
            author_id: requester.user_id,
            slug,
            content,
            image_path: image.path.clone(),
            status: LinkStatus::Draft,
        };

        match write_root(tx.as_mut(), &new_link).await {
            Ok(link) => {
                tracing::info!(kind = kind.as_db(), slug = %link.slug, id = link.id, "link created");
                Ok(link)
            }
            Err(err) => {
                drop(tx);
                self.discard(&image).await;
                Err(err)
            }
        }
    }

    pub async fn update_link(
        &self,
        kind: LinkKind,
        slug: &str,
        requester: &Requester,
        input: LinkInput,
    ) -> Result<Link, LinkError> {
        let mut tx = self.store.begin().await?;
        let pair = tx
            .lock_pair_by_slug(kind, slug)
            .await?
            .ok_or(LinkError::NotFound)?;
        if pair.root.author_id != requester.user_id {
            return Err(LinkError::PermissionDenied);
        }

        let current = pair.current().clone();
        let mut errors = ValidationErrors::new();
        let content = build_content(kind, Some(&current), &input)
            .map_err(|e| errors.merge(e))
            .ok();
        if let Some(upload) = &input.image {
            if let Err(image_errors) = self.assets.check_upload(upload) {
                errors.merge(image_errors);
            }
        }
        let Some(content) = content else {
            return Err(LinkError::Validation(errors));
        };
        errors.into_result()?;

        if content == current.content && input.image.is_none() {
            return Ok(current);
        }

        let new_slug = derive_slug(&content.url, &content.details);
        let own_ids = pair.ids();
        tx.lock_url_key(kind, &normalize_url(&content.url)).await?;
        check_conflicts(tx.as_mut(), kind, &content, &new_slug, &own_ids).await?;

        let image = match &input.image {
            Some(upload) => Some(self.assets.attach_image(kind, upload).await?),
            None => None,
        };
        let image_path = image
            .as_ref()
            .map(|image| image.path.clone())
            .unwrap_or_else(|| current.image_path.clone());

        let written = match &pair.child {
            Some(child) => {
                let mut revision = child.clone();
                revision.slug = new_slug;
                revision.content = content;
                revision.image_path = image_path;
                revision.status = LinkStatus::Draft;
                write_revision(tx.as_mut(), Revision::Existing(revision)).await
            }
            None => {
                let revision = NewLink {
                    parent_id: Some(pair.root.id),
                    author_id: pair.root.author_id,
                    slug: new_slug,
                    content,
                    image_path,
                    status: LinkStatus::Draft,
                };
                write_revision(tx.as_mut(), Revision::New(revision)).await
            }
        };

        let revision = match written {
            Ok(revision) => revision,
            Err(err) => {
                drop(tx);
                if let Some(image) = &image {
                    self.discard(image).await;
                }
                return Err(err);
            }
        };
        drop(tx);

        // The replaced child image goes unless the root still shows it.
        if let (Some(_), Some(old_child)) = (&image, &pair.child) {
            if old_child.image_path != pair.root.image_path
                && old_child.image_path != revision.image_path
            {
                self.assets
                    .remove_files([old_child.image_path.clone()])
                    .await;
            }
        }

        tracing::info!(kind = kind.as_db(), slug = %slug, revision_id = revision.id, "link revision saved");
        Ok(revision)
    }

    /// Publishes or unpublishes one record. Publishing a revision merges it
    /// into its root.
    pub async fn set_status(
        &self,
        kind: LinkKind,
        id: i64,
        status: LinkStatus,
        requester: &Requester,
    ) -> Result<Link, LinkError> {
        if !requester.is_moderator() {
            return Err(LinkError::PermissionDenied);
        }

        let mut tx = self.store.begin().await?;
        let pair = tx
            .lock_pair_by_id(kind, id)
            .await?
            .ok_or(LinkError::NotFound)?;

        match &pair.child {
            Some(child) if child.id == id => {
                if status == LinkStatus::Draft {
                    let mut revision = child.clone();
                    revision.status = LinkStatus::Draft;
                    let saved = tx.update_link(&revision).await?;
                    tx.commit().await?;
                    return Ok(saved);
                }

                // Another pair may have claimed the slug since the revision was saved.
                let slug_taken = tx
                    .slug_owners(kind, &child.slug)
                    .await?
                    .iter()
                    .any(|owner| *owner != pair.root.id);
                if slug_taken {
                    return Err(LinkError::field(
                        kind.duplicate_field(),
                        FieldErrorCode::DuplicateUrl,
                        "This link has already been registered.",
                    ));
                }

                let old_root_image = pair.root.image_path.clone();
                let mut root = pair.root.clone();
                root.absorb(child);
                root.status = LinkStatus::Published;
                tx.delete_link(kind, child.id).await?;
                let merged = tx.update_link(&root).await?;
                acknowledge_events(
                    tx.as_mut(),
                    SubjectRef::link(kind, child.id),
                    Some(ActionType::LinkUpdated),
                )
                .await?;
                tx.commit().await?;
                drop(tx);

                if old_root_image != merged.image_path {
                    self.assets.remove_files([old_root_image]).await;
                }
                tracing::info!(kind = kind.as_db(), root_id = merged.id, child_id = child.id, "revision merged");
                Ok(merged)
            }
            _ => {
                let mut root = pair.root.clone();
                root.status = status;
                let saved = tx.update_link(&root).await?;
                if status == LinkStatus::Published {
                    acknowledge_events(
                        tx.as_mut(),
                        SubjectRef::link(kind, root.id),
                        Some(ActionType::LinkCreated),
                    )
                    .await?;
                }
                tx.commit().await?;
                tracing::info!(kind = kind.as_db(), id = saved.id, status = status.as_db(), "link status changed");
                Ok(saved)
            }
        }
    }

    pub async fn delete_link(
        &self,
        kind: LinkKind,
        slug: &str,
        requester: &Requester,
    ) -> Result<(), LinkError> {
        let mut tx = self.store.begin().await?;
        let pair = tx
            .lock_pair_by_slug(kind, slug)
            .await?
            .ok_or(LinkError::NotFound)?;
        if pair.root.author_id != requester.user_id {
            return Err(LinkError::PermissionDenied);
        }

        if let Some(child) = &pair.child {
            tx.delete_link(kind, child.id).await?;
        }
        tx.delete_link(kind, pair.root.id).await?;
        for id in pair.ids() {
            acknowledge_events(tx.as_mut(), SubjectRef::link(kind, id), None).await?;
            for report_id in tx.acknowledge_reports_on(SubjectRef::link(kind, id)).await? {
                acknowledge_events(tx.as_mut(), SubjectRef::report(report_id), None).await?;
            }
        }
        tx.commit().await?;
        drop(tx);

        self.assets.remove_assets(&pair).await;
        tracing::info!(kind = kind.as_db(), slug = %slug, "link deleted");
        Ok(())
    }

    /// What `requester` gets to see at this slug. Authors see their pending
    /// revision; everyone else sees the published root or nothing.
    pub async fn get_visible_link(
        &self,
        kind: LinkKind,
        slug: &str,
        requester: Option<&Requester>,
    ) -> Result<Link, LinkError> {
        let pair = self
            .store
            .find_pair_by_slug(kind, slug)
            .await?
            .ok_or(LinkError::NotFound)?;

        let settled = pair.root.is_published()
            && pair.child.as_ref().map_or(true, Link::is_published);
        if settled {
            return Ok(pair.root);
        }

        let is_author = requester.map_or(false, |requester| requester.user_id == pair.root.author_id);
        if is_author {
            return Ok(pair.current().clone());
        }
        if pair.root.is_published() {
            Ok(pair.root)
        } else {
            Err(LinkError::NotFound)
        }
    }

    /// Root and revision side by side, for review.
    pub async fn get_pair_for_review(
        &self,
        kind: LinkKind,
        id: i64,
        requester: &Requester,
    ) -> Result<RevisionPair, LinkError> {
        if !requester.is_moderator() {
            return Err(LinkError::PermissionDenied);
        }
        self.store
            .find_pair_by_id(kind, id)
            .await?
            .ok_or(LinkError::NotFound)
    }

    pub async fn list_published(
        &self,
        kind: LinkKind,
        filter: &LinkFilter,
        page: PageRequest,
    ) -> Result<Page<Link>> {
        let rows = self
            .store
            .list_published(kind, &filter.for_kind(kind), page)
            .await?;
        Ok(Page::from_rows(rows, page))
    }

    /// The author's links, newest activity first, each shown as the
    /// revision being worked on.
    pub async fn author_dashboard(
        &self,
        author_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<DashboardEntry>> {
        let mut entries: Vec<DashboardEntry> = self
            .author_pairs(author_id)
            .await?
            .into_iter()
            .map(|pair| DashboardEntry {
                display_status: DisplayStatus::for_pair(&pair),
                link: pair.current().clone(),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.link
                .updated_at
                .cmp(&a.link.updated_at)
                .then_with(|| b.link.id.cmp(&a.link.id))
        });

        let rows = entries
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.fetch_limit() as usize)
            .collect();
        Ok(Page::from_rows(rows, page))
    }

    pub async fn author_counts(&self, author_id: Uuid) -> Result<LinkCounts> {
        let mut counts = LinkCounts::default();
        for pair in self.author_pairs(author_id).await? {
            match pair.kind() {
                LinkKind::Website => counts.websites += 1,
                LinkKind::Channel => counts.channels += 1,
                LinkKind::Group => counts.groups += 1,
                LinkKind::Instagram => counts.instagrams += 1,
            }
            counts.total += 1;
        }
        Ok(counts)
    }

    async fn author_pairs(&self, author_id: Uuid) -> Result<Vec<RevisionPair>> {
        let rows = self.store.list_by_author(author_id).await?;
        let (roots, children): (Vec<Link>, Vec<Link>) = rows.into_iter().partition(Link::is_root);

        let mut children: HashMap<(LinkKind, i64), Link> = children
            .into_iter()
            .filter_map(|child| child.parent_id.map(|parent| ((child.kind(), parent), child)))
            .collect();

        Ok(roots
            .into_iter()
            .map(|root| {
                let child = children.remove(&(root.kind(), root.id));
                RevisionPair { root, child }
            })
            .collect())
    }

    async fn discard(&self, image: &StoredImage) {
        self.assets.remove_files([image.path.clone()]).await;
    }
}

/// Checks that need the store: the category must exist, and neither the
/// url nor the derived slug may belong to a record outside `own_ids`.
async fn check_conflicts(
    tx: &mut dyn StoreTx,
    kind: LinkKind,
    content: &LinkContent,
    slug: &str,
    own_ids: &[i64],
) -> Result<(), LinkError> {
    let mut errors = ValidationErrors::new();

    if let Some(category_id) = content.category_id {
        if !tx.category_exists(category_id).await? {
            errors.add(
                "category_id",
                FieldErrorCode::UnknownCategory,
                "Select a valid category.",
            );
        }
    }

    let slug_taken = tx
        .slug_owners(kind, slug)
        .await?
        .iter()
        .any(|owner| !own_ids.contains(owner));
    if slug_taken || is_duplicate(tx, kind, &content.url, own_ids).await? {
        errors.add(
            kind.duplicate_field(),
            FieldErrorCode::DuplicateUrl,
            "This link has already been registered.",
        );
    }

    errors.into_result()
}

async fn write_root(tx: &mut dyn StoreTx, new_link: &NewLink) -> Result<Link, LinkError> {
    let link = tx.insert_link(new_link).await?;
    record_event(
        tx,
        ActionType::LinkCreated,
        SubjectRef::link(link.kind(), link.id),
    )
    .await?;
    tx.commit().await?;
    Ok(link)
}

enum Revision {
    New(NewLink),
    Existing(Link),
}

async fn write_revision(tx: &mut dyn StoreTx, revision: Revision) -> Result<Link, LinkError> {
    let saved = match revision {
        Revision::New(new_link) => tx
            .insert_child(&new_link)
            .await?
            .ok_or(LinkError::IntegrityRace)?,
        Revision::Existing(link) => tx.update_link(&link).await?,
    };
    record_event(
        tx,
        ActionType::LinkUpdated,
        SubjectRef::link(saved.kind(), saved.id),
    )
    .await?;
    tx.commit().await?;
    Ok(saved)
}
