use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::app::assets::{thumbnail_path, ImageUpload};
use crate::app::categories::CategoryService;
use crate::app::contact::ContactService;
use crate::app::error::{FieldErrorCode, ValidationErrors};
use crate::app::links::{LinkCounts, LinkInput, LinkService};
use crate::app::moderation::ModerationService;
use crate::app::reports::ReportService;
use crate::domain::action::Action;
use crate::domain::category::Category;
use crate::domain::contact::ContactMessage;
use crate::domain::link::{
    Application, DisplayStatus, Link, LinkFilter, LinkKind, LinkStatus, Page, PageRequest,
    RevisionPair, WebsiteType,
};
use crate::domain::report::Report;
use crate::http::{AppError, AuthUser, MaybeAuthUser, Moderator};
use crate::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    status: &'static str,
}

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

#[derive(Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub next_page: Option<u32>,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

fn page_request(state: &AppState, page: Option<u32>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), state.page_size)
}

fn list_response<T, U>(page: Page<T>, view: impl Fn(T) -> U) -> ListResponse<U> {
    ListResponse {
        items: page.items.into_iter().map(view).collect(),
        next_page: page.next_page,
    }
}

fn parse_kind(kind: &str) -> Result<LinkKind, AppError> {
    LinkKind::from_path(kind).ok_or_else(|| AppError::not_found("unknown link kind"))
}

fn link_service(state: &AppState) -> LinkService {
    LinkService::new(state.store.clone(), state.assets.clone())
}

/// A link as the API returns it, with resolvable image urls.
#[derive(Serialize)]
pub struct LinkView {
    #[serde(flatten)]
    pub link: Link,
    pub image_url: String,
    pub thumbnail_url: String,
}

fn link_view(state: &AppState, link: Link) -> LinkView {
    let image_url = state.assets.public_url(&link.image_path);
    let thumbnail_url = state.assets.public_url(&thumbnail_path(&link.image_path));
    LinkView {
        link,
        image_url,
        thumbnail_url,
    }
}

pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.store.ping().await {
        Ok(()) => "ok",
        Err(err) => {
            tracing::warn!(error = ?err, "store ping failed");
            "degraded"
        }
    };

    Json(HealthResponse { status })
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateCategoryRequest {
    pub title: String,
    pub display_order: Option<i32>,
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, AppError> {
    let service = CategoryService::new(state.store.clone());
    let categories = service.list().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to list categories");
        AppError::internal("failed to list categories")
    })?;
    Ok(Json(categories))
}

pub async fn create_category(
    State(state): State<AppState>,
    Moderator(requester): Moderator,
    Json(payload): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let service = CategoryService::new(state.store.clone());
    let category = service
        .create(&payload.title, payload.display_order.unwrap_or(0), &requester)
        .await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Moderator(requester): Moderator,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let service = CategoryService::new(state.store.clone());
    service.delete(id, &requester).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ListLinksQuery {
    pub page: Option<u32>,
    pub application: Option<String>,
    #[serde(rename = "type")]
    pub website_type: Option<String>,
    pub category: Option<i64>,
}

pub async fn list_links(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<ListLinksQuery>,
) -> Result<Json<ListResponse<LinkView>>, AppError> {
    let kind = parse_kind(&kind)?;
    let filter = LinkFilter {
        application: query
            .application
            .as_deref()
            .map(|value| {
                Application::from_db(value).ok_or_else(|| AppError::bad_request("unknown application"))
            })
            .transpose()?,
        website_type: query
            .website_type
            .as_deref()
            .map(|value| {
                WebsiteType::from_db(value).ok_or_else(|| AppError::bad_request("unknown website type"))
            })
            .transpose()?,
        category_id: query.category,
    };

    let page = link_service(&state)
        .list_published(kind, &filter, page_request(&state, query.page))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list links");
            AppError::internal("failed to list links")
        })?;

    Ok(Json(list_response(page, |link| link_view(&state, link))))
}

#[derive(Deserialize)]
pub struct ImagePayload {
    pub data: String,
    pub content_type: String,
}

#[derive(Deserialize, Default)]
pub struct LinkRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub url: Option<String>,
    pub website_type: Option<String>,
    pub application: Option<String>,
    pub channel_id: Option<String>,
    pub page_id: Option<String>,
    pub image: Option<ImagePayload>,
}

fn choice<T>(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
) -> Option<T> {
    let value = value?.trim();
    let parsed = parse(value);
    if parsed.is_none() {
        errors.add(
            field,
            FieldErrorCode::InvalidChoice,
            format!("\"{}\" is not a valid choice.", value),
        );
    }
    parsed
}

impl LinkRequest {
    fn into_input(self) -> Result<LinkInput, AppError> {
        let mut errors = ValidationErrors::new();
        let website_type = choice(
            &mut errors,
            "website_type",
            self.website_type.as_deref(),
            WebsiteType::from_db,
        );
        let application = choice(
            &mut errors,
            "application",
            self.application.as_deref(),
            Application::from_db,
        );
        let image = match self.image {
            Some(payload) => match STANDARD.decode(payload.data.trim()) {
                Ok(bytes) => Some(ImageUpload {
                    bytes: Bytes::from(bytes),
                    content_type: payload.content_type,
                }),
                Err(_) => {
                    errors.add(
                        "image",
                        FieldErrorCode::InvalidImage,
                        "Upload a valid image. The data is not valid base64.",
                    );
                    None
                }
            },
            None => None,
        };
        if !errors.is_empty() {
            return Err(AppError::validation(errors));
        }

        Ok(LinkInput {
            title: self.title,
            description: self.description,
            category_id: self.category_id,
            url: self.url,
            website_type,
            application,
            channel_id: self.channel_id,
            page_id: self.page_id,
            image,
        })
    }
}

pub async fn create_link(
    State(state): State<AppState>,
    user: AuthUser,
    Path(kind): Path<String>,
    Json(payload): Json<LinkRequest>,
) -> Result<(StatusCode, Json<LinkView>), AppError> {
    let kind = parse_kind(&kind)?;
    let input = payload.into_input()?;
    let link = link_service(&state)
        .create_link(kind, &user.requester(), input)
        .await?;
    Ok((StatusCode::CREATED, Json(link_view(&state, link))))
}

pub async fn get_link(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path((kind, slug)): Path<(String, String)>,
) -> Result<Json<LinkView>, AppError> {
    let kind = parse_kind(&kind)?;
    let requester = user.map(|user| user.requester());
    let link = link_service(&state)
        .get_visible_link(kind, &slug, requester.as_ref())
        .await?;
    Ok(Json(link_view(&state, link)))
}

pub async fn update_link(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, slug)): Path<(String, String)>,
    Json(payload): Json<LinkRequest>,
) -> Result<Json<LinkView>, AppError> {
    let kind = parse_kind(&kind)?;
    let input = payload.into_input()?;
    let link = link_service(&state)
        .update_link(kind, &slug, &user.requester(), input)
        .await?;
    Ok(Json(link_view(&state, link)))
}

pub async fn delete_link(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, slug)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    let kind = parse_kind(&kind)?;
    link_service(&state)
        .delete_link(kind, &slug, &user.requester())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ReportRequest {
    pub email: String,
    pub report_type: String,
    pub text: String,
}

pub async fn report_link(
    State(state): State<AppState>,
    Path((kind, slug)): Path<(String, String)>,
    Json(payload): Json<ReportRequest>,
) -> Result<(StatusCode, Json<Report>), AppError> {
    let kind = parse_kind(&kind)?;
    let service = ReportService::new(state.store.clone());
    let report = service
        .file_report(kind, &slug, &payload.email, &payload.report_type, &payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// ---------------------------------------------------------------------------
// Author dashboard
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct DashboardView {
    #[serde(flatten)]
    pub link: LinkView,
    pub display_status: DisplayStatus,
}

pub async fn dashboard_links(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListResponse<DashboardView>>, AppError> {
    let page = link_service(&state)
        .author_dashboard(user.user_id, page_request(&state, query.page))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to load dashboard");
            AppError::internal("failed to load dashboard")
        })?;

    Ok(Json(list_response(page, |entry| DashboardView {
        link: link_view(&state, entry.link),
        display_status: entry.display_status,
    })))
}

pub async fn dashboard_counts(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<LinkCounts>, AppError> {
    let counts = link_service(&state)
        .author_counts(user.user_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to count links");
            AppError::internal("failed to count links")
        })?;
    Ok(Json(counts))
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

pub async fn list_actions(
    State(state): State<AppState>,
    _moderator: Moderator,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListResponse<Action>>, AppError> {
    let service = ModerationService::new(state.store.clone());
    let page = service
        .list_unacknowledged_actions(page_request(&state, query.page))
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list actions");
            AppError::internal("failed to list actions")
        })?;
    Ok(Json(list_response(page, |action| action)))
}

pub async fn count_actions(
    State(state): State<AppState>,
    _moderator: Moderator,
) -> Result<Json<CountResponse>, AppError> {
    let service = ModerationService::new(state.store.clone());
    let count = service.count_unacknowledged_actions().await.map_err(|err| {
        tracing::error!(error = ?err, "failed to count actions");
        AppError::internal("failed to count actions")
    })?;
    Ok(Json(CountResponse { count }))
}

pub async fn acknowledge_action(
    State(state): State<AppState>,
    Moderator(requester): Moderator,
    Path(id): Path<i64>,
) -> Result<Json<Action>, AppError> {
    let service = ModerationService::new(state.store.clone());
    let action = service.acknowledge_action(id, &requester).await?;
    Ok(Json(action))
}

#[derive(Serialize)]
pub struct ReviewView {
    pub root: LinkView,
    pub child: Option<LinkView>,
    pub display_status: DisplayStatus,
}

fn review_view(state: &AppState, pair: RevisionPair) -> ReviewView {
    let display_status = DisplayStatus::for_pair(&pair);
    ReviewView {
        root: link_view(state, pair.root),
        child: pair.child.map(|child| link_view(state, child)),
        display_status,
    }
}

pub async fn review_link(
    State(state): State<AppState>,
    Moderator(requester): Moderator,
    Path((kind, id)): Path<(String, i64)>,
) -> Result<Json<ReviewView>, AppError> {
    let kind = parse_kind(&kind)?;
    let pair = link_service(&state)
        .get_pair_for_review(kind, id, &requester)
        .await?;
    Ok(Json(review_view(&state, pair)))
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

pub async fn set_link_status(
    State(state): State<AppState>,
    Moderator(requester): Moderator,
    Path((kind, id)): Path<(String, i64)>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<LinkView>, AppError> {
    let kind = parse_kind(&kind)?;
    let status = LinkStatus::from_db(payload.status.trim()).ok_or_else(|| {
        AppError::validation(ValidationErrors::single(
            "status",
            FieldErrorCode::InvalidChoice,
            format!("\"{}\" is not a valid choice.", payload.status.trim()),
        ))
    })?;
    let link = link_service(&state)
        .set_status(kind, id, status, &requester)
        .await?;
    Ok(Json(link_view(&state, link)))
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ContactRequest {
    pub email: String,
    pub contact_type: String,
    pub text: String,
}

pub async fn submit_contact(
    State(state): State<AppState>,
    Json(payload): Json<ContactRequest>,
) -> Result<(StatusCode, Json<ContactMessage>), AppError> {
    let service = ContactService::new(state.store.clone());
    let message = service
        .submit_contact(&payload.email, &payload.contact_type, &payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_choices_are_field_errors() {
        let request = LinkRequest {
            application: Some("myspace".to_string()),
            website_type: Some("shop".to_string()),
            ..LinkRequest::default()
        };
        let err = request.into_input().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn image_payload_is_decoded() {
        let request = LinkRequest {
            application: Some("telegram".to_string()),
            image: Some(ImagePayload {
                data: STANDARD.encode(b"png-bytes"),
                content_type: "image/png".to_string(),
            }),
            ..LinkRequest::default()
        };
        let input = request.into_input().unwrap();
        assert_eq!(input.application, Some(Application::Telegram));
        let image = input.image.unwrap();
        assert_eq!(image.bytes.as_ref(), b"png-bytes");
        assert_eq!(image.content_type, "image/png");
    }

    #[test]
    fn kind_path_segments() {
        assert!(parse_kind("channels").is_ok());
        assert!(parse_kind("podcasts").is_err());
    }
}
