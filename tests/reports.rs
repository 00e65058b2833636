//! Reports, Contact and Category Tests
//!
//! Covers anonymous reports against published links, contact messages, and
//! moderator-managed categories.

mod common;

use axum::http::StatusCode;
use common::{app, isolated_app, png_payload, unique_id};
use serde_json::json;

// ===========================================================================
// Reports
// ===========================================================================

#[tokio::test]
async fn report_against_published_link() {
    let app = isolated_app().await;
    let user = app.create_user();
    let channel_id = unique_id("report");
    let created = app.create_channel(&user, &channel_id).await;
    let root_id = created["id"].as_i64().unwrap();
    app.publish("channels", root_id).await;

    let resp = app
        .post_json(
            &format!("/v1/links/channels/telegram-{}/report", channel_id),
            json!({
                "email": "reader@example.com",
                "report_type": "broken_link",
                "text": "The channel no longer exists.",
            }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.json());
    let report = resp.json();
    assert_eq!(report["report_type"], "broken_link");
    assert_eq!(report["subject_type"], "channel");
    assert_eq!(report["subject_id"], root_id);
    assert_eq!(report["url"], format!("https://t.me/{}/", channel_id));
    assert_eq!(report["is_acknowledged"], false);

    let items = app
        .get_admin("/v1/moderation/actions", Some(app.admin_token()))
        .await
        .json()["items"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["action_type"], "link reported");
    assert_eq!(items[0]["subject_type"], "report");
    assert_eq!(items[0]["subject_id"], report["id"]);

    let resp = app
        .post_admin(
            &format!("/v1/moderation/actions/{}/acknowledge", items[0]["id"]),
            json!({}),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn deleting_a_reported_link_closes_its_reports() {
    let app = isolated_app().await;
    let user = app.create_user();
    let channel_id = unique_id("gone");
    let created = app.create_channel(&user, &channel_id).await;
    app.publish("channels", created["id"].as_i64().unwrap()).await;

    let path = format!("/v1/links/channels/telegram-{}", channel_id);
    for text in ["Broken.", "Still broken."] {
        let resp = app
            .post_json(
                &format!("{}/report", path),
                json!({
                    "email": "reader@example.com",
                    "report_type": "broken_link",
                    "text": text,
                }),
                None,
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED);
    }
    let count = app
        .get_admin("/v1/moderation/actions/count", Some(app.admin_token()))
        .await;
    assert_eq!(count.json()["count"], 2);

    let resp = app.delete(&path, Some(&user.access_token)).await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let count = app
        .get_admin("/v1/moderation/actions/count", Some(app.admin_token()))
        .await;
    assert_eq!(count.json()["count"], 0);
}

#[tokio::test]
async fn drafts_cannot_be_reported() {
    let app = app().await;
    let user = app.create_user();
    let channel_id = unique_id("hidden");
    app.create_channel(&user, &channel_id).await;

    let resp = app
        .post_json(
            &format!("/v1/links/channels/telegram-{}/report", channel_id),
            json!({
                "email": "reader@example.com",
                "report_type": "broken_link",
                "text": "Where is it?",
            }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_fields_are_validated() {
    let app = app().await;
    let user = app.create_user();
    let channel_id = unique_id("badrep");
    let created = app.create_channel(&user, &channel_id).await;
    app.publish("channels", created["id"].as_i64().unwrap()).await;

    let resp = app
        .post_json(
            &format!("/v1/links/channels/telegram-{}/report", channel_id),
            json!({
                "email": "not-an-email",
                "report_type": "spam",
                "text": "",
            }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.field_codes("email"), vec!["invalid_email"]);
    assert_eq!(resp.field_codes("report_type"), vec!["invalid_choice"]);
    assert_eq!(resp.field_codes("text"), vec!["required"]);
}

// ===========================================================================
// Contact
// ===========================================================================

#[tokio::test]
async fn contact_message_is_queued() {
    let app = isolated_app().await;
    let resp = app
        .post_json(
            "/v1/contact",
            json!({
                "email": "someone@example.com",
                "contact_type": "suggestion",
                "text": "Please add a podcasts section.",
            }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let message = resp.json();
    assert_eq!(message["contact_type"], "suggestion");

    let items = app
        .get_admin("/v1/moderation/actions", Some(app.admin_token()))
        .await
        .json()["items"]
        .as_array()
        .unwrap()
        .clone();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["action_type"], "contact us");
    assert_eq!(items[0]["subject_type"], "contact_message");
    assert_eq!(items[0]["subject_id"], message["id"]);
}

#[tokio::test]
async fn contact_type_must_be_known() {
    let app = app().await;
    let resp = app
        .post_json(
            "/v1/contact",
            json!({
                "email": "someone@example.com",
                "contact_type": "complaint",
                "text": "Hello",
            }),
            None,
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.field_codes("contact_type"), vec!["invalid_choice"]);
}

// ===========================================================================
// Categories
// ===========================================================================

#[tokio::test]
async fn categories_are_managed_by_moderators() {
    let app = isolated_app().await;
    let user = app.create_user();

    let resp = app
        .post_json("/v1/categories", json!({ "title": "News" }), Some(&user.access_token))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let news = app
        .post_admin(
            "/v1/categories",
            json!({ "title": "News", "display_order": 2 }),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(news.status, StatusCode::CREATED);
    let sports = app
        .post_admin(
            "/v1/categories",
            json!({ "title": "Sports", "display_order": 1 }),
            Some(app.admin_token()),
        )
        .await;
    assert_eq!(sports.status, StatusCode::CREATED);

    let duplicate = app
        .post_admin("/v1/categories", json!({ "title": "News" }), Some(app.admin_token()))
        .await;
    assert_eq!(duplicate.status, StatusCode::BAD_REQUEST);
    assert_eq!(duplicate.field_codes("title"), vec!["duplicate_title"]);

    let list = app.get("/v1/categories", None).await;
    let titles: Vec<String> = list
        .json()
        .as_array()
        .unwrap()
        .iter()
        .map(|category| category["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Sports", "News"]);
}

#[tokio::test]
async fn deleting_a_category_uncategorizes_its_links() {
    let app = isolated_app().await;
    let user = app.create_user();
    let category = app
        .post_admin("/v1/categories", json!({ "title": "Tech" }), Some(app.admin_token()))
        .await
        .json();
    let category_id = category["id"].as_i64().unwrap();

    let channel_id = unique_id("tech");
    let resp = app
        .post_json(
            "/v1/links/channels",
            json!({
                "title": "Tech news",
                "application": "telegram",
                "channel_id": channel_id,
                "category_id": category_id,
                "image": png_payload(40, 30),
            }),
            Some(&user.access_token),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.json());
    assert_eq!(resp.json()["category_id"], category_id);

    let resp = app
        .delete_admin(&format!("/v1/categories/{}", category_id), Some(app.admin_token()))
        .await;
    assert_eq!(resp.status, StatusCode::NO_CONTENT);

    let link = app
        .get(
            &format!("/v1/links/channels/telegram-{}", channel_id),
            Some(&user.access_token),
        )
        .await;
    assert!(link.json()["category_id"].is_null());

    let resp = app
        .delete_admin(&format!("/v1/categories/{}", category_id), Some(app.admin_token()))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app().await;
    let resp = app.get("/health", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["status"], "ok");
}
