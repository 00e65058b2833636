#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use tokio::sync::OnceCell;
use tower::ServiceExt;
use uuid::Uuid;

use homelinks::app::auth::AuthService;
use homelinks::config::AppConfig;
use homelinks::AppState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// "0123456789abcdef0123456789abcdef" (32 bytes), test-only key
const TEST_PASETO_ACCESS_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
const TEST_ADMIN_TOKEN: &str = "test-admin-token-12345";

// ---------------------------------------------------------------------------
// TestApp
// ---------------------------------------------------------------------------

pub struct TestApp {
    router: Router,
    pub state: AppState,
    media_dir: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }

    /// Codes reported for one field of a validation error.
    pub fn field_codes(&self, field: &str) -> Vec<String> {
        self.json()["fields"][field]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|error| error["code"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub access_token: String,
}

static TEST_APP: OnceCell<TestApp> = OnceCell::const_new();

/// Get (or lazily create) the shared TestApp instance. Tests sharing it must
/// use their own identifiers.
pub async fn app() -> &'static TestApp {
    TEST_APP.get_or_init(|| async { TestApp::setup().await }).await
}

/// A TestApp with its own empty store, for assertions on global counts.
pub async fn isolated_app() -> TestApp {
    TestApp::setup().await
}

fn test_config() -> AppConfig {
    std::env::set_var("STORE_BACKEND", "memory");
    std::env::set_var("MEDIA_BACKEND", "local");
    std::env::set_var("MEDIA_URL_PREFIX", "/media");
    std::env::set_var("PASETO_ACCESS_KEY", TEST_PASETO_ACCESS_KEY);
    std::env::set_var("ADMIN_TOKEN", TEST_ADMIN_TOKEN);
    std::env::set_var("APP_MODE", "api");
    std::env::set_var("PAGE_SIZE", "5");

    AppConfig::from_env().expect("failed to build AppConfig")
}

impl TestApp {
    async fn setup() -> Self {
        let media_dir = TempDir::new().expect("failed to create media dir");
        let mut config = test_config();
        config.media_root = media_dir.path().to_string_lossy().into_owned();

        let state = AppState::from_config(&config)
            .await
            .expect("failed to build AppState");
        let router = homelinks::http::router(state.clone());

        TestApp {
            router,
            state,
            media_dir,
        }
    }

    // ------------------------------------------------------------------
    // Low-level request helper
    // ------------------------------------------------------------------
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");

        for &(key, value) in headers {
            builder = builder.header(key, value);
        }

        let request = if let Some(body) = body {
            builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap()
        } else {
            builder.body(Body::empty()).unwrap()
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    // ------------------------------------------------------------------
    // Convenience HTTP helpers
    // ------------------------------------------------------------------
    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    pub async fn post_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    pub async fn patch_json(&self, path: &str, body: Value, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::PATCH, path, Some(body), &headers).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        let auth;
        if let Some(t) = token {
            auth = format!("Bearer {}", t);
            headers.push(("Authorization", auth.as_str()));
        }
        self.request(Method::DELETE, path, None, &headers).await
    }

    /// POST with an admin token in the x-admin-token header.
    pub async fn post_admin(
        &self,
        path: &str,
        body: Value,
        admin_token: Option<&str>,
    ) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::POST, path, Some(body), &headers).await
    }

    /// GET with an admin token in the x-admin-token header.
    pub async fn get_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::GET, path, None, &headers).await
    }

    /// DELETE with an admin token in the x-admin-token header.
    pub async fn delete_admin(&self, path: &str, admin_token: Option<&str>) -> TestResponse {
        let mut headers = vec![];
        if let Some(t) = admin_token {
            headers.push(("x-admin-token", t));
        }
        self.request(Method::DELETE, path, None, &headers).await
    }

    // ------------------------------------------------------------------
    // Test data helpers
    // ------------------------------------------------------------------

    /// Issue an access token for a fresh user id. Accounts live elsewhere, so
    /// a valid token is all a user is here.
    pub fn create_user(&self) -> TestUser {
        let id = Uuid::new_v4();
        let auth_service =
            AuthService::new(self.state.paseto_access_key, self.state.access_ttl_minutes);
        let token = auth_service
            .issue_access_token(id)
            .expect("issue_access_token failed");
        TestUser {
            id,
            access_token: token.access_token,
        }
    }

    /// Return the admin token used by the test infrastructure.
    pub fn admin_token(&self) -> &str {
        TEST_ADMIN_TOKEN
    }

    pub fn media_root(&self) -> &Path {
        self.media_dir.path()
    }

    /// Whether a stored media path exists on disk.
    pub fn media_exists(&self, path: &str) -> bool {
        self.media_root().join(path).exists()
    }

    /// Create a telegram channel via the API and return the response body.
    pub async fn create_channel(&self, user: &TestUser, channel_id: &str) -> Value {
        let resp = self
            .post_json(
                "/v1/links/channels",
                json!({
                    "title": format!("Channel {}", channel_id),
                    "description": "A test channel",
                    "application": "telegram",
                    "channel_id": channel_id,
                    "image": png_payload(400, 300),
                }),
                Some(&user.access_token),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.json());
        resp.json()
    }

    /// Publish a record as a moderator.
    pub async fn publish(&self, kind: &str, id: i64) -> TestResponse {
        self.post_admin(
            &format!("/v1/moderation/links/{}/{}/status", kind, id),
            json!({ "status": "published" }),
            Some(self.admin_token()),
        )
        .await
    }
}

/// PNG bytes of a solid image.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("failed to encode png");
    bytes
}

/// The JSON image object the link endpoints accept.
pub fn png_payload(width: u32, height: u32) -> Value {
    json!({
        "data": STANDARD.encode(png_bytes(width, height)),
        "content_type": "image/png",
    })
}

/// A channel id no other test uses.
pub fn unique_id(prefix: &str) -> String {
    format!("{}{}", prefix, &Uuid::new_v4().simple().to_string()[..10])
}
