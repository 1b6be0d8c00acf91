use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use keygate_api::app::{self, services::{self, AppServices, Stores}};
use keygate_api::config::AppConfig;
use keygate_audit::{AuditEntry, AuditFilter, AuditPage, AuditSink, AuditSinkError, Pagination};
use keygate_auth::HasherSettings;
use reqwest::StatusCode;
use serde_json::{Value, json};

const ADMIN_EMAIL: &str = "admin@example.com";
const ADMIN_PASSWORD: &str = "Admin123!";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    config: AppConfig,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

fn test_config() -> AppConfig {
    AppConfig {
        hasher: HasherSettings {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        ..AppConfig::default()
    }
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(Stores::in_memory()).await
    }

    async fn spawn_with(stores: Stores) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = test_config();
        let services = Arc::new(services::build_services(&config, stores).await.expect("services"));
        let app = app::build_app(services.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        });

        Self {
            base_url,
            services,
            config,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn admin_token(&self) -> String {
        let res = self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["accessToken"].as_str().unwrap().to_string()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn create_user(&self, token: &str, email: &str, password: &str) -> Value {
        let res = self
            .post(
                token,
                "/admin/users",
                json!({ "email": email, "fullName": "Test User", "password": password }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    async fn create_role(&self, token: &str, name: &str) -> Value {
        let res = self.post(token, "/admin/roles", json!({ "name": name })).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        res.json().await.unwrap()
    }

    /// Recording is fire-and-forget, so poll until an entry with `action` shows up.
    async fn wait_for_audit(&self, token: &str, query: &str, action: &str) -> Option<Value> {
        for _ in 0..50 {
            let res = self
                .client
                .get(self.url(&format!("/admin/audit?{query}")))
                .bearer_auth(token)
                .send()
                .await
                .unwrap();
            let page: Value = res.json().await.unwrap();
            let found = page["entries"]
                .as_array()
                .unwrap()
                .iter()
                .find(|e| e["action"] == action)
                .cloned();
            if found.is_some() {
                return found;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        None
    }

    fn decode(&self, token: &str) -> Value {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        jsonwebtoken::decode::<Value>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .expect("token should decode")
        .claims
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct FailingSink;

#[async_trait]
impl AuditSink for FailingSink {
    async fn append(&self, _entry: AuditEntry) -> Result<(), AuditSinkError> {
        Err(AuditSinkError::Unavailable("audit database down".into()))
    }

    async fn query(&self, _filter: AuditFilter, _pagination: Pagination) -> Result<AuditPage, AuditSinkError> {
        Err(AuditSinkError::Unavailable("audit database down".into()))
    }
}

#[tokio::test]
async fn admin_login_returns_admin_role_and_hour_long_token() {
    let srv = TestServer::spawn().await;
    let before = Utc::now();

    let res = srv.login(ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();

    assert_eq!(body["user"]["email"], ADMIN_EMAIL);
    assert_eq!(body["user"]["roles"], json!(["Admin"]));
    assert!(body["user"].get("passwordHash").is_none());
    assert!(!body["refreshToken"].as_str().unwrap().is_empty());

    let claims = srv.decode(body["accessToken"].as_str().unwrap());
    assert_eq!(claims["role"], json!(["Admin"]));
    assert_eq!(claims["email"], ADMIN_EMAIL);
    assert_eq!(claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(), 3600);

    let expires_at: DateTime<Utc> = body["expiresAt"].as_str().unwrap().parse().unwrap();
    let expected = before + ChronoDuration::minutes(60);
    assert!((expires_at - expected).num_seconds().abs() < 30);
}

#[tokio::test]
async fn login_failures_are_generic() {
    let srv = TestServer::spawn().await;

    let wrong_password = srv.login(ADMIN_EMAIL, "wrong-password").await;
    let unknown_email = srv.login("nobody@example.com", ADMIN_PASSWORD).await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

    let a: Value = wrong_password.json().await.unwrap();
    let b: Value = unknown_email.json().await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a["error"], "invalid_credentials");
}

#[tokio::test]
async fn protected_routes_distinguish_401_from_403() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let res = srv.client.get(srv.url("/admin/users")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = srv
        .client
        .get(srv.url("/auth/me"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    srv.create_user(&admin, "clerk@example.com", "clerk-password").await;
    let res = srv.login("clerk@example.com", "clerk-password").await;
    let clerk: Value = res.json().await.unwrap();
    let clerk_token = clerk["accessToken"].as_str().unwrap();

    let res = srv
        .client
        .get(srv.url("/admin/users"))
        .bearer_auth(clerk_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "forbidden", "message": "required role not met" }));

    let res = srv
        .client
        .get(srv.url("/auth/me"))
        .bearer_auth(clerk_token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["email"], "clerk@example.com");
    assert_eq!(me["roles"], json!([]));
}

#[tokio::test]
async fn refresh_picks_up_role_changes_and_rotates() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let user = srv.create_user(&admin, "auditor@example.com", "auditor-password").await;
    let res = srv.login("auditor@example.com", "auditor-password").await;
    let first: Value = res.json().await.unwrap();
    assert_eq!(srv.decode(first["accessToken"].as_str().unwrap())["role"], json!([]));

    let role = srv.create_role(&admin, "Auditor").await;
    let res = srv
        .post(
            &admin,
            &format!("/admin/users/{}/roles", user["id"]),
            json!({ "roleId": role["id"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    // No access token is sent with the refresh call.
    let res = srv
        .client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refreshToken": first["refreshToken"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let second: Value = res.json().await.unwrap();
    assert_eq!(srv.decode(second["accessToken"].as_str().unwrap())["role"], json!(["Auditor"]));
    assert_eq!(second["user"]["roles"], json!(["Auditor"]));

    let replay = srv
        .client
        .post(srv.url("/auth/refresh"))
        .json(&json!({ "refreshToken": first["refreshToken"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_membership_is_a_conflict() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let user = srv.create_user(&admin, "dup@example.com", "dup-password").await;
    let role = srv.create_role(&admin, "Manager").await;
    let path = format!("/admin/users/{}/roles", user["id"]);

    let first = srv.post(&admin, &path, json!({ "roleId": role["id"] })).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = srv.post(&admin, &path, json!({ "roleId": role["id"] })).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "conflict");

    let res = srv
        .client
        .get(srv.url(&format!("/admin/users/{}", user["id"])))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched["roles"], json!(["Manager"]));
}

#[tokio::test]
async fn repeated_role_ids_on_create_are_collapsed() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;
    let role = srv.create_role(&admin, "Auditor").await;

    let res = srv
        .post(
            &admin,
            "/admin/users",
            json!({
                "email": "twice@example.com",
                "fullName": "Twice",
                "password": "twice-password",
                "roleIds": [role["id"], role["id"]],
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    assert_eq!(created["roles"], json!(["Auditor"]));

    let entry = srv
        .wait_for_audit(&admin, &format!("entityType=Identity&entityId={}", created["id"]), "Create")
        .await
        .expect("creation should be audited");
    assert_eq!(entry["after"]["roles"], json!(["Auditor"]));
}

#[tokio::test]
async fn unknown_initial_role_creates_nothing() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let body = json!({
        "email": "norole@example.com",
        "fullName": "No Role",
        "password": "norole-password",
        "roleIds": [9999],
    });
    let res = srv.post(&admin, "/admin/users", body.clone()).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let role = srv.create_role(&admin, "Late").await;
    let mut retry = body;
    retry["roleIds"] = json!([role["id"]]);
    let res = srv.post(&admin, "/admin/users", retry).await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn self_deletion_is_audited_without_an_actor() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let roles: Value = srv
        .client
        .get(srv.url("/admin/roles"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let admin_role = roles
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "Admin")
        .cloned()
        .expect("seeded Admin role");

    let other = srv.create_user(&admin, "second@example.com", "second-password").await;
    let res = srv
        .post(&admin, &format!("/admin/users/{}/roles", other["id"]), json!({ "roleId": admin_role["id"] }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv.login("second@example.com", "second-password").await;
    let body: Value = res.json().await.unwrap();
    let second = body["accessToken"].as_str().unwrap().to_string();

    let res = srv
        .client
        .delete(srv.url(&format!("/admin/users/{}", other["id"])))
        .bearer_auth(&second)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let entry = srv
        .wait_for_audit(&admin, &format!("entityType=Identity&entityId={}", other["id"]), "Delete")
        .await
        .expect("self-deletion should be audited");
    assert!(entry["actorId"].is_null());
    assert_eq!(entry["before"]["email"], "second@example.com");
}

#[tokio::test]
async fn role_in_use_cannot_be_deleted() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let user = srv.create_user(&admin, "holder@example.com", "holder-password").await;
    let role = srv.create_role(&admin, "Warehouse").await;
    let res = srv
        .post(&admin, &format!("/admin/users/{}/roles", user["id"]), json!({ "roleId": role["id"] }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .client
        .delete(srv.url(&format!("/admin/roles/{}", role["id"])))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = srv
        .client
        .delete(srv.url(&format!("/admin/users/{}/roles/{}", user["id"], role["id"])))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .delete(srv.url(&format!("/admin/roles/{}", role["id"])))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn bad_and_unknown_ids_are_distinguished() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let res = srv
        .client
        .get(srv.url("/admin/users/abc"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .get(srv.url("/admin/users/9999"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mutations_are_audited_with_before_and_after() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let user = srv.create_user(&admin, "renamed@example.com", "renamed-password").await;
    let res = srv
        .client
        .put(srv.url(&format!("/admin/users/{}", user["id"])))
        .bearer_auth(&admin)
        .header("user-agent", "black-box/1.0")
        .json(&json!({ "fullName": "Renamed User" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Recording is fire-and-forget; poll briefly until the entry lands.
    let mut update = None;
    for _ in 0..50 {
        let res = srv
            .client
            .get(srv.url(&format!("/admin/audit?entityType=Identity&entityId={}", user["id"])))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap();
        let page: Value = res.json().await.unwrap();
        update = page["entries"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["action"] == "Update")
            .cloned();
        if update.is_some() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let update = update.expect("update should be audited");
    assert_eq!(update["before"]["fullName"], "Test User");
    assert_eq!(update["after"]["fullName"], "Renamed User");
    assert_eq!(update["userAgent"], "black-box/1.0");
    assert!(update["after"].get("passwordHash").is_none());
}

#[tokio::test]
async fn access_log_skips_health_and_login() {
    let srv = TestServer::spawn().await;
    let admin = srv.admin_token().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = srv
        .client
        .get(srv.url("/auth/me"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let mut paths = Vec::new();
    for _ in 0..50 {
        let page = srv
            .services
            .audit
            .sink()
            .query(
                AuditFilter {
                    entity_type: Some("request".into()),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .await
            .unwrap();
        paths = page.entries.iter().map(|e| e.entity_id.clone()).collect::<Vec<_>>();
        if paths.iter().any(|p| p == "/auth/me") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert!(paths.iter().any(|p| p == "/auth/me"));
    assert!(!paths.iter().any(|p| p == "/health" || p == "/auth/login"));
}

#[tokio::test]
async fn audit_failure_does_not_fail_the_mutation() {
    let srv = TestServer::spawn_with(Stores::in_memory().with_audit_sink(Arc::new(FailingSink))).await;
    let admin = srv.admin_token().await;

    let res = srv.post(&admin, "/admin/roles", json!({ "name": "Cashier" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    for _ in 0..50 {
        if srv.services.audit.failure_count() >= 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(srv.services.audit.failure_count() >= 1);

    let res = srv
        .client
        .get(srv.url("/admin/roles"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let roles: Value = res.json().await.unwrap();
    assert!(roles.as_array().unwrap().iter().any(|r| r["name"] == "Cashier"));
}
