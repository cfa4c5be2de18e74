use std::sync::Arc;

use chrono::{Datelike, Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use stockroom_infra::config::{
    AppConfig, AuthConfig, DatabaseConfig, LogConfig, ServerConfig, StorageBackend, StorageConfig,
};
use stockroom_observability::LogFormat;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            lock_timeout_ms: 2000,
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            token_ttl_hours: 1,
            seed_users: true,
        },
        log: LogConfig {
            filter: "warn".to_string(),
            format: LogFormat::Pretty,
        },
    }
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory storage, ephemeral port.
        let services = stockroom_api::app::services::build_services(&test_config())
            .await
            .expect("failed to build services");
        let app = stockroom_api::app::build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}/api/v1", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let res = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn create_warehouse(&self, token: &str, name: &str, quantity: i64, amount: f64) -> i64 {
        let res = self
            .client
            .post(self.url("/warehouses"))
            .bearer_auth(token)
            .json(&json!({ "name": name, "quantity": quantity, "amount": amount }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await.unwrap();
        body["data"]["id"].as_i64().unwrap()
    }

    async fn warehouse_quantity(&self, token: &str, id: i64) -> i64 {
        let res = self
            .client
            .get(self.url(&format!("/warehouses/{id}")))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["data"]["quantity"].as_i64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn forge_jwt(secret: &str, username: &str, role: &str) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": username,
        "role": role,
        "iat": now.timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/warehouses")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn login_issues_token_and_rejects_bad_password() {
    let srv = TestServer::spawn().await;

    let token = srv.login("admin", "admin123").await;
    let res = srv
        .client
        .get(srv.url("/auth/profile"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["username"], "admin");
    assert_eq!(body["data"]["role"], "admin");

    let res = srv
        .client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "admin", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_credentials");
}

#[tokio::test]
async fn tokens_signed_with_another_key_are_rejected() {
    let srv = TestServer::spawn().await;

    let forged = forge_jwt("not-the-secret", "admin", "admin");
    let res = srv
        .client
        .get(srv.url("/warehouses"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_token");

    // Same claims, right key: accepted.
    let minted = forge_jwt(JWT_SECRET, "admin", "admin");
    let res = srv
        .client
        .get(srv.url("/warehouses"))
        .bearer_auth(minted)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn sale_lifecycle_adjusts_stock() {
    let srv = TestServer::spawn().await;
    let token = srv.login("admin", "admin123").await;
    let id = srv.create_warehouse(&token, "Widget", 10, 2.5).await;

    // Sell 4.
    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "warehouse_id": id, "quantity": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Sale created successfully");
    assert_eq!(body["data"]["warehouse_id"], id);
    assert_eq!(body["data"]["amount"].as_f64().unwrap(), 10.0);
    let sale_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(srv.warehouse_quantity(&token, id).await, 6);

    // Oversell.
    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "warehouse_id": id, "quantity": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(srv.warehouse_quantity(&token, id).await, 6);

    // Reverse.
    let res = srv
        .client
        .delete(srv.url(&format!("/sales/{sale_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.warehouse_quantity(&token, id).await, 10);

    let res = srv
        .client
        .delete(srv.url(&format!("/sales/{sale_id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sale_input_errors_map_to_client_statuses() {
    let srv = TestServer::spawn().await;
    let token = srv.login("admin", "admin123").await;
    let id = srv.create_warehouse(&token, "Widget", 10, 1.0).await;

    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "warehouse_id": id, "quantity": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_quantity");

    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "warehouse_id": 999, "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_body");

    let res = srv
        .client
        .delete(srv.url("/sales/abc"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn user_role_can_sell_but_not_administer() {
    let srv = TestServer::spawn().await;
    let admin = srv.login("admin", "admin123").await;
    let user = srv.login("user", "user123").await;
    let id = srv.create_warehouse(&admin, "Widget", 5, 3.0).await;

    let res = srv
        .client
        .post(srv.url("/warehouses"))
        .bearer_auth(&user)
        .json(&json!({ "name": "Gadget", "quantity": 1, "amount": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&user)
        .json(&json!({ "warehouse_id": id, "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .client
        .get(srv.url("/sales"))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let res = srv
        .client
        .delete(srv.url(&format!("/warehouses/{id}")))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn warehouse_with_sales_cannot_be_deleted() {
    let srv = TestServer::spawn().await;
    let token = srv.login("admin", "admin123").await;
    let id = srv.create_warehouse(&token, "Widget", 5, 1.0).await;

    let res = srv
        .client
        .post(srv.url("/sales"))
        .bearer_auth(&token)
        .json(&json!({ "warehouse_id": id, "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .client
        .delete(srv.url(&format!("/warehouses/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reports_reflect_sales_and_charges() {
    let srv = TestServer::spawn().await;
    let token = srv.login("admin", "admin123").await;
    let widget = srv.create_warehouse(&token, "Widget", 10, 2.5).await;
    let gadget = srv.create_warehouse(&token, "Gadget", 10, 4.0).await;

    for (id, qty) in [(widget, 4), (gadget, 1)] {
        let res = srv
            .client
            .post(srv.url("/sales"))
            .bearer_auth(&token)
            .json(&json!({ "warehouse_id": id, "quantity": qty }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    let res = srv
        .client
        .post(srv.url("/expense-items"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Rent" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    let rent = body["data"]["id"].as_i64().unwrap();

    let res = srv
        .client
        .post(srv.url("/charges"))
        .bearer_auth(&token)
        .json(&json!({ "expense_item_id": rent, "amount": 3.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let now = Utc::now();
    let res = srv
        .client
        .get(srv.url(&format!("/reports/profit?month={}&year={}", now.month(), now.year())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["revenue"].as_f64().unwrap(), 14.0);
    assert_eq!(body["data"]["expenses"].as_f64().unwrap(), 3.0);
    assert_eq!(body["data"]["profit"].as_f64().unwrap(), 11.0);

    let today = now.date_naive();
    let res = srv
        .client
        .get(srv.url(&format!("/reports/top-items?start_date={today}&end_date={today}&limit=1")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let top = body["data"].as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["name"], "Widget");

    let res = srv
        .client
        .get(srv.url("/reports/profit?month=13&year=2024"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Charges still reference the expense item.
    let res = srv
        .client
        .delete(srv.url(&format!("/expense-items/{rent}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}
