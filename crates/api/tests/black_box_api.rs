use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use quickdrop_api::config::ApiConfig;
use quickdrop_auth::{JwtClaims, Role};
use quickdrop_core::{TenantId, UserId};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = ApiConfig {
            jwt_secret: SECRET.to_string(),
            ..ApiConfig::default()
        };
        let app = quickdrop_api::app::build_app(config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Poll a list endpoint until `accept` holds for its items. Reads are
    /// served from projections and trail the command path.
    async fn list_eventually(
        &self,
        token: &str,
        path: &str,
        accept: impl Fn(&[Value]) -> bool,
    ) -> Vec<Value> {
        for _ in 0..100 {
            let (status, body) = self.get(token, path).await;
            if status == StatusCode::OK {
                let items = body["items"].as_array().cloned().unwrap_or_default();
                if accept(&items) {
                    return items;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{path} did not reach the expected state in time");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, user_id: UserId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        tenant_id,
        roles,
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// One tenant with a user per role.
struct Actors {
    tenant_id: TenantId,
    admin: String,
    store: String,
    customer: String,
    customer_id: UserId,
}

impl Actors {
    fn new() -> Self {
        let tenant_id = TenantId::new();
        let customer_id = UserId::new();
        Self {
            tenant_id,
            admin: mint_jwt(tenant_id, UserId::new(), vec![Role::ADMIN]),
            store: mint_jwt(tenant_id, UserId::new(), vec![Role::STORE]),
            customer: mint_jwt(tenant_id, customer_id, vec![Role::CUSTOMER]),
            customer_id,
        }
    }

    fn agent(&self) -> (UserId, String) {
        let id = UserId::new();
        (id, mint_jwt(self.tenant_id, id, vec![Role::AGENT]))
    }
}

/// An open store with one product priced at 1000; returns (store_id, product_id).
async fn stocked_store(srv: &TestServer, actors: &Actors) -> (String, String) {
    let (status, category) = srv
        .post(&actors.admin, "/categories", json!({ "name": "Groceries" }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let category_id = category["id"].as_str().unwrap().to_string();

    let (status, store) = srv
        .post(
            &actors.store,
            "/stores",
            json!({ "name": "Corner Shop", "address": "1 Main St", "phone": null }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let store_id = store["id"].as_str().unwrap().to_string();

    let (status, opened) = srv
        .post(&actors.store, &format!("/stores/{store_id}/open"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(opened["is_open"], true);

    let (status, product) = srv
        .post(
            &actors.store,
            "/products",
            json!({
                "store_id": store_id,
                "category_id": category_id,
                "name": "Milk",
                "price": 1000,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = product["id"].as_str().unwrap().to_string();

    srv.list_eventually(
        &actors.customer,
        &format!("/products?store_id={store_id}"),
        |items| items.iter().any(|p| p["product_id"] == product_id.as_str()),
    )
    .await;

    (store_id, product_id)
}

async fn checkout(srv: &TestServer, actors: &Actors, store_id: &str, product_id: &str) -> Value {
    let (status, order) = srv
        .post(
            &actors.customer,
            "/checkout",
            json!({
                "store_id": store_id,
                "lines": [{ "product_id": product_id, "quantity": 2 }],
                "delivery_address": "42 Side St",
                "notes": "ring twice",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {order}");
    order
}

/// Registered, approved agent with an open wallet.
async fn onboarded_agent(srv: &TestServer, actors: &Actors, limit: u64) -> (UserId, String) {
    let (agent_id, token) = actors.agent();
    let (status, _) = srv
        .post(
            &token,
            "/agent/profile",
            json!({ "full_name": "Sam Rider", "phone": "555-0100", "vehicle": "bike" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, approved) = srv
        .post(&actors.admin, &format!("/admin/agents/{agent_id}/approve"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "approved");

    let (status, wallet) = srv
        .post(
            &actors.admin,
            &format!("/admin/agents/{agent_id}/wallet"),
            json!({ "limit": limit }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(wallet["company_cash_balance"], 0);

    (agent_id, token)
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = srv
        .client
        .get(srv.url("/orders"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();

    let (status, body) = srv.get(&actors.customer, "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"], actors.tenant_id.to_string());
    assert_eq!(body["user_id"], actors.customer_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "customer"));
    assert!(
        body["permissions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|p| p == "orders.place")
    );
}

#[tokio::test]
async fn customers_cannot_reach_admin_routes() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();

    let (status, body) = srv.get(&actors.customer, "/admin/users").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = srv
        .post(&actors.customer, "/categories", json!({ "name": "Sneaky" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn checkout_prices_from_the_catalog_and_is_role_filtered() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &actors).await;

    let order = checkout(&srv, &actors, &store_id, &product_id).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], 2000);
    // Default delivery fee is 500.
    assert_eq!(order["total"], 2500);
    let order_id = order["id"].as_str().unwrap().to_string();

    let mine = srv
        .list_eventually(&actors.customer, "/orders", |items| !items.is_empty())
        .await;
    assert_eq!(mine[0]["order_id"], order_id.as_str());

    let for_store = srv
        .list_eventually(&actors.store, "/orders?status=pending", |items| !items.is_empty())
        .await;
    assert_eq!(for_store[0]["order_id"], order_id.as_str());

    // Another customer in the same tenant sees nothing.
    let stranger = mint_jwt(actors.tenant_id, UserId::new(), vec![Role::CUSTOMER]);
    let (status, body) = srv.get(&stranger, "/orders").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    let (status, _) = srv.get(&stranger, &format!("/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_rejects_closed_stores() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &actors).await;

    let (status, _) = srv
        .post(&actors.store, &format!("/stores/{store_id}/close"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .post(
            &actors.customer,
            "/checkout",
            json!({
                "store_id": store_id,
                "lines": [{ "product_id": product_id, "quantity": 1 }],
                "delivery_address": "42 Side St",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn customer_can_cancel_a_pending_order() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &actors).await;
    let order = checkout(&srv, &actors, &store_id, &product_id).await;
    let order_id = order["id"].as_str().unwrap();

    let (status, cancelled) = srv
        .post(
            &actors.customer,
            &format!("/orders/{order_id}/cancel"),
            json!({ "reason": "changed my mind" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    // Cancelling twice is a rejected transition.
    let (status, _) = srv
        .post(
            &actors.customer,
            &format!("/orders/{order_id}/cancel"),
            json!({ "reason": "again" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn cash_purchase_flow_balances_the_agent_wallet() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &actors).await;
    let order = checkout(&srv, &actors, &store_id, &product_id).await;
    let order_id = order["id"].as_str().unwrap().to_string();
    let (_, agent) = onboarded_agent(&srv, &actors, 10_000).await;

    srv.list_eventually(&agent, "/agent/jobs", |items| {
        items.iter().any(|o| o["order_id"] == order_id.as_str())
    })
    .await;

    let (status, accepted) = srv
        .post(
            &agent,
            &format!("/agent/jobs/{order_id}/accept"),
            json!({ "purchase_type": "cpo" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "accept failed: {accepted}");
    assert_eq!(accepted["status"], "assigned");

    let (status, requested) = srv
        .post(
            &agent,
            &format!("/agent/jobs/{order_id}/request-cash"),
            json!({ "amount": 1500 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(requested["status"], "cash_requested");

    // No body: the requested amount is advanced.
    let res = srv
        .client
        .post(srv.url(&format!("/admin/orders/{order_id}/approve-cash")))
        .bearer_auth(&actors.admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let approved: Value = res.json().await.unwrap();
    assert_eq!(approved["status"], "cash_approved");
    assert_eq!(approved["cash_approved"], 1500);

    let form = Form::new().text("cost", "1400").part(
        "receipt",
        Part::bytes(vec![0x89, b'P', b'N', b'G'])
            .file_name("receipt.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let res = srv
        .client
        .post(srv.url(&format!("/agent/jobs/{order_id}/purchase")))
        .bearer_auth(&agent)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let purchased: Value = res.json().await.unwrap();
    assert_eq!(purchased["status"], "purchased");
    assert!(
        purchased["receipt_url"]
            .as_str()
            .unwrap()
            .contains("/receipts/")
    );

    let (status, on_the_way) = srv
        .post(&agent, &format!("/agent/jobs/{order_id}/start-delivery"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(on_the_way["status"], "on_the_way");

    let (status, delivered) = srv
        .post(&agent, &format!("/agent/jobs/{order_id}/deliver"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered["status"], "delivered");
    assert_eq!(delivered["payment_status"], "paid");

    // +1500 advance, -1400 purchase, +2500 collected from the customer.
    let (status, wallet) = srv.get(&agent, "/agent/wallet").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["wallet"]["company_cash_balance"], 2600);
    let kinds: Vec<&str> = wallet["transactions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["advance", "purchase", "collection"]);
}

#[tokio::test]
async fn uploaded_logo_is_served_from_its_public_url() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, _) = stocked_store(&srv, &actors).await;

    let logo = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a];
    let form = Form::new().part(
        "file",
        Part::bytes(logo.clone())
            .file_name("logo.png")
            .mime_str("image/png")
            .unwrap(),
    );
    let res = srv
        .client
        .post(srv.url(&format!("/stores/{store_id}/logo")))
        .bearer_auth(&actors.store)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let object: Value = res.json().await.unwrap();
    let public_url = object["public_url"].as_str().unwrap();
    let path = &public_url[public_url.find("/files/").unwrap()..];

    // No token: uploads are public.
    let res = srv.client.get(srv.url(path)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "image/png");
    assert_eq!(res.bytes().await.unwrap().to_vec(), logo);

    let res = srv
        .client
        .get(srv.url("/files/store-logos/missing.png"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn racing_agents_get_exactly_one_job() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &actors).await;
    let order = checkout(&srv, &actors, &store_id, &product_id).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, first) = onboarded_agent(&srv, &actors, 10_000).await;
    let (_, second) = onboarded_agent(&srv, &actors, 10_000).await;

    let path = format!("/agent/jobs/{order_id}/accept");
    let body = json!({ "purchase_type": "apo" });
    let (a, b) = tokio::join!(
        srv.post(&first, &path, body.clone()),
        srv.post(&second, &path, body.clone()),
    );

    let mut statuses = [a.0, b.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::CONFLICT]);
}

#[tokio::test]
async fn unapproved_agents_cannot_accept_jobs() {
    let srv = TestServer::spawn().await;
    let actors = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &actors).await;
    let order = checkout(&srv, &actors, &store_id, &product_id).await;
    let order_id = order["id"].as_str().unwrap();

    let (_, agent) = actors.agent();
    let (status, _) = srv
        .post(
            &agent,
            "/agent/profile",
            json!({ "full_name": "New Rider", "phone": "555-0101" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = srv
        .post(
            &agent,
            &format!("/agent/jobs/{order_id}/accept"),
            json!({ "purchase_type": "apo" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let srv = TestServer::spawn().await;
    let home = Actors::new();
    let (store_id, product_id) = stocked_store(&srv, &home).await;

    let other = Actors::new();
    let (status, _) = srv.get(&other.customer, &format!("/stores/{store_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = srv.get(&other.customer, "/products").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (status, _) = srv
        .post(
            &other.customer,
            "/checkout",
            json!({
                "store_id": store_id,
                "lines": [{ "product_id": product_id, "quantity": 1 }],
                "delivery_address": "elsewhere",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv
        .post(&other.admin, &format!("/stores/{store_id}/suspend"), json!({ "reason": "x" }))
        .await;
    assert_ne!(status, StatusCode::OK);
}
