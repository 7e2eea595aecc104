use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tandem_core::store::MessageStore;
use tandem_core::{AppConfig, AppState};
use tandem_models::message::MessageKind;
use tandem_models::{RoomId, UserId};
use tower::ServiceExt;

struct TestContext {
    app: Router,
    state: AppState,
}

impl TestContext {
    async fn new() -> anyhow::Result<Self> {
        let db = tandem_db::create_pool("sqlite::memory:", 1).await?;
        tandem_db::run_migrations(&db).await?;
        let state = AppState::new(
            db,
            AppConfig {
                jwt_secret: "integration-test-secret".to_string(),
                ..Default::default()
            },
        );
        let app = tandem_api::build_router().with_state(state.clone());
        Ok(Self { app, state })
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = if let Some(payload) = body {
            builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))?
        } else {
            builder.body(Body::empty())?
        };
        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    /// Register a user and return (user id, bearer token).
    async fn register(&self, username: &str) -> anyhow::Result<(i64, String)> {
        let (status, body) = self
            .request_json(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({ "username": username, "password": "hunter2hunter2" })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {body}");
        let id = body["user"]["id"].as_i64().unwrap();
        let token = body["token"].as_str().unwrap().to_string();
        Ok((id, token))
    }

    /// Register two users and walk them through an accepted pairing.
    /// Returns (requester, recipient, room id).
    async fn paired_users(&self) -> anyhow::Result<(Actor, Actor, RoomId)> {
        let (alice_id, alice_token) = self.register("alice").await?;
        let (bob_id, bob_token) = self.register("bob").await?;
        let (status, pairing) = self
            .request_json(
                Method::POST,
                "/api/v1/pairings",
                Some(&alice_token),
                Some(json!({ "username": "bob" })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "request failed: {pairing}");
        let pairing_id = pairing["id"].as_i64().unwrap();
        let (status, accepted) = self
            .request_json(
                Method::POST,
                &format!("/api/v1/pairings/{pairing_id}/accept"),
                Some(&bob_token),
                None,
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "accept failed: {accepted}");
        Ok((
            Actor {
                id: alice_id,
                token: alice_token,
            },
            Actor {
                id: bob_id,
                token: bob_token,
            },
            RoomId(pairing_id),
        ))
    }
}

struct Actor {
    id: i64,
    token: String,
}

#[tokio::test]
async fn auth_register_login_and_me() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (id, _token) = ctx.register("alice").await?;

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "alice", "password": "hunter2hunter2" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "hunter2hunter2" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();

    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "alice", "password": "wrong-password" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = ctx
        .request_json(Method::GET, "/api/v1/users/@me", Some(token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"].as_i64().unwrap(), id);
    assert_eq!(me["username"], "alice");
    Ok(())
}

#[tokio::test]
async fn pairing_lifecycle() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (_alice_id, alice_token) = ctx.register("alice").await?;
    let (bob_id, bob_token) = ctx.register("bob").await?;

    let (status, pairing) = ctx
        .request_json(
            Method::POST,
            "/api/v1/pairings",
            Some(&alice_token),
            Some(json!({ "username": "bob" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pairing["status"], "PENDING");
    let pairing_id = pairing["id"].as_i64().unwrap();

    // No duplicate request while one is open, in either direction.
    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/pairings",
            Some(&bob_token),
            Some(json!({ "username": "alice" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, pending) = ctx
        .request_json(Method::GET, "/api/v1/pairings/pending", Some(&bob_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["requester"]["username"], "alice");

    // Only the recipient can resolve.
    let (status, _) = ctx
        .request_json(
            Method::POST,
            &format!("/api/v1/pairings/{pairing_id}/accept"),
            Some(&alice_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = ctx
        .request_json(
            Method::POST,
            &format!("/api/v1/pairings/{pairing_id}/accept"),
            Some(&bob_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["status"], "ACCEPTED");

    // Resolved pairings are immutable.
    let (status, _) = ctx
        .request_json(
            Method::POST,
            &format!("/api/v1/pairings/{pairing_id}/reject"),
            Some(&bob_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, partner) = ctx
        .request_json(Method::GET, "/api/v1/pairings/partner", Some(&alice_token), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partner["roomId"].as_i64().unwrap(), pairing_id);
    assert_eq!(partner["partner"]["id"].as_i64().unwrap(), bob_id);

    // A paired user cannot be courted by a third party.
    let (_carol_id, carol_token) = ctx.register("carol").await?;
    let (status, _) = ctx
        .request_json(
            Method::POST,
            "/api/v1/pairings",
            Some(&carol_token),
            Some(json!({ "username": "alice" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn history_marks_read_and_counts_unread() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (alice, bob, room) = ctx.paired_users().await?;

    ctx.state
        .store
        .append(room, UserId(alice.id), "hello", MessageKind::Text, &[])
        .await
        .unwrap();
    ctx.state
        .store
        .append(room, UserId(alice.id), "anyone there?", MessageKind::Text, &[])
        .await
        .unwrap();

    let (status, unread) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/rooms/{room}/unread"),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(unread["count"].as_i64().unwrap(), 2);

    let (status, history) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/rooms/{room}/messages"),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let messages = history.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[1]["content"], "anyone there?");

    // Retrieval marked the partner's messages read.
    let (_, unread) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/rooms/{room}/unread"),
            Some(&bob.token),
            None,
        )
        .await?;
    assert_eq!(unread["count"].as_i64().unwrap(), 0);

    let (status, last) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/rooms/{room}/last-message"),
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["content"], "anyone there?");

    // Outsiders get nothing.
    let (_carol_id, carol_token) = ctx.register("carol").await?;
    let (status, _) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/rooms/{room}/messages"),
            Some(&carol_token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn reaction_upsert_replaces_prior_reaction() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (alice, bob, room) = ctx.paired_users().await?;
    let message = ctx
        .state
        .store
        .append(room, UserId(alice.id), "look at this", MessageKind::Text, &[])
        .await
        .unwrap();

    let (status, reactions) = ctx
        .request_json(
            Method::PUT,
            &format!("/api/v1/messages/{}/reactions", message.id),
            Some(&bob.token),
            Some(json!({ "emoji": "👍" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reactions.as_array().unwrap().len(), 1);
    assert_eq!(reactions[0]["emoji"], "👍");

    let (status, reactions) = ctx
        .request_json(
            Method::PUT,
            &format!("/api/v1/messages/{}/reactions", message.id),
            Some(&bob.token),
            Some(json!({ "emoji": "❤️" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let entries = reactions.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["emoji"], "❤️");
    assert_eq!(entries[0]["userId"].as_i64().unwrap(), bob.id);

    let (status, listed) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/messages/{}/reactions", message.id),
            Some(&alice.token),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, reactions);
    Ok(())
}
