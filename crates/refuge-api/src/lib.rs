pub mod announcements;
pub mod auth;
pub mod dashboard;
pub mod error;
pub mod locations;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod needs;
pub mod notifications;
pub mod offers;
pub mod users;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use serde_json::{Value, json};

pub use auth::{AppState, AppStateInner};
pub use error::{ApiError, ApiResult};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Every REST route. Reads of announcements, locations, needs and offers
/// are public; everything else needs a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/announcements", get(announcements::list_announcements))
        .route("/announcements/{id}", get(announcements::get_announcement))
        .route("/announcements/subscribe", post(announcements::subscribe))
        .route("/announcements/unsubscribe/{email}", delete(announcements::unsubscribe))
        .route("/locations", get(locations::list_locations))
        .route("/locations/{id}", get(locations::get_location))
        .route("/needs", get(needs::list_needs))
        .route("/needs/{id}", get(needs::get_need))
        .route("/offers", get(offers::list_offers))
        .route("/offers/{id}", get(offers::get_offer))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .route("/users", get(users::list_users))
        // Needs & offers
        .route("/needs", post(needs::create_need))
        .route("/needs/{id}", patch(needs::update_need).delete(needs::delete_need))
        .route("/offers", post(offers::create_offer))
        .route("/offers/{id}", patch(offers::update_offer).delete(offers::delete_offer))
        // Matches
        .route("/matches", get(matches::list_matches).post(matches::create_match))
        .route("/matches/{id}", get(matches::get_match))
        .route("/matches/{id}/respond", patch(matches::respond_match))
        // Messaging
        .route("/messages/conversations", get(messages::list_conversations))
        .route(
            "/messages/conversations/{id}",
            get(messages::get_conversation).post(messages::start_conversation),
        )
        .route("/messages/conversations/{id}/messages", get(messages::get_messages))
        .route("/messages/conversations/{id}/read", patch(messages::mark_read))
        .route("/messages/messages", post(messages::send_message))
        .route("/messages/unread-count", get(messages::unread_count))
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications)
                .patch(notifications::update_notifications)
                .delete(notifications::delete_notifications),
        )
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read/all", patch(notifications::mark_all_read))
        // Announcements & resource directory
        .route("/announcements", post(announcements::create_announcement))
        .route(
            "/announcements/{id}",
            patch(announcements::update_announcement).delete(announcements::delete_announcement),
        )
        .route("/locations", post(locations::create_location))
        .route(
            "/locations/{id}",
            patch(locations::update_location).delete(locations::delete_location),
        )
        // Dashboards
        .route("/dashboard/refugee", get(dashboard::refugee))
        .route("/dashboard/volunteer", get(dashboard::volunteer))
        .route("/dashboard/ngo", get(dashboard::ngo))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use tower::ServiceExt;
    use uuid::Uuid;

    use refuge_db::Database;
    use refuge_gateway::Dispatcher;
    use refuge_types::events::GatewayEvent;

    struct TestApp {
        app: Router,
        dispatcher: Dispatcher,
        path: PathBuf,
    }

    impl Drop for TestApp {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
            }
        }
    }

    fn test_app() -> TestApp {
        let path = std::env::temp_dir().join(format!("refuge_api_test_{}.db", Uuid::new_v4()));
        let db = Arc::new(Database::open(&path).unwrap());
        let dispatcher = Dispatcher::new();
        let state: AppState = Arc::new(AppStateInner {
            db,
            dispatcher: dispatcher.clone(),
            jwt_secret: "test-secret".into(),
            token_days: 1,
        });
        TestApp {
            app: router(state),
            dispatcher,
            path,
        }
    }

    impl TestApp {
        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                req = req.header("authorization", format!("Bearer {}", token));
            }
            let req = match body {
                Some(body) => req
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string())),
                None => req.body(Body::empty()),
            }
            .unwrap();

            let resp = self.app.clone().oneshot(req).await.unwrap();
            let status = resp.status();
            let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        /// Registers a user and returns (token, id).
        async fn register(&self, name: &str, role: &str) -> (String, String) {
            let (status, body) = self
                .call(
                    Method::POST,
                    "/auth/register",
                    None,
                    Some(json!({
                        "name": name,
                        "email": format!("{}@example.org", name.to_lowercase()),
                        "password": "correct horse",
                        "role": role,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            (
                body["token"].as_str().unwrap().to_string(),
                body["user"]["id"].as_str().unwrap().to_string(),
            )
        }
    }

    #[tokio::test]
    async fn test_register_login_and_me() {
        let t = test_app();
        let (token, id) = t.register("Amira", "refugee").await;

        let (status, me) = t.call(Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], id.as_str());
        assert_eq!(me["role"], "refugee");
        assert!(me.get("password").is_none());

        let (status, _) = t
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": "AMIRA@example.org", "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = t
            .call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": "amira@example.org", "password": "wrong password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");

        let (status, _) = t
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "name": "Again",
                    "email": "amira@example.org",
                    "password": "correct horse",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_missing_token_is_rejected() {
        let t = test_app();
        let (status, body) = t.call(Method::GET, "/messages/conversations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not authenticated");

        let (status, _) = t.call(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_users_are_filtered_by_role() {
        let t = test_app();
        let (amira, amira_id) = t.register("Amira", "refugee").await;
        t.register("Bilal", "refugee").await;
        let (_, vera_id) = t.register("Vera", "volunteer").await;
        let (nora, _) = t.register("Nora", "ngo").await;

        let (_, seen) = t.call(Method::GET, "/users", Some(&amira), None).await;
        let ids: Vec<&str> =
            seen.as_array().unwrap().iter().filter_map(|u| u["id"].as_str()).collect();
        assert!(ids.contains(&vera_id.as_str()));
        assert!(!ids.contains(&amira_id.as_str()));
        assert!(seen.as_array().unwrap().iter().all(|u| u["role"] != "refugee"));

        let (_, seen_by_ngo) = t.call(Method::GET, "/users", Some(&nora), None).await;
        assert_eq!(seen_by_ngo.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_refugees_cannot_open_conversations_with_refugees() {
        let t = test_app();
        let (amira, _) = t.register("Amira", "refugee").await;
        let (bilal, bilal_id) = t.register("Bilal", "refugee").await;
        let (_, vera_id) = t.register("Vera", "volunteer").await;

        let (status, body) = t
            .call(
                Method::POST,
                &format!("/messages/conversations/{}", bilal_id),
                Some(&amira),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Refugees cannot message other refugees");

        let (_, conversations) =
            t.call(Method::GET, "/messages/conversations", Some(&bilal), None).await;
        assert!(conversations.as_array().unwrap().is_empty());

        let (status, _) = t
            .call(Method::POST, &format!("/messages/conversations/{}", vera_id), Some(&amira), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_owners_can_only_close_their_needs() {
        let t = test_app();
        let (amira, _) = t.register("Amira", "refugee").await;
        let (_, need) = t
            .call(
                Method::POST,
                "/needs",
                Some(&amira),
                Some(json!({ "title": "Baby formula", "description": "", "category": "food" })),
            )
            .await;
        let uri = format!("/needs/{}", need["id"].as_str().unwrap());

        for status in ["fulfilled", "matched"] {
            let (code, body) = t
                .call(Method::PATCH, &uri, Some(&amira), Some(json!({ "status": status })))
                .await;
            assert_eq!(code, StatusCode::CONFLICT, "{}", body);
        }
        let (_, unchanged) = t.call(Method::GET, &uri, None, None).await;
        assert_eq!(unchanged["status"], "open");

        let (code, closed) = t
            .call(Method::PATCH, &uri, Some(&amira), Some(json!({ "status": "closed" })))
            .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(closed["status"], "closed");

        let (code, _) = t
            .call(Method::PATCH, &uri, Some(&amira), Some(json!({ "status": "open" })))
            .await;
        assert_eq!(code, StatusCode::CONFLICT);

        let (code, renamed) = t
            .call(Method::PATCH, &uri, Some(&amira), Some(json!({ "title": "Formula, stage 2" })))
            .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(renamed["title"], "Formula, stage 2");
    }

    #[tokio::test]
    async fn test_fulfilled_offers_cannot_be_reopened() {
        let t = test_app();
        let (vera, _) = t.register("Vera", "volunteer").await;
        let (_, offer) = t
            .call(
                Method::POST,
                "/offers",
                Some(&vera),
                Some(json!({
                    "title": "Van rides",
                    "description": "",
                    "category": "transportation",
                })),
            )
            .await;
        let uri = format!("/offers/{}", offer["id"].as_str().unwrap());

        let (code, paused) = t
            .call(Method::PATCH, &uri, Some(&vera), Some(json!({ "status": "inactive" })))
            .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(paused["status"], "inactive");

        let (code, _) = t
            .call(Method::PATCH, &uri, Some(&vera), Some(json!({ "status": "fulfilled" })))
            .await;
        assert_eq!(code, StatusCode::OK);

        let (code, _) = t
            .call(Method::PATCH, &uri, Some(&vera), Some(json!({ "status": "active" })))
            .await;
        assert_eq!(code, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_match_lifecycle_over_http() {
        let t = test_app();
        let (amira, _) = t.register("Amira", "refugee").await;
        let (vera, _) = t.register("Vera", "volunteer").await;

        let (status, need) = t
            .call(
                Method::POST,
                "/needs",
                Some(&amira),
                Some(json!({ "title": "Room for two", "description": "", "category": "shelter" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, offer) = t
            .call(
                Method::POST,
                "/offers",
                Some(&vera),
                Some(json!({ "title": "Spare room", "description": "", "category": "housing" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        // volunteers cannot post needs
        let (status, _) = t
            .call(
                Method::POST,
                "/needs",
                Some(&vera),
                Some(json!({ "title": "x", "description": "", "category": "food" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, m) = t
            .call(
                Method::POST,
                "/matches",
                Some(&vera),
                Some(json!({
                    "needId": need["id"],
                    "offerId": offer["id"],
                    "message": "I can help",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", m);
        let respond = format!("/matches/{}/respond", m["id"].as_str().unwrap());

        let (_, notes) = t.call(Method::GET, "/notifications", Some(&amira), None).await;
        assert_eq!(notes.as_array().unwrap().len(), 1);
        assert_eq!(notes[0]["type"], "match");

        let (status, _) = t
            .call(Method::PATCH, &respond, Some(&vera), Some(json!({ "status": "accepted" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, accepted) = t
            .call(Method::PATCH, &respond, Some(&amira), Some(json!({ "status": "accepted" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "accepted");

        let need_uri = format!("/needs/{}", need["id"].as_str().unwrap());
        let (_, need_now) = t.call(Method::GET, &need_uri, None, None).await;
        assert_eq!(need_now["status"], "matched");

        let (status, body) = t
            .call(Method::PATCH, &respond, Some(&amira), Some(json!({ "status": "rejected" })))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());

        let (status, _) = t
            .call(Method::PATCH, &respond, Some(&vera), Some(json!({ "status": "completed" })))
            .await;
        assert_eq!(status, StatusCode::OK);

        let offer_uri = format!("/offers/{}", offer["id"].as_str().unwrap());
        let (_, offer_now) = t.call(Method::GET, &offer_uri, None, None).await;
        assert_eq!(offer_now["helpedCount"], 1);
        let (_, need_now) = t.call(Method::GET, &need_uri, None, None).await;
        assert_eq!(need_now["status"], "fulfilled");
    }

    #[tokio::test]
    async fn test_messaging_round_trip() {
        let t = test_app();
        let (amira, amira_id) = t.register("Amira", "refugee").await;
        let (vera, vera_id) = t.register("Vera", "volunteer").await;

        let (status, conversation) = t
            .call(Method::POST, &format!("/messages/conversations/{}", vera_id), Some(&amira), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let conversation_id = conversation["id"].as_str().unwrap().to_string();

        let (status, again) = t
            .call(Method::POST, &format!("/messages/conversations/{}", amira_id), Some(&vera), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again["id"], conversation_id.as_str());

        let (status, _) = t
            .call(
                Method::POST,
                "/messages/messages",
                Some(&amira),
                Some(json!({ "conversationId": conversation_id, "content": "   " })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, message) = t
            .call(
                Method::POST,
                "/messages/messages",
                Some(&amira),
                Some(json!({ "conversationId": conversation_id, "content": "Hello" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(message["read"], false);

        let (_, count) = t.call(Method::GET, "/messages/unread-count", Some(&vera), None).await;
        assert_eq!(count["count"], 1);

        let (_, history) = t
            .call(
                Method::GET,
                &format!("/messages/conversations/{}/messages", conversation_id),
                Some(&vera),
                None,
            )
            .await;
        assert_eq!(history[0]["content"], "Hello");

        let (status, marked) = t
            .call(
                Method::PATCH,
                &format!("/messages/conversations/{}/read", conversation_id),
                Some(&vera),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(marked["count"], 1);

        let (_, count) = t.call(Method::GET, "/messages/unread-count", Some(&vera), None).await;
        assert_eq!(count["count"], 0);
    }

    #[tokio::test]
    async fn test_announcements_are_broadcast() {
        let t = test_app();
        let (vera, _) = t.register("Vera", "volunteer").await;
        let (nora, _) = t.register("Nora", "ngo").await;
        let mut events = t.dispatcher.subscribe();

        let body = json!({
            "title": "Clinic open",
            "content": "Mon-Fri",
            "category": "health",
            "region": "lviv",
        });
        let (status, _) = t
            .call(Method::POST, "/announcements", Some(&vera), Some(body.clone()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) =
            t.call(Method::POST, "/announcements", Some(&nora), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);

        match events.try_recv() {
            Ok(GatewayEvent::NewAnnouncement { announcement }) => {
                assert_eq!(announcement.id.to_string(), created["id"].as_str().unwrap())
            }
            other => panic!("expected newAnnouncement, got {:?}", other),
        }

        let (status, list) = t.call(Method::GET, "/announcements", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }
}
