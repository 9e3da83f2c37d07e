//! Write side of the needs and offers board.
//!
//! A successful write marks the topics it changes stale, so the next read
//! through [`Queries`](crate::Queries) refetches. Failed writes leave the
//! cache alone.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use refuge_types::api::{
    CreateMatchRequest, CreateNeedRequest, CreateOfferRequest, RespondMatchRequest,
};
use refuge_types::models::{Match, Need, Offer};

use crate::cache::QueryCache;
use crate::error::ClientError;
use crate::rest::RestClient;
use crate::topics::Topic;

#[derive(Clone)]
pub struct Board {
    rest: Arc<RestClient>,
    cache: Arc<QueryCache>,
}

impl Board {
    pub fn new(rest: Arc<RestClient>, cache: Arc<QueryCache>) -> Self {
        Self { rest, cache }
    }

    pub async fn create_need(&self, req: &CreateNeedRequest) -> Result<Need, ClientError> {
        require_title(&req.title)?;
        let need = self.rest.create_need(req).await?;
        debug!("Posted need {}", need.id);
        self.cache.invalidate(Topic::Needs);
        Ok(need)
    }

    pub async fn create_offer(&self, req: &CreateOfferRequest) -> Result<Offer, ClientError> {
        require_title(&req.title)?;
        let offer = self.rest.create_offer(req).await?;
        debug!("Posted offer {}", offer.id);
        self.cache.invalidate(Topic::Offers);
        Ok(offer)
    }

    pub async fn create_match(&self, req: &CreateMatchRequest) -> Result<Match, ClientError> {
        if req.need_id.is_none() && req.offer_id.is_none() {
            return Err(ClientError::Validation(
                "Choose a need or an offer to match".into(),
            ));
        }
        let m = self.rest.create_match(req).await?;
        self.cache.invalidate(Topic::Matches);
        Ok(m)
    }

    /// Accepting or completing a match moves the need and offer too.
    pub async fn respond_match(
        &self,
        id: Uuid,
        req: &RespondMatchRequest,
    ) -> Result<Match, ClientError> {
        let m = self.rest.respond_match(id, req).await?;
        debug!("Match {} is now {}", m.id, m.status);
        self.cache
            .invalidate_all([Topic::Matches, Topic::Needs, Topic::Offers]);
        Ok(m)
    }
}

fn require_title(title: &str) -> Result<(), ClientError> {
    if title.trim().is_empty() {
        return Err(ClientError::Validation("Title cannot be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    use refuge_types::models::{Category, MatchStatus};

    use crate::config::ClientConfig;

    const STAMP: &str = "2026-03-01T12:00:00Z";

    /// Serves exactly one HTTP response and hands back the raw request.
    async fn serve_once(status: &'static str, body: Value) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            while !request_complete(&raw) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let body = body.to_string();
            let resp = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (url, task)
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= end + 4 + length
    }

    fn board(api_url: String) -> (Board, Arc<QueryCache>) {
        let rest = Arc::new(RestClient::new(&ClientConfig {
            gateway_url: format!("{}/gateway", api_url.replace("http", "ws")),
            api_url,
        }));
        rest.set_token(Some("token-1".into()));
        let cache = Arc::new(QueryCache::new());
        (Board::new(rest, cache.clone()), cache)
    }

    fn need_request(title: &str) -> CreateNeedRequest {
        CreateNeedRequest {
            title: title.into(),
            description: "For a family of four".into(),
            category: Category::Shelter,
            urgent: true,
            location: None,
        }
    }

    fn need_json(title: &str) -> Value {
        json!({
            "id": Uuid::new_v4(),
            "title": title,
            "description": "For a family of four",
            "category": "shelter",
            "urgent": true,
            "status": "open",
            "location": null,
            "userId": Uuid::new_v4(),
            "createdAt": STAMP,
            "updatedAt": STAMP,
        })
    }

    fn match_json(id: Uuid, status: &str) -> Value {
        json!({
            "id": id,
            "needId": Uuid::new_v4(),
            "offerId": Uuid::new_v4(),
            "initiatedBy": Uuid::new_v4(),
            "respondedBy": Uuid::new_v4(),
            "message": null,
            "status": status,
            "createdAt": STAMP,
            "updatedAt": STAMP,
        })
    }

    #[tokio::test]
    async fn test_posting_a_need_marks_needs_stale() {
        let (url, server) = serve_once("201 Created", need_json("Blankets")).await;
        let (board, cache) = board(url);
        cache.store(Topic::Needs, json!([]));
        cache.store(Topic::Offers, json!([]));

        let need = board.create_need(&need_request("Blankets")).await.unwrap();
        assert_eq!(need.title, "Blankets");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /needs HTTP/1.1"), "{}", raw);
        assert!(raw.to_lowercase().contains("authorization: bearer token-1"));
        assert!(raw.contains(r#""title":"Blankets""#));

        assert!(cache.is_stale(Topic::Needs));
        assert!(!cache.is_stale(Topic::Offers));
    }

    #[tokio::test]
    async fn test_responding_to_a_match_marks_the_board_stale() {
        let id = Uuid::new_v4();
        let (url, server) =
            serve_once("200 OK", json!({ "data": match_json(id, "accepted") })).await;
        let (board, cache) = board(url);
        for topic in [Topic::Matches, Topic::Needs, Topic::Offers, Topic::Announcements] {
            cache.store(topic, json!([]));
        }

        let req = RespondMatchRequest {
            status: MatchStatus::Accepted,
            message: Some("See you at noon".into()),
        };
        let m = board.respond_match(id, &req).await.unwrap();
        assert_eq!(m.id, id);
        assert_eq!(m.status, MatchStatus::Accepted);

        let raw = server.await.unwrap();
        let request_line = format!("PATCH /matches/{}/respond HTTP/1.1", id);
        assert!(raw.starts_with(&request_line), "{}", raw);
        assert!(raw.contains(r#""status":"accepted""#));

        assert!(cache.is_stale(Topic::Matches));
        assert!(cache.is_stale(Topic::Needs));
        assert!(cache.is_stale(Topic::Offers));
        assert!(!cache.is_stale(Topic::Announcements));
    }

    #[tokio::test]
    async fn test_rejected_write_keeps_cache_fresh() {
        let (url, server) =
            serve_once("409 Conflict", json!({ "error": "Need is no longer open" })).await;
        let (board, cache) = board(url);
        cache.store(Topic::Matches, json!([]));

        let req = CreateMatchRequest {
            need_id: Some(Uuid::new_v4()),
            offer_id: None,
            message: None,
        };
        match board.create_match(&req).await {
            Err(ClientError::Http { status, message }) => {
                assert_eq!(status, 409);
                assert_eq!(message, "Need is no longer open");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        server.await.unwrap();
        assert!(!cache.is_stale(Topic::Matches));
    }

    #[tokio::test]
    async fn test_invalid_input_fails_before_request() {
        // nothing listens on the discard port; a request would be a transport error
        let (board, _) = board("http://127.0.0.1:9".into());
        assert!(matches!(
            board.create_need(&need_request("   ")).await,
            Err(ClientError::Validation(_))
        ));

        let empty = CreateMatchRequest {
            need_id: None,
            offer_id: None,
            message: Some("hello".into()),
        };
        assert!(matches!(
            board.create_match(&empty).await,
            Err(ClientError::Validation(_))
        ));
    }
}
