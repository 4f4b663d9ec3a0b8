use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// Canned answer served by a [`StubProvider`]
#[derive(Clone)]
pub struct Reply {
    status: StatusCode,
    content_type: &'static str,
    body: String,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn error(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: body.to_string(),
        }
    }

    /// Server-sent events, terminated by `[DONE]`
    pub fn sse(events: &[Value]) -> Self {
        let mut body: String = events.iter().map(|e| format!("data: {}\n\n", e)).collect();
        body.push_str("data: [DONE]\n\n");
        Self {
            status: StatusCode::OK,
            content_type: "text/event-stream",
            body,
        }
    }

    /// One JSON document per line
    pub fn ndjson(lines: &[Value]) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/x-ndjson",
            body: lines.iter().map(|l| format!("{}\n", l)).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub headers: HeaderMap,
    pub body: Value,
}

#[derive(Clone)]
struct StubState {
    reply: Reply,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Provider stand-in answering every POST on one path with a fixed reply
pub struct StubProvider {
    pub addr: SocketAddr,
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubProvider {
    pub async fn start(path: &str, reply: Reply) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = StubState {
            reply,
            requests: requests.clone(),
        };

        let app = Router::new().route(path, post(handle)).with_state(state);

        // Start server on random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        StubProvider {
            addr,
            base_url,
            requests,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Body of the only request received
    pub fn single_request(&self) -> RecordedRequest {
        let requests = self.requests();
        assert_eq!(requests.len(), 1, "expected exactly one request");
        requests.into_iter().next().unwrap()
    }
}

async fn handle(State(state): State<StubState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.requests.lock().unwrap().push(RecordedRequest { headers, body });

    let reply = state.reply;
    (reply.status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response()
}
