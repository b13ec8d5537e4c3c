use crate::state::AppState;
use axum::http::StatusCode;
use axum::{
    extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use riverwatch_shared::{decode_frame, encode_frame, TelemetryRecord};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const DEFAULT_RECENT: usize = 100;

/// Public router constructor
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/readings", post(post_reading))
        .route("/api/latest", get(get_latest))
        .route("/api/recent", get(get_recent))
        .with_state(state)
}

#[derive(Serialize)]
struct Accepted {
    unit_id: String,
}

/// POST /api/readings – body is one telemetry frame, same shape the dashboards
/// receive over /ws.
async fn post_reading(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    match decode_frame(&body) {
        Ok(record) => {
            let unit_id = record.unit_id.clone();
            state.publish(record);
            (StatusCode::ACCEPTED, Json(Accepted { unit_id })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "rejected reading");
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

async fn get_latest(State(state): State<Arc<AppState>>) -> Json<Vec<TelemetryRecord>> {
    Json(state.snapshot())
}

#[derive(Deserialize)]
struct RecentParams {
    // /api/recent?limit=50  (defaults to 100)
    limit: Option<usize>,
}

async fn get_recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Json<Vec<TelemetryRecord>> {
    Json(state.recent(params.limit.unwrap_or(DEFAULT_RECENT)))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn send_record(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    record: &TelemetryRecord,
) -> bool {
    let text = match encode_frame(record) {
        Ok(text) => text,
        Err(e) => {
            warn!(unit_id = %record.unit_id, error = %e, "failed to encode reading");
            return true;
        }
    };
    sender.send(Message::Text(Utf8Bytes::from(text))).await.is_ok()
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    // subscribe before the snapshot so nothing published in between is lost
    let mut telemetry_rx = state.ws_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();
    info!("dashboard connected");

    for record in state.snapshot() {
        if !send_record(&mut sender, &record).await {
            return;
        }
    }

    loop {
        tokio::select! {
            recv = telemetry_rx.recv() => {
                match recv {
                    Ok(record) => {
                        if !send_record(&mut sender, &record).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // slow client: skip ahead, the next reading supersedes anyway
                        warn!(skipped, "dashboard lagging; readings skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "dashboard socket error");
                        break;
                    }
                }
            }
        }
    }

    info!("dashboard disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, String) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn post(body: &str) -> Request<Body> {
        Request::post("/api/readings")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn ingest_then_query_latest() {
        let state = Arc::new(AppState::new());
        let app = router(state.clone());

        let (status, _) = call(app.clone(), post(r#"{"unit_id":"w1","hight":1.75}"#)).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = call(
            app,
            Request::get("/api/latest").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let latest: Vec<TelemetryRecord> = serde_json::from_str(&body).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].height, 1.75);
    }

    #[tokio::test]
    async fn rejects_frames_without_unit_id() {
        let state = Arc::new(AppState::new());
        let (status, _) = call(router(state.clone()), post(r#"{"hight":1.0}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(router(state.clone()), post("not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.snapshot().is_empty());
    }

    #[tokio::test]
    async fn recent_honours_limit() {
        let state = Arc::new(AppState::new());
        for i in 0..5 {
            state.publish(decode_frame(&format!(r#"{{"unit_id":"u","hight":{i}}}"#)).unwrap());
        }
        let (_, body) = call(
            router(state),
            Request::get("/api/recent?limit=2").body(Body::empty()).unwrap(),
        )
        .await;
        let recent: Vec<TelemetryRecord> = serde_json::from_str(&body).unwrap();
        assert_eq!(recent.iter().map(|r| r.height).collect::<Vec<_>>(), vec![4.0, 3.0]);
    }
}
