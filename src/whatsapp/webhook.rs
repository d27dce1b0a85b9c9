// =============================================================================
// WHATSAPP WEBHOOK SERVER
// =============================================================================
//
// Routes:
//   GET  /webhook  Meta verification handshake
//   POST /webhook  message notifications, acknowledged before processing and
//                  queued per sender
//   GET  /health   liveness check

use super::dispatch::SenderQueues;
use super::inbound::{normalize_phone, InboundMessage};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct WebhookState {
    pub verify_token: Arc<str>,
    pub queues: Arc<SenderQueues>,
}

pub fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(app: Router, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Webhook server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}

// =============================================================================
// VERIFICATION
// =============================================================================

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

async fn verify(State(state): State<WebhookState>, Query(params): Query<VerifyParams>) -> Response {
    let subscribed = params.mode.as_deref() == Some("subscribe");
    let token_ok = params.verify_token.as_deref() == Some(&*state.verify_token);

    if subscribed && token_ok {
        tracing::info!("Webhook verified successfully");
        return (StatusCode::OK, params.challenge.unwrap_or_default()).into_response();
    }

    tracing::warn!(mode = ?params.mode, "Webhook verification failed");
    StatusCode::FORBIDDEN.into_response()
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    #[serde(default)]
    value: Option<ChangeValue>,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<WaMessage>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    display_phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    wa_id: String,
    #[serde(default)]
    profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct WaMessage {
    from: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<WaText>,
    #[serde(default)]
    group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaText {
    body: String,
}

/// Pulls the text messages out of a notification. Status updates and
/// non-text messages (images, audio, reactions...) are skipped.
pub fn extract_messages(payload: &WebhookPayload) -> Vec<InboundMessage> {
    let mut inbound = Vec::new();

    for value in payload
        .entry
        .iter()
        .flat_map(|entry| &entry.changes)
        .filter_map(|change| change.value.as_ref())
    {
        let own_number = value
            .metadata
            .as_ref()
            .and_then(|m| m.display_phone_number.as_deref())
            .map(normalize_phone)
            .filter(|n| !n.is_empty());

        for message in &value.messages {
            let text = match (message.kind.as_str(), &message.text) {
                ("text", Some(text)) => text.body.clone(),
                (kind, _) => {
                    tracing::debug!(from = %message.from, kind, "Skipping non-text message");
                    continue;
                }
            };

            let display_name = value
                .contacts
                .iter()
                .find(|c| c.wa_id == message.from)
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.clone());

            let timestamp_ms = message
                .timestamp
                .as_deref()
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|secs| secs.checked_mul(1000))
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

            inbound.push(InboundMessage {
                is_from_self: own_number.as_deref() == Some(normalize_phone(&message.from).as_str()),
                is_group_message: message.group_id.is_some(),
                sender_id: message.from.clone(),
                display_name,
                text,
                timestamp_ms,
            });
        }
    }

    inbound
}

async fn receive(State(state): State<WebhookState>, Json(body): Json<Value>) -> StatusCode {
    let payload: WebhookPayload = match serde_json::from_value(body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Unrecognised webhook payload");
            return StatusCode::OK;
        }
    };

    for message in extract_messages(&payload) {
        state.queues.dispatch(message);
    }
    tracing::debug!(
        active_senders = state.queues.active_senders(),
        "Webhook notification queued"
    );

    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::super::inbound::test_support::{EchoAssistant, RecordingSender};
    use super::super::inbound::{MessageRouter, SenderAccess};
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<EchoAssistant>, Arc<RecordingSender>) {
        let assistant = Arc::new(EchoAssistant::default());
        let sender = Arc::new(RecordingSender::default());
        let router = MessageRouter::new(
            assistant.clone(),
            sender.clone(),
            SenderAccess::default(),
            false,
        );
        let state = WebhookState {
            verify_token: Arc::from("secret-token"),
            queues: SenderQueues::new(Arc::new(router)),
        };
        (webhook_router(state), assistant, sender)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn notification(messages: Value) -> Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "WABA_ID",
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messaging_product": "whatsapp",
                        "metadata": {"display_phone_number": "15550009999", "phone_number_id": "1098"},
                        "contacts": [{"profile": {"name": "Ana Silva"}, "wa_id": "15551234567"}],
                        "messages": messages
                    }
                }]
            }]
        })
    }

    fn post_json(body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_verification_handshake() {
        let (app, _, _) = app();

        let ok = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=secret-token&hub.challenge=1158201444")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_text(ok).await, "1158201444");

        let wrong = app
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "ok");
    }

    #[test]
    fn test_extract_messages() {
        let body = notification(json!([
            {"from": "15551234567", "id": "wamid.1", "timestamp": "1700000000",
             "type": "text", "text": {"body": "list my docs"}},
            {"from": "15551234567", "id": "wamid.2", "timestamp": "1700000001",
             "type": "image", "image": {"id": "media-1"}},
            {"from": "15550009999", "id": "wamid.3", "timestamp": "1700000002",
             "type": "text", "text": {"body": "echo"}}
        ]));
        let payload: WebhookPayload = serde_json::from_value(body).unwrap();

        let messages = extract_messages(&payload);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender_id, "15551234567");
        assert_eq!(messages[0].display_name.as_deref(), Some("Ana Silva"));
        assert_eq!(messages[0].text, "list my docs");
        assert_eq!(messages[0].timestamp_ms, 1_700_000_000_000);
        assert!(!messages[0].is_from_self);
        assert!(messages[1].is_from_self);
    }

    #[test]
    fn test_out_of_range_timestamp_falls_back_to_now() {
        let body = notification(json!([
            {"from": "15551234567", "id": "wamid.1", "timestamp": "9223372036854775807",
             "type": "text", "text": {"body": "hi"}}
        ]));
        let payload: WebhookPayload = serde_json::from_value(body).unwrap();

        let messages = extract_messages(&payload);

        assert_eq!(messages.len(), 1);
        let now_ms = chrono::Utc::now().timestamp_millis();
        assert!((now_ms - messages[0].timestamp_ms).abs() < 60_000);
    }

    #[test]
    fn test_status_updates_have_no_messages() {
        let body = json!({
            "entry": [{"changes": [{"value": {
                "statuses": [{"id": "wamid.1", "status": "delivered"}]
            }}]}]
        });
        let payload: WebhookPayload = serde_json::from_value(body).unwrap();
        assert!(extract_messages(&payload).is_empty());
    }

    #[tokio::test]
    async fn test_post_acknowledges_and_processes_in_background() {
        let (app, assistant, sender) = app();
        let body = notification(json!([
            {"from": "15551234567", "id": "wamid.1", "timestamp": "1700000000",
             "type": "text", "text": {"body": "hello bot"}}
        ]));

        let response = app.oneshot(post_json(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for _ in 0..100 {
            if !sender.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(
            assistant.turns.lock().unwrap().clone(),
            vec![("15551234567".to_string(), "hello bot".to_string())]
        );
        assert_eq!(
            sender.sent(),
            vec![("15551234567".to_string(), "echo: hello bot".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unrecognised_payload_is_still_acknowledged() {
        let (app, assistant, _) = app();

        let response = app
            .oneshot(post_json(&json!({"entry": "not a list"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(assistant.turns.lock().unwrap().is_empty());
    }
}
