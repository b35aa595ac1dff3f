//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching subscription commands and forwarding matching status
//! documents from the event bus.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{RedemptionToken, StatusDocument};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards documents for subscribed tokens from the [`broadcast::Receiver`].
pub async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<StatusDocument>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs);
                        if let Ok(json) = serde_json::to_string(&reply)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            doc = event_rx.recv() => {
                match doc {
                    Ok(doc) => {
                        if !subs.matches(&doc.token) {
                            continue;
                        }
                        let payload = serde_json::to_value(&doc).unwrap_or_default();
                        let msg = WsMessage::new(
                            uuid::Uuid::new_v4().to_string(),
                            WsMessageType::Event,
                            payload,
                        );
                        let json = serde_json::to_string(&msg).unwrap_or_default();
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind status stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!(subscriptions = subs.count(), "ws connection closed");
}

fn parse_tokens(raw: &[String]) -> Vec<RedemptionToken> {
    raw.iter().filter_map(|t| RedemptionToken::parse(t)).collect()
}

/// Handles a text message from the client and returns the reply.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error("", 400, "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, 400, "expected a command");
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command");
    };

    match command {
        WsCommand::Subscribe { tokens } => {
            let valid = parse_tokens(&tokens);
            let rejected = tokens.len() - valid.len();
            let added = subs.subscribe(valid);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": added.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "rejected": rejected,
                    "count": subs.count(),
                }),
            )
        }
        WsCommand::Unsubscribe { tokens } => {
            let tokens = parse_tokens(&tokens);
            subs.unsubscribe(&tokens);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": tokens.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "remaining_count": subs.count(),
                }),
            )
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn command(payload: serde_json::Value) -> String {
        serde_json::json!({ "id": "c1", "type": "command", "payload": payload }).to_string()
    }

    #[test]
    fn subscribe_reports_rejected_tokens() {
        let mut subs = SubscriptionManager::new();
        let token = RedemptionToken::generate();
        let reply = handle_text_message(
            &command(serde_json::json!({
                "command": "subscribe",
                "tokens": [token.to_string(), "not-a-token"],
            })),
            &mut subs,
        );
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "c1");
        assert_eq!(reply.payload["rejected"], 1);
        assert!(subs.matches(&token));
    }

    #[test]
    fn unsubscribe_drops_token() {
        let mut subs = SubscriptionManager::new();
        let token = RedemptionToken::generate();
        subs.subscribe(vec![token.clone()]);
        let reply = handle_text_message(
            &command(serde_json::json!({
                "command": "unsubscribe",
                "tokens": [token.to_string()],
            })),
            &mut subs,
        );
        assert_eq!(reply.payload["remaining_count"], 0);
        assert!(!subs.matches(&token));
    }

    #[test]
    fn garbage_and_unknown_commands_are_errors() {
        let mut subs = SubscriptionManager::new();
        assert_eq!(
            handle_text_message("{", &mut subs).msg_type,
            WsMessageType::Error
        );
        let swap = command(serde_json::json!({"command": "swap"}));
        let reply = handle_text_message(&swap, &mut subs);
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(reply.payload["code"], 404);
    }
}
