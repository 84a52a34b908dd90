use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message as WsFrame, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::events::{ClientEvent, ServerEvent};
use crate::AppState;
use crate::error::AppError;
use crate::routes::message::model::{AppendOutcome, Message};

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[axum::debug_handler]
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, query.user_id, socket))
}

async fn handle_socket(state: AppState, user_id: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let conn_id = state.sessions.register(&user_id, tx.clone());
    tracing::info!("user connected: {}", user_id);

    let _ = tx.send(ServerEvent::Connected {
        user_id: user_id.clone(),
    });

    // 推送通道到 socket 的转发任务；投递路径不等磁盘
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(WsFrame::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        let text = match frame {
            WsFrame::Text(text) => text,
            WsFrame::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => {
                if let Err(e) = dispatch(&state, &user_id, event).await {
                    tracing::warn!("ws event from {} failed: {}", user_id, e);
                    let _ = tx.send(ServerEvent::MessageError {
                        error: e.to_string(),
                    });
                }
            }
            Err(e) => {
                tracing::debug!("unparseable ws frame from {}: {}", user_id, e);
            }
        }
    }

    // 连接断开：撤销会话，后续投递降级为仅落库
    state.sessions.unregister(&user_id, conn_id);
    writer.abort();
    tracing::info!("user disconnected: {}", user_id);
}

// 发送方身份一律取连接身份，不信任帧里的 senderId
async fn dispatch(state: &AppState, user_id: &str, event: ClientEvent) -> Result<(), AppError> {
    match event {
        ClientEvent::Message {
            chat_id,
            content,
            receiver_id,
        } => {
            let outcome =
                Message::send(&state.store, &state.sessions, &chat_id, user_id, &receiver_id, &content)
                    .await?;

            // 重复帧静默丢弃，不回执也不重推
            if let AppendOutcome::Appended(message) = outcome {
                state.sessions.push(
                    user_id,
                    ServerEvent::MessageSent {
                        chat_id,
                        message,
                    },
                );
            }
            Ok(())
        }
        ClientEvent::MarkAsRead { chat_id } => {
            Message::mark_read(&state.store, &state.sessions, &chat_id, user_id).await?;
            Ok(())
        }
    }
}
