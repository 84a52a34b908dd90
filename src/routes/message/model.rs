use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::realtime::{ServerEvent, SessionRegistry};
use crate::routes::notification::model::{NewNotification, Notification, NotificationKind};
use crate::store::Store;
use crate::utils::new_id;

// 重复消息判定窗口（双击/重连重发防护，尽力而为，不是强幂等键）
const DUPLICATE_WINDOW_MS: i64 = 5_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

#[derive(Debug)]
pub enum AppendOutcome {
    Appended(Message),
    Duplicate(Message),
}

impl AppendOutcome {
    pub fn message(&self) -> &Message {
        match self {
            AppendOutcome::Appended(m) | AppendOutcome::Duplicate(m) => m,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, AppendOutcome::Appended(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageRequest {
    pub chat_id: String,
    pub receiver_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadRequest {
    pub chat_id: String,
}

impl Message {
    // 追加消息并推送给接收方；接收方不在线时落一条 new_message 通知。
    // 发送方身份由调用方（会话/令牌）给出。
    pub async fn send(
        store: &Store,
        sessions: &SessionRegistry,
        chat_id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<AppendOutcome, AppError> {
        let sender = store
            .users
            .get(sender_id)
            .await
            .ok_or(AppError::NotFound("user"))?;
        let sender_name = sender.display_name().to_string();

        let outcome = Self::append(store, chat_id, sender_id, &sender_name, receiver_id, content)
            .await?;

        if let AppendOutcome::Appended(message) = &outcome {
            let delivered = sessions.push(
                receiver_id,
                ServerEvent::Message {
                    chat_id: chat_id.to_string(),
                    message: message.clone(),
                },
            );
            if !delivered {
                Notification::dispatch(
                    store,
                    sessions,
                    NewNotification {
                        user_id: receiver_id.to_string(),
                        kind: NotificationKind::NewMessage,
                        title: "New Message".into(),
                        message: format!("New message from {}", sender_name),
                        donation_id: None,
                        chat_id: Some(chat_id.to_string()),
                    },
                )
                .await?;
            }
        }

        Ok(outcome)
    }

    // 追加本体：空内容拒绝；5 秒内相同 (content, sender, receiver)
    // 视为重复，静默返回已存在的那条。判定与写入同一临界区。
    pub async fn append(
        store: &Store,
        chat_id: &str,
        sender_id: &str,
        sender_name: &str,
        receiver_id: &str,
        content: &str,
    ) -> Result<AppendOutcome, AppError> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("message content must not be empty".into()));
        }

        let sender_id = sender_id.to_string();
        let sender_name = sender_name.to_string();
        let receiver_id = receiver_id.to_string();
        let content = content.to_string();
        let chat_id_owned = chat_id.to_string();

        store
            .chats
            .update_with(chat_id, move |chat| {
                if !chat.has_participant(&sender_id) || !chat.has_participant(&receiver_id) {
                    return Err(AppError::Validation(
                        "sender and receiver must both be chat participants".into(),
                    ));
                }

                let now = Utc::now();
                let duplicate = chat.messages.iter().rev().find(|m| {
                    m.content == content
                        && m.sender_id == sender_id
                        && m.receiver_id == receiver_id
                        && (now - m.created_at).num_milliseconds().abs() < DUPLICATE_WINDOW_MS
                });
                if let Some(existing) = duplicate {
                    return Ok((AppendOutcome::Duplicate(existing.clone()), false));
                }

                let message = Message {
                    id: new_id("msg"),
                    chat_id: chat_id_owned,
                    sender_id,
                    sender_name,
                    receiver_id,
                    content,
                    created_at: now,
                    is_read: false,
                };
                chat.messages.push(message.clone());
                chat.last_message = Some(message.clone());
                chat.updated_at = now;
                Ok((AppendOutcome::Appended(message), true))
            })
            .await
    }

    // 把会话里发给 reader 的未读消息全部置已读；返回是否有变化。
    // is_read 置位后不再回退。有变化时向对端推送已读回执。
    pub async fn mark_read(
        store: &Store,
        sessions: &SessionRegistry,
        chat_id: &str,
        reader_id: &str,
    ) -> Result<bool, AppError> {
        let reader = reader_id.to_string();
        let changed = store
            .chats
            .update_with(chat_id, move |chat| {
                let mut changed = false;
                for message in chat.messages.iter_mut() {
                    if message.receiver_id == reader && !message.is_read {
                        message.is_read = true;
                        changed = true;
                    }
                }
                if changed {
                    if let Some(last) = chat.last_message.as_mut() {
                        if last.receiver_id == reader {
                            last.is_read = true;
                        }
                    }
                }
                Ok((changed, changed))
            })
            .await?;

        if changed {
            if let Some(chat) = store.chats.get(chat_id).await {
                for participant in chat.participant_ids.iter().filter(|p| *p != reader_id) {
                    sessions.push(
                        participant,
                        ServerEvent::MessagesRead {
                            chat_id: chat_id.to_string(),
                            user_id: reader_id.to_string(),
                        },
                    );
                }
            }
        }

        Ok(changed)
    }
}
