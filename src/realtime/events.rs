use serde::{Deserialize, Serialize};

use crate::routes::chat::model::Chat;
use crate::routes::message::model::Message;
use crate::routes::notification::model::Notification;

// 与前端约定的帧格式：{"event": "...", "data": {...}}

#[derive(Debug, Clone, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    Message {
        chat_id: String,
        content: String,
        receiver_id: String,
    },
    MarkAsRead {
        chat_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected {
        user_id: String,
    },
    Message {
        chat_id: String,
        message: Message,
    },
    MessageSent {
        chat_id: String,
        message: Message,
    },
    MessagesRead {
        chat_id: String,
        user_id: String,
    },
    Notification(Notification),
    NewChat(Chat),
    MessageError {
        error: String,
    },
}
