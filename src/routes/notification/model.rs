use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::realtime::{ServerEvent, SessionRegistry};
use crate::store::{Record, Store};
use crate::utils::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewDonation,
    DonationAccepted,
    DonationCompleted,
    NewMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub donation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Record for Notification {
    const COLLECTION: &'static str = "notifications";
    const ENTITY: &'static str = "notification";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
pub struct NewNotification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub donation_id: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkNotificationReadRequest {
    pub notification_id: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: usize,
}

impl Notification {
    // 先落库，再尽力实时推送。推送失败不影响结果：
    // 客户端总能从积压里取到。
    pub async fn dispatch(
        store: &Store,
        sessions: &SessionRegistry,
        new: NewNotification,
    ) -> Result<Notification, AppError> {
        let notification = store
            .notifications
            .insert(Notification {
                id: new_id("ntf"),
                user_id: new.user_id,
                kind: new.kind,
                title: new.title,
                message: new.message,
                donation_id: new.donation_id,
                chat_id: new.chat_id,
                read: false,
                created_at: Utc::now(),
            })
            .await?;

        if !sessions.push(
            &notification.user_id,
            ServerEvent::Notification(notification.clone()),
        ) {
            tracing::debug!(
                "user {} offline, notification {} persisted only",
                notification.user_id,
                notification.id
            );
        }

        Ok(notification)
    }

    pub async fn list_for_user(store: &Store, user_id: &str) -> Vec<Notification> {
        let mut notifications = store.notifications.list(|n| n.user_id == user_id).await;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }

    pub async fn unread_count(store: &Store, user_id: &str) -> usize {
        store
            .notifications
            .list(|n| n.user_id == user_id && !n.read)
            .await
            .len()
    }

    // 只有收件人能标记已读；对外不区分“不存在”与“不是你的”
    pub async fn mark_read(
        store: &Store,
        notification_id: &str,
        reader_id: &str,
    ) -> Result<Notification, AppError> {
        let reader = reader_id.to_string();
        store
            .notifications
            .update(notification_id, |n| {
                if n.user_id != reader {
                    return Err(AppError::NotFound("notification"));
                }
                n.read = true;
                Ok(())
            })
            .await
    }
}
