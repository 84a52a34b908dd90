use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::message::model::Message;
use crate::routes::user::model::UserRole;
use crate::store::{Record, Store};
use crate::utils::new_id;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub donation_id: String,
    pub participant_ids: Vec<String>,
    pub messages: Vec<Message>,
    pub last_message: Option<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Chat {
    const COLLECTION: &'static str = "chats";
    const ENTITY: &'static str = "chat";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipant {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    pub role: UserRole,
}

// 会话 + 参会者展示信息，供前端列表渲染
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInfo {
    #[serde(flatten)]
    pub chat: Chat,
    pub participants: Vec<ChatParticipant>,
}

impl Chat {
    pub fn new(donation_id: &str, participant_ids: [String; 2]) -> Self {
        let now = Utc::now();
        Chat {
            id: new_id("chat"),
            donation_id: donation_id.to_string(),
            participant_ids: participant_ids.to_vec(),
            messages: Vec::new(),
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|p| p == user_id)
    }

    fn same_participants(&self, participant_ids: &[String; 2]) -> bool {
        self.participant_ids.len() == participant_ids.len()
            && participant_ids.iter().all(|p| self.has_participant(p))
    }

    // 幂等：同一捐赠 + 同一参与者集合只会有一个会话。
    // 查找与插入在同一临界区内，防止并发建出重复会话。
    pub async fn get_or_create(
        store: &Store,
        donation_id: &str,
        participant_ids: [String; 2],
    ) -> Result<(Chat, bool), AppError> {
        store
            .chats
            .find_or_insert(
                |c| c.donation_id == donation_id && c.same_participants(&participant_ids),
                || Chat::new(donation_id, participant_ids.clone()),
            )
            .await
    }

    pub async fn get(store: &Store, chat_id: &str) -> Result<Chat, AppError> {
        store
            .chats
            .get(chat_id)
            .await
            .ok_or(AppError::NotFound("chat"))
    }

    // 按捐赠取会话：捐赠被接受后才有会话可言
    pub async fn for_donation(store: &Store, donation_id: &str) -> Result<Chat, AppError> {
        let donation = store
            .donations
            .get(donation_id)
            .await
            .ok_or(AppError::NotFound("donation"))?;
        let ngo_id = donation
            .ngo_id
            .clone()
            .ok_or(AppError::NotFound("chat"))?;

        let (chat, _created) =
            Chat::get_or_create(store, donation_id, [donation.donor_id, ngo_id]).await?;
        Ok(chat)
    }

    pub async fn list_for_user(store: &Store, user_id: &str) -> Vec<Chat> {
        let mut chats = store.chats.list(|c| c.has_participant(user_id)).await;
        chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        chats
    }

    pub async fn enrich(store: &Store, chat: Chat) -> ChatInfo {
        let mut participants = Vec::with_capacity(chat.participant_ids.len());
        for participant_id in &chat.participant_ids {
            if let Some(user) = store.users.get(participant_id).await {
                participants.push(ChatParticipant {
                    id: user.id,
                    username: user.username,
                    organization_name: user.organization_name,
                    role: user.role,
                });
            }
        }
        ChatInfo { chat, participants }
    }
}
