use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geocode::Geocoder;
use crate::proximity::ProximityPolicy;
use crate::realtime::{ServerEvent, SessionRegistry};
use crate::routes::chat::model::Chat;
use crate::routes::notification::model::{NewNotification, Notification, NotificationKind};
use crate::routes::user::model::{Address, UserRole};
use crate::store::{Record, Store};
use crate::utils::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FoodType {
    Cooked,
    Packaged,
    Perishable,
    NonPerishable,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonationStatus {
    Pending,
    Accepted,
    PickedUp,
    Completed,
    Cancelled,
}

impl DonationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DonationStatus::Pending => "pending",
            DonationStatus::Accepted => "accepted",
            DonationStatus::PickedUp => "picked_up",
            DonationStatus::Completed => "completed",
            DonationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DonationStatus::Completed | DonationStatus::Cancelled)
    }

    // pending -> accepted -> picked_up -> completed; pending -> cancelled
    pub fn can_transition_to(self, next: DonationStatus) -> bool {
        matches!(
            (self, next),
            (DonationStatus::Pending, DonationStatus::Accepted)
                | (DonationStatus::Accepted, DonationStatus::PickedUp)
                | (DonationStatus::PickedUp, DonationStatus::Completed)
                | (DonationStatus::Pending, DonationStatus::Cancelled)
        )
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donation {
    pub id: String,
    pub donor_id: String,
    pub donor_name: String,
    pub food_type: FoodType,
    pub servings: u32,
    pub pickup_time: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub location: Address,
    pub status: DonationStatus,
    pub ngo_id: Option<String>,
    pub ngo_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Donation {
    const COLLECTION: &'static str = "donations";
    const ENTITY: &'static str = "donation";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDonationRequest {
    pub food_type: FoodType,
    pub servings: u32,
    pub pickup_time: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    pub location: Address,
}

impl Donation {
    pub async fn create(
        store: &Store,
        sessions: &SessionRegistry,
        policy: &dyn ProximityPolicy,
        geocoder: Option<&Geocoder>,
        donor_id: &str,
        req: CreateDonationRequest,
    ) -> Result<Donation, AppError> {
        let donor = store
            .users
            .get(donor_id)
            .await
            .ok_or(AppError::NotFound("donor"))?;

        if req.servings == 0 {
            return Err(AppError::Validation("servings must be at least 1".into()));
        }
        if req.location.city.trim().is_empty() {
            return Err(AppError::Validation("pickup city is required".into()));
        }
        if req.expiry_date < req.pickup_time {
            return Err(AppError::Validation(
                "expiry date must not be before the pickup time".into(),
            ));
        }

        let mut location = req.location;
        if location.coords().is_none() {
            if let Some(geocoder) = geocoder {
                if let Some((lat, lng)) = geocoder.lookup(&location).await {
                    location.latitude = Some(lat);
                    location.longitude = Some(lng);
                }
            }
        }

        let now = Utc::now();
        let donation = store
            .donations
            .insert(Donation {
                id: new_id("donation"),
                donor_id: donor.id.clone(),
                donor_name: donor.display_name().to_string(),
                food_type: req.food_type,
                servings: req.servings,
                pickup_time: req.pickup_time,
                expiry_date: req.expiry_date,
                notes: req.notes,
                location,
                status: DonationStatus::Pending,
                ngo_id: None,
                ngo_name: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        // 向所有邻近 NGO 扇出通知。全表扫描，当前规模可接受；
        // 规模上去后应换网格/geohash 索引。
        let nearby_ngos = store
            .users
            .list(|u| u.role == UserRole::Ngo && policy.is_nearby(&donation.location, &u.address))
            .await;
        for ngo in nearby_ngos {
            Notification::dispatch(
                store,
                sessions,
                NewNotification {
                    user_id: ngo.id,
                    kind: NotificationKind::NewDonation,
                    title: "New Donation Available".into(),
                    message: format!(
                        "New food donation available near you in {}",
                        donation.location.city
                    ),
                    donation_id: Some(donation.id.clone()),
                    chat_id: None,
                },
            )
            .await?;
        }

        Ok(donation)
    }

    pub async fn accept(
        store: &Store,
        sessions: &SessionRegistry,
        policy: &dyn ProximityPolicy,
        donation_id: &str,
        ngo_id: &str,
    ) -> Result<Donation, AppError> {
        let ngo = store
            .users
            .get(ngo_id)
            .await
            .ok_or(AppError::NotFound("NGO"))?;
        if ngo.role != UserRole::Ngo {
            return Err(AppError::Validation("only NGOs can accept donations".into()));
        }

        let donation = store
            .donations
            .get(donation_id)
            .await
            .ok_or(AppError::NotFound("donation"))?;

        // 位置不再合格与“捐赠不存在”必须是可区分的两种失败
        if !policy.is_nearby(&donation.location, &ngo.address) {
            return Err(AppError::Ineligible(
                "donation is too far or not in the same region".into(),
            ));
        }

        let ngo_name = ngo.display_name().to_string();

        // 状态检查与写入在同一临界区：并发 accept 恰有一个成功
        let updated = store
            .donations
            .update(donation_id, |d| {
                match d.status {
                    DonationStatus::Pending => {}
                    DonationStatus::Accepted
                    | DonationStatus::PickedUp
                    | DonationStatus::Completed => {
                        return Err(AppError::Conflict("donation already taken".into()));
                    }
                    DonationStatus::Cancelled => {
                        return Err(AppError::InvalidTransition {
                            from: "cancelled",
                            to: "accepted",
                        });
                    }
                }
                d.status = DonationStatus::Accepted;
                d.ngo_id = Some(ngo.id.clone());
                d.ngo_name = Some(ngo_name.clone());
                d.updated_at = Utc::now();
                Ok(())
            })
            .await?;

        // 每个捐赠至多一个会话，重复接受请求拿到同一个
        let (chat, _created) =
            Chat::get_or_create(store, &updated.id, [updated.donor_id.clone(), ngo.id.clone()])
                .await?;

        sessions.push(&updated.donor_id, ServerEvent::NewChat(chat.clone()));
        sessions.push(&ngo.id, ServerEvent::NewChat(chat.clone()));

        Notification::dispatch(
            store,
            sessions,
            NewNotification {
                user_id: updated.donor_id.clone(),
                kind: NotificationKind::DonationAccepted,
                title: "Donation Accepted".into(),
                message: format!(
                    "Your donation has been accepted by {}. You can now chat with them.",
                    ngo_name
                ),
                donation_id: Some(updated.id.clone()),
                chat_id: Some(chat.id),
            },
        )
        .await?;

        Ok(updated)
    }

    pub async fn update_status(
        store: &Store,
        sessions: &SessionRegistry,
        donation_id: &str,
        new_status: DonationStatus,
        acting_user: &str,
    ) -> Result<Donation, AppError> {
        if new_status == DonationStatus::Accepted {
            return Err(AppError::Validation(
                "acceptance must go through the accept operation".into(),
            ));
        }

        let updated = store
            .donations
            .update(donation_id, |d| {
                if !d.status.can_transition_to(new_status) {
                    return Err(AppError::InvalidTransition {
                        from: d.status.as_str(),
                        to: new_status.as_str(),
                    });
                }
                match new_status {
                    DonationStatus::Cancelled => {
                        if d.donor_id != acting_user {
                            return Err(AppError::Validation(
                                "only the donor can cancel a donation".into(),
                            ));
                        }
                    }
                    DonationStatus::PickedUp | DonationStatus::Completed => {
                        if d.ngo_id.as_deref() != Some(acting_user) {
                            return Err(AppError::Validation(
                                "only the accepting NGO can update this donation".into(),
                            ));
                        }
                    }
                    DonationStatus::Pending | DonationStatus::Accepted => unreachable!(),
                }
                d.status = new_status;
                d.updated_at = Utc::now();
                Ok(())
            })
            .await?;

        if new_status == DonationStatus::Completed {
            Notification::dispatch(
                store,
                sessions,
                NewNotification {
                    user_id: updated.donor_id.clone(),
                    kind: NotificationKind::DonationCompleted,
                    title: "Donation Completed".into(),
                    message: format!(
                        "Your donation has been completed by {}. Thank you for sharing!",
                        updated.ngo_name.as_deref().unwrap_or("the NGO")
                    ),
                    donation_id: Some(updated.id.clone()),
                    chat_id: None,
                },
            )
            .await?;
        }

        Ok(updated)
    }

    pub async fn get(store: &Store, donation_id: &str) -> Result<Donation, AppError> {
        store
            .donations
            .get(donation_id)
            .await
            .ok_or(AppError::NotFound("donation"))
    }

    // 捐赠者视图：自己的捐赠 ∪ 附近其他捐赠者的捐赠（沿用现有跨捐赠者可见性）
    pub async fn list_for_donor(
        store: &Store,
        policy: &dyn ProximityPolicy,
        donor_id: &str,
    ) -> Result<Vec<Donation>, AppError> {
        let donor = store
            .users
            .get(donor_id)
            .await
            .ok_or(AppError::NotFound("donor"))?;

        let mut donations = store
            .donations
            .list(|d| d.donor_id == donor_id || policy.is_nearby(&d.location, &donor.address))
            .await;
        donations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(donations)
    }

    pub async fn list_for_ngo(store: &Store, ngo_id: &str) -> Vec<Donation> {
        let mut donations = store
            .donations
            .list(|d| d.ngo_id.as_deref() == Some(ngo_id))
            .await;
        donations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        donations
    }

    pub async fn list_available(
        store: &Store,
        policy: &dyn ProximityPolicy,
        ngo_id: Option<&str>,
    ) -> Result<Vec<Donation>, AppError> {
        let mut donations = match ngo_id {
            Some(ngo_id) => {
                let ngo = store
                    .users
                    .get(ngo_id)
                    .await
                    .ok_or(AppError::NotFound("NGO"))?;
                store
                    .donations
                    .list(|d| {
                        d.status == DonationStatus::Pending
                            && policy.is_nearby(&d.location, &ngo.address)
                    })
                    .await
            }
            None => {
                store
                    .donations
                    .list(|d| d.status == DonationStatus::Pending)
                    .await
            }
        };
        donations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(donations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::Proximity;
    use crate::routes::user::model::User;

    fn policy() -> Proximity {
        Proximity::new(50.0)
    }

    fn address(city: &str, pincode: &str) -> Address {
        Address {
            street: "MG Road".into(),
            city: city.into(),
            state: "Maharashtra".into(),
            pincode: pincode.into(),
            country: "India".into(),
            latitude: None,
            longitude: None,
        }
    }

    fn user(id: &str, role: UserRole, city: &str, pincode: &str) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            username: id.to_string(),
            role,
            password_hash: String::new(),
            organization_name: match role {
                UserRole::Ngo => Some(format!("{} Foundation", id)),
                UserRole::Donor => None,
            },
            phone: "9876543210".into(),
            address: address(city, pincode),
            created_at: now,
            updated_at: now,
        }
    }

    fn create_request(city: &str, pincode: &str) -> CreateDonationRequest {
        CreateDonationRequest {
            food_type: FoodType::Cooked,
            servings: 20,
            pickup_time: Utc::now(),
            expiry_date: Utc::now() + chrono::Duration::hours(6),
            notes: Some("vegetarian".into()),
            location: address(city, pincode),
        }
    }

    async fn seeded_store() -> Store {
        let store = Store::in_memory();
        store
            .users
            .insert(user("donor_pune", UserRole::Donor, "Pune", "411045"))
            .await
            .unwrap();
        store
            .users
            .insert(user("ngo_near", UserRole::Ngo, "Pune", "411048"))
            .await
            .unwrap();
        store
            .users
            .insert(user("ngo_far", UserRole::Ngo, "Pune", "411099"))
            .await
            .unwrap();
        store
            .users
            .insert(user("ngo_mumbai", UserRole::Ngo, "Mumbai", "411045"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn create_notifies_only_nearby_ngos() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();

        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        assert_eq!(donation.status, DonationStatus::Pending);
        assert!(donation.ngo_id.is_none());

        let near = store.notifications.list(|n| n.user_id == "ngo_near").await;
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].kind, NotificationKind::NewDonation);
        assert_eq!(near[0].donation_id.as_deref(), Some(donation.id.as_str()));

        assert!(store.notifications.list(|n| n.user_id == "ngo_far").await.is_empty());
        assert!(
            store
                .notifications
                .list(|n| n.user_id == "ngo_mumbai")
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn create_rejects_zero_servings() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let mut req = create_request("Pune", "411045");
        req.servings = 0;

        let result =
            Donation::create(&store, &sessions, &policy(), None, "donor_pune", req).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn accept_assigns_ngo_and_creates_chat() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        let accepted = Donation::accept(&store, &sessions, &policy(), &donation.id, "ngo_near")
            .await
            .unwrap();

        assert_eq!(accepted.status, DonationStatus::Accepted);
        assert_eq!(accepted.ngo_id.as_deref(), Some("ngo_near"));
        assert_eq!(accepted.ngo_name.as_deref(), Some("ngo_near Foundation"));

        let chats = store.chats.list(|c| c.donation_id == donation.id).await;
        assert_eq!(chats.len(), 1);
        assert!(chats[0].participant_ids.contains(&"donor_pune".to_string()));
        assert!(chats[0].participant_ids.contains(&"ngo_near".to_string()));

        let donor_inbox = store
            .notifications
            .list(|n| n.user_id == "donor_pune")
            .await;
        assert_eq!(donor_inbox.len(), 1);
        assert_eq!(donor_inbox[0].kind, NotificationKind::DonationAccepted);
        assert_eq!(donor_inbox[0].chat_id.as_deref(), Some(chats[0].id.as_str()));
    }

    #[tokio::test]
    async fn accept_rejects_ngo_outside_region_with_ineligible() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        let result =
            Donation::accept(&store, &sessions, &policy(), &donation.id, "ngo_mumbai").await;
        assert!(matches!(result, Err(AppError::Ineligible(_))));

        // 失败的接受不得改变捐赠状态
        let unchanged = store.donations.get(&donation.id).await.unwrap();
        assert_eq!(unchanged.status, DonationStatus::Pending);
        assert!(unchanged.ngo_id.is_none());
    }

    #[tokio::test]
    async fn accept_of_missing_donation_is_not_found() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let result =
            Donation::accept(&store, &sessions, &policy(), "donation_missing", "ngo_near").await;
        assert!(matches!(result, Err(AppError::NotFound("donation"))));
    }

    #[tokio::test]
    async fn concurrent_accepts_admit_exactly_one_winner() {
        let store = seeded_store().await;
        store
            .users
            .insert(user("ngo_near2", UserRole::Ngo, "Pune", "411043"))
            .await
            .unwrap();
        let sessions = SessionRegistry::new();
        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        let policy = policy();
        let (a, b) = tokio::join!(
            Donation::accept(&store, &sessions, &policy, &donation.id, "ngo_near"),
            Donation::accept(&store, &sessions, &policy, &donation.id, "ngo_near2"),
        );

        let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(loser, Err(AppError::Conflict(_))));

        // 恰好一个会话，归属唯一的赢家
        let chats = store.chats.list(|c| c.donation_id == donation.id).await;
        assert_eq!(chats.len(), 1);
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_completed() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        Donation::accept(&store, &sessions, &policy(), &donation.id, "ngo_near")
            .await
            .unwrap();
        let picked = Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::PickedUp,
            "ngo_near",
        )
        .await
        .unwrap();
        assert_eq!(picked.status, DonationStatus::PickedUp);

        let completed = Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::Completed,
            "ngo_near",
        )
        .await
        .unwrap();
        assert_eq!(completed.status, DonationStatus::Completed);
        // ngoId 在终态保留，供历史与统计使用
        assert_eq!(completed.ngo_id.as_deref(), Some("ngo_near"));

        let inbox = store
            .notifications
            .list(|n| n.user_id == "donor_pune" && n.kind == NotificationKind::DonationCompleted)
            .await;
        assert_eq!(inbox.len(), 1);
    }

    #[tokio::test]
    async fn illegal_transitions_are_rejected() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        // pending 不能直接 picked_up
        let result = Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::PickedUp,
            "ngo_near",
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));

        Donation::accept(&store, &sessions, &policy(), &donation.id, "ngo_near")
            .await
            .unwrap();
        Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::PickedUp,
            "ngo_near",
        )
        .await
        .unwrap();

        // picked_up 回不到 pending（请求方向非法）
        let result = Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::Cancelled,
            "donor_pune",
        )
        .await;
        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn cancel_is_donor_only_and_terminal() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let donation = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();

        let result = Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::Cancelled,
            "ngo_near",
        )
        .await;
        assert!(matches!(result, Err(AppError::Validation(_))));

        let cancelled = Donation::update_status(
            &store,
            &sessions,
            &donation.id,
            DonationStatus::Cancelled,
            "donor_pune",
        )
        .await
        .unwrap();
        assert_eq!(cancelled.status, DonationStatus::Cancelled);
        assert!(cancelled.ngo_id.is_none());

        // 终态之后一切转移非法
        let result =
            Donation::accept(&store, &sessions, &policy(), &donation.id, "ngo_near").await;
        assert!(matches!(result, Err(AppError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn donor_listing_includes_nearby_donations_from_others() {
        let store = seeded_store().await;
        store
            .users
            .insert(user("donor_other", UserRole::Donor, "Pune", "411046"))
            .await
            .unwrap();
        store
            .users
            .insert(user("donor_remote", UserRole::Donor, "Nagpur", "440001"))
            .await
            .unwrap();
        let sessions = SessionRegistry::new();

        Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();
        Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_other",
            create_request("Pune", "411046"),
        )
        .await
        .unwrap();
        Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_remote",
            create_request("Nagpur", "440001"),
        )
        .await
        .unwrap();

        let visible = Donation::list_for_donor(&store, &policy(), "donor_pune")
            .await
            .unwrap();
        assert_eq!(visible.len(), 2);

        let remote = Donation::list_for_donor(&store, &policy(), "donor_remote")
            .await
            .unwrap();
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test]
    async fn available_listing_filters_by_status_and_proximity() {
        let store = seeded_store().await;
        let sessions = SessionRegistry::new();
        let first = Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411045"),
        )
        .await
        .unwrap();
        Donation::create(
            &store,
            &sessions,
            &policy(),
            None,
            "donor_pune",
            create_request("Pune", "411046"),
        )
        .await
        .unwrap();

        Donation::accept(&store, &sessions, &policy(), &first.id, "ngo_near")
            .await
            .unwrap();

        let available = Donation::list_available(&store, &policy(), Some("ngo_near"))
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].status, DonationStatus::Pending);

        let for_ngo = Donation::list_for_ngo(&store, "ngo_near").await;
        assert_eq!(for_ngo.len(), 1);
        assert_eq!(for_ngo[0].id, first.id);

        // 不邻近的 NGO 看不到任何待领取捐赠
        let far = Donation::list_available(&store, &policy(), Some("ngo_mumbai"))
            .await
            .unwrap();
        assert!(far.is_empty());
    }
}
