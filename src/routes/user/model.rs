use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::geocode::Geocoder;
use crate::store::{Record, Store};
use crate::utils::{hash_password, new_id, verify_password};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Donor,
    Ngo,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Address {
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    // 只进存储文件，不进任何 API 响应（响应走 UserInfo）
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    pub phone: String,
    pub address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const ENTITY: &'static str = "user";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub email: String,
    pub username: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    pub phone: String,
    pub address: Address,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        UserInfo {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
            organization_name: user.organization_name,
            phone: user.phone,
            address: user.address,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
    pub role: UserRole,
    #[serde(default)]
    pub organization_name: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub address: Address,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub organization_name: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
}

impl User {
    // NGO 对外展示机构名，个人捐赠者展示用户名
    pub fn display_name(&self) -> &str {
        match self.role {
            UserRole::Ngo => self.organization_name.as_deref().unwrap_or(&self.username),
            UserRole::Donor => &self.username,
        }
    }

    pub async fn register(
        store: &Store,
        geocoder: Option<&Geocoder>,
        req: RegisterRequest,
    ) -> Result<User, AppError> {
        let email = req.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("a valid email is required".into()));
        }
        if req.password.len() < 6 {
            return Err(AppError::Validation(
                "password must be at least 6 characters".into(),
            ));
        }
        if req.username.trim().is_empty() {
            return Err(AppError::Validation("username is required".into()));
        }
        if req.phone.trim().is_empty() {
            return Err(AppError::Validation("phone is required".into()));
        }
        if req.role == UserRole::Ngo
            && req
                .organization_name
                .as_deref()
                .is_none_or(|name| name.trim().is_empty())
        {
            return Err(AppError::Validation(
                "organization name is required for NGO registration".into(),
            ));
        }

        let password_hash = hash_password(&req.password)
            .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))?;

        let mut address = req.address;
        if address.coords().is_none() {
            if let Some(geocoder) = geocoder {
                if let Some((lat, lng)) = geocoder.lookup(&address).await {
                    address.latitude = Some(lat);
                    address.longitude = Some(lng);
                }
            }
        }

        let now = Utc::now();
        let user = User {
            id: new_id("user"),
            email: email.clone(),
            username: req.username.trim().to_string(),
            role: req.role,
            password_hash,
            organization_name: match req.role {
                UserRole::Ngo => req.organization_name,
                UserRole::Donor => None,
            },
            phone: req.phone.trim().to_string(),
            address,
            created_at: now,
            updated_at: now,
        };

        // 邮箱唯一性与插入在同一临界区内检查
        store
            .users
            .insert_unless(
                user,
                |existing| existing.email == email,
                || AppError::EmailExists,
            )
            .await
    }

    pub async fn authenticate(store: &Store, req: LoginRequest) -> Result<User, AppError> {
        let email = req.email.trim().to_lowercase();
        let user = store
            .users
            .find(|u| u.email == email)
            .await
            .ok_or_else(|| AppError::Unauthorized("invalid email or password".into()))?;

        let valid = verify_password(&req.password, &user.password_hash)
            .map_err(|e| AppError::Internal(format!("failed to verify password: {}", e)))?;
        if !valid {
            return Err(AppError::Unauthorized("invalid email or password".into()));
        }

        Ok(user)
    }

    pub async fn email_exists(store: &Store, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        store.users.find(|u| u.email == email).await.is_some()
    }

    pub async fn update_profile(
        store: &Store,
        geocoder: Option<&Geocoder>,
        user_id: &str,
        req: UpdateUserRequest,
    ) -> Result<User, AppError> {
        // 地址变更时重新地理编码（尽力而为），在进入临界区前完成
        let new_address = match req.address {
            Some(mut address) => {
                if address.coords().is_none() {
                    if let Some(geocoder) = geocoder {
                        if let Some((lat, lng)) = geocoder.lookup(&address).await {
                            address.latitude = Some(lat);
                            address.longitude = Some(lng);
                        }
                    }
                }
                Some(address)
            }
            None => None,
        };

        store
            .users
            .update(user_id, |user| {
                if let Some(username) = req.username {
                    if username.trim().is_empty() {
                        return Err(AppError::Validation("username must not be empty".into()));
                    }
                    user.username = username.trim().to_string();
                }
                if let Some(phone) = req.phone {
                    user.phone = phone.trim().to_string();
                }
                if let Some(name) = req.organization_name {
                    if user.role != UserRole::Ngo {
                        return Err(AppError::Validation(
                            "only NGOs have an organization name".into(),
                        ));
                    }
                    user.organization_name = Some(name);
                }
                if let Some(address) = new_address {
                    user.address = address;
                }
                user.updated_at = Utc::now();
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_request(email: &str, role: UserRole) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "s3cret99".into(),
            username: "asha".into(),
            role,
            organization_name: match role {
                UserRole::Ngo => Some("Helping Hands".into()),
                UserRole::Donor => None,
            },
            phone: "9876543210".into(),
            address: Address {
                city: "Pune".into(),
                pincode: "411045".into(),
                ..Address::default()
            },
        }
    }

    #[tokio::test]
    async fn register_enforces_unique_email() {
        let store = Store::in_memory();
        User::register(&store, None, register_request("asha@example.com", UserRole::Donor))
            .await
            .unwrap();

        let result = User::register(
            &store,
            None,
            register_request("ASHA@example.com", UserRole::Donor),
        )
        .await;
        assert!(matches!(result, Err(AppError::EmailExists)));
    }

    #[tokio::test]
    async fn register_requires_organization_name_for_ngos() {
        let store = Store::in_memory();
        let mut req = register_request("ngo@example.com", UserRole::Ngo);
        req.organization_name = None;
        let result = User::register(&store, None, req).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn authenticate_accepts_correct_password_only() {
        let store = Store::in_memory();
        User::register(&store, None, register_request("asha@example.com", UserRole::Donor))
            .await
            .unwrap();

        let user = User::authenticate(
            &store,
            LoginRequest {
                email: "asha@example.com".into(),
                password: "s3cret99".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(user.email, "asha@example.com");

        let result = User::authenticate(
            &store,
            LoginRequest {
                email: "asha@example.com".into(),
                password: "wrong".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn display_name_prefers_organization_for_ngos() {
        let store = Store::in_memory();
        let ngo = User::register(&store, None, register_request("ngo@example.com", UserRole::Ngo))
            .await
            .unwrap();
        assert_eq!(ngo.display_name(), "Helping Hands");

        let donor = User::register(
            &store,
            None,
            register_request("donor@example.com", UserRole::Donor),
        )
        .await
        .unwrap();
        assert_eq!(donor.display_name(), "asha");
    }
}
