use serde::Serialize;

use crate::routes::donation::model::DonationStatus;
use crate::routes::user::model::UserRole;
use crate::store::Store;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_donations: usize,
    pub total_servings: u64,
    pub total_people_fed: u64,
    pub total_ngos: usize,
    pub active_donations: usize,
    pub completed_donations: usize,
}

impl Stats {
    pub async fn compute(store: &Store) -> Stats {
        let donations = store.donations.all().await;
        let ngos = store.users.list(|u| u.role == UserRole::Ngo).await;

        Stats {
            total_donations: donations.len(),
            total_servings: donations.iter().map(|d| u64::from(d.servings)).sum(),
            total_people_fed: donations
                .iter()
                .filter(|d| d.status == DonationStatus::Completed)
                .map(|d| u64::from(d.servings))
                .sum(),
            total_ngos: ngos.len(),
            active_donations: donations
                .iter()
                .filter(|d| {
                    matches!(d.status, DonationStatus::Pending | DonationStatus::Accepted)
                })
                .count(),
            completed_donations: donations
                .iter()
                .filter(|d| d.status == DonationStatus::Completed)
                .count(),
        }
    }
}
