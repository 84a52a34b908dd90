use serde::Deserialize;

use crate::routes::user::model::Address;

// Nominatim 风格的地理编码客户端。失败一律视为“无坐标”，
// 调用方退回邮编邻近启发式。
#[derive(Clone)]
pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

impl Geocoder {
    pub fn new(base_url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("foodbridge-backend")
            .build()?;
        Ok(Geocoder { client, base_url })
    }

    pub async fn lookup(&self, address: &Address) -> Option<(f64, f64)> {
        let query = format!(
            "{}, {}, {} {}, {}",
            address.street, address.city, address.state, address.pincode, address.country
        );
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("q", query.as_str()), ("limit", "1")])
            .send()
            .await;

        let hits: Vec<SearchHit> = match response {
            Ok(resp) => match resp.json().await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::warn!("geocoding response for {:?} unreadable: {}", address.city, e);
                    return None;
                }
            },
            Err(e) => {
                tracing::warn!("geocoding request for {:?} failed: {}", address.city, e);
                return None;
            }
        };

        let hit = hits.first()?;
        match (hit.lat.parse::<f64>(), hit.lon.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => Some((lat, lon)),
            _ => {
                tracing::warn!("geocoding returned unparseable coordinates");
                None
            }
        }
    }
}
