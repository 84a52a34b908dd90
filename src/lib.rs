use std::sync::Arc;

use config::Config;
use geocode::Geocoder;
use proximity::ProximityPolicy;
use realtime::SessionRegistry;
use store::Store;

pub mod config;
pub mod error;
pub mod geocode;
pub mod middleware;
pub mod proximity;
pub mod realtime;
pub mod routes;
pub mod store;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub sessions: SessionRegistry,
    pub proximity: Arc<dyn ProximityPolicy>,
    pub geocoder: Option<Arc<Geocoder>>,
}
