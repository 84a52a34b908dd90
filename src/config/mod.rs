use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub data_dir: String,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub max_distance_km: f64,
    pub geocoding_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(5000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".into()),
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .map(|v| v.parse().unwrap_or(60))
                .unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .map(|v| v.parse().unwrap_or(100))
                .unwrap_or(100),
            max_distance_km: env::var("MAX_DISTANCE_KM")
                .map(|v| v.parse().unwrap_or(50.0))
                .unwrap_or(50.0),
            geocoding_base_url: env::var("GEOCODING_BASE_URL").ok(),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            server_host: "127.0.0.1".into(),
            server_port: 0,
            api_base_uri: "/api".into(),
            jwt_secret: "test-secret".into(),
            jwt_expiration_secs: 3600,
            data_dir: String::new(),
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            max_distance_km: 50.0,
            geocoding_base_url: None,
        }
    }
}
