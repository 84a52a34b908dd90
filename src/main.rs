use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use foodbridge_backend::{
    AppState,
    config::Config,
    geocode::Geocoder,
    middleware::{RateLimiter, log_errors, rate_limit},
    proximity::Proximity,
    realtime::SessionRegistry,
    routes,
    store::Store,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 打开平面文件存储
    let store = Store::open(&config.data_dir)
        .await
        .expect("Failed to open data store");

    // 地理编码是外部协作方，未配置就不启用
    let geocoder = config.geocoding_base_url.clone().map(|base_url| {
        Arc::new(Geocoder::new(base_url).expect("Failed to create geocoding client"))
    });

    // 组装应用状态
    let state = AppState {
        proximity: Arc::new(Proximity::new(config.max_distance_km)),
        store,
        sessions: SessionRegistry::new(),
        geocoder,
        config: config.clone(),
    };

    // 设置限流器
    let rate_limiter = Arc::new(RateLimiter::new(config.clone()));

    let router = axum::Router::new().nest(&config.api_base_uri, routes::router(state.clone()));

    // 添加日志中间件和限流中间件
    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
