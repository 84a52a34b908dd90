use axum::{
    Router,
    routing::{get, post, put},
};

use crate::AppState;
use crate::middleware::auth_middleware;
use crate::realtime;

pub mod chat;
pub mod donation;
pub mod message;
pub mod notification;
pub mod stats;
pub mod user;

// 路由分为公开与受保护两组；限流、CORS 等外层中间件由 main 挂载
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(user::register))
        .route("/auth/login", post(user::login))
        .route("/users/check-email", get(user::check_email))
        .route("/stats", get(stats::get_stats))
        // WebSocket 握手以 userId 作为会话关联键
        .route("/ws", get(realtime::ws_handler));

    let protected_routes = Router::new()
        // 用户
        .route("/users/by-id", get(user::find_by_id))
        .route("/users/update", put(user::update_profile))
        // 捐赠
        .route("/donations/create", post(donation::create_donation))
        .route("/donations/by-id", get(donation::find_by_id))
        .route("/donations/by-donor", get(donation::find_by_donor))
        .route("/donations/by-ngo", get(donation::find_by_ngo))
        .route("/donations/available", get(donation::find_available))
        .route("/donations/accept", post(donation::accept_donation))
        .route("/donations/update-status", post(donation::update_status))
        // 会话
        .route("/chats/mine", get(chat::list_mine))
        .route("/chats/by-donation", get(chat::find_by_donation))
        // 消息
        .route("/messages/create", post(message::create_message))
        .route("/messages/mark-read", post(message::mark_read))
        // 通知
        .route("/notifications/mine", get(notification::list_mine))
        .route(
            "/notifications/unread-count",
            get(notification::unread_count),
        )
        .route("/notifications/mark-read", post(notification::mark_read))
        // 认证中间件
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
