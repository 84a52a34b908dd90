use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use super::events::ServerEvent;

struct Session {
    conn_id: u64,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

// 在线用户 → 推送通道。每个用户至多一个活动会话，新连接顶掉旧的。
// 仅用于决定“推送还是只落库”，从不作为投递正确性的依据。
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    counter: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, tx: mpsc::UnboundedSender<ServerEvent>) -> u64 {
        let conn_id = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.sessions
            .write()
            .expect("session registry poisoned")
            .insert(user_id.to_string(), Session { conn_id, tx });
        conn_id
    }

    // 只有当前会话的断开才移除映射；被顶掉的旧连接迟到的断开不生效
    pub fn unregister(&self, user_id: &str, conn_id: u64) {
        let mut sessions = self.sessions.write().expect("session registry poisoned");
        if sessions.get(user_id).is_some_and(|s| s.conn_id == conn_id) {
            sessions.remove(user_id);
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.sessions
            .read()
            .expect("session registry poisoned")
            .contains_key(user_id)
    }

    // 返回是否推送成功；失败只降级为落库投递，不向上传播
    pub fn push(&self, user_id: &str, event: ServerEvent) -> bool {
        let sessions = self.sessions.read().expect("session registry poisoned");
        match sessions.get(user_id) {
            Some(session) => match session.tx.send(event) {
                Ok(()) => true,
                Err(_) => {
                    tracing::debug!("realtime push to {} failed, channel closed", user_id);
                    false
                }
            },
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_reaches_registered_session() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("user_1", tx);

        assert!(registry.push(
            "user_1",
            ServerEvent::Connected {
                user_id: "user_1".into()
            }
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerEvent::Connected { .. })
        ));
    }

    #[test]
    fn push_to_offline_user_reports_false() {
        let registry = SessionRegistry::new();
        assert!(!registry.push(
            "user_9",
            ServerEvent::Connected {
                user_id: "user_9".into()
            }
        ));
    }

    #[test]
    fn new_connection_supersedes_old() {
        let registry = SessionRegistry::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        let old_conn = registry.register("user_1", old_tx);
        let new_conn = registry.register("user_1", new_tx);

        registry.push(
            "user_1",
            ServerEvent::Connected {
                user_id: "user_1".into(),
            },
        );
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());

        // 旧连接迟到的断开不得移除新会话
        registry.unregister("user_1", old_conn);
        assert!(registry.is_online("user_1"));

        registry.unregister("user_1", new_conn);
        assert!(!registry.is_online("user_1"));
    }

    #[test]
    fn push_to_dropped_channel_degrades() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("user_1", tx);
        drop(rx);

        assert!(!registry.push(
            "user_1",
            ServerEvent::Connected {
                user_id: "user_1".into()
            }
        ));
    }
}
