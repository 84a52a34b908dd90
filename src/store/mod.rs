use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::error::AppError;
use crate::routes::chat::model::Chat;
use crate::routes::donation::model::Donation;
use crate::routes::notification::model::Notification;
use crate::routes::user::model::User;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt collection file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode collection {collection}: {source}")]
    Encode {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate id {0}")]
    DuplicateId(String),
}

pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: &'static str;
    const ENTITY: &'static str;

    fn id(&self) -> &str;
}

// 单集合：读走内存快照，写在同一临界区内完成校验、变更与落盘。
// 记录从不物理删除。
pub struct Collection<T: Record> {
    records: Arc<RwLock<HashMap<String, T>>>,
    write_lock: Arc<Mutex<()>>,
    path: Option<PathBuf>,
}

impl<T: Record> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Collection {
            records: Arc::clone(&self.records),
            write_lock: Arc::clone(&self.write_lock),
            path: self.path.clone(),
        }
    }
}

impl<T: Record> Collection<T> {
    fn in_memory() -> Self {
        Collection {
            records: Arc::new(RwLock::new(HashMap::new())),
            write_lock: Arc::new(Mutex::new(())),
            path: None,
        }
    }

    async fn load(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join(format!("{}.json", T::COLLECTION));
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<T> =
                    serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
                        path: path.clone(),
                        source,
                    })?;
                list.into_iter().map(|r| (r.id().to_string(), r)).collect()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };

        Ok(Collection {
            records: Arc::new(RwLock::new(records)),
            write_lock: Arc::new(Mutex::new(())),
            path: Some(path),
        })
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.records.read().await.values().find(|r| pred(r)).cloned()
    }

    pub async fn list(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.records
            .read()
            .await
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<T> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn insert(&self, record: T) -> Result<T, AppError> {
        let _guard = self.write_lock.lock().await;
        {
            let mut map = self.records.write().await;
            if map.contains_key(record.id()) {
                return Err(StoreError::DuplicateId(record.id().to_string()).into());
            }
            map.insert(record.id().to_string(), record.clone());
        }
        self.persist().await?;
        Ok(record)
    }

    // 与插入同一临界区内检查冲突，用于跨记录唯一性约束
    pub async fn insert_unless(
        &self,
        record: T,
        conflicts: impl Fn(&T) -> bool,
        conflict_error: impl FnOnce() -> AppError,
    ) -> Result<T, AppError> {
        let _guard = self.write_lock.lock().await;
        {
            let mut map = self.records.write().await;
            if map.values().any(|r| conflicts(r)) {
                return Err(conflict_error());
            }
            if map.contains_key(record.id()) {
                return Err(StoreError::DuplicateId(record.id().to_string()).into());
            }
            map.insert(record.id().to_string(), record.clone());
        }
        self.persist().await?;
        Ok(record)
    }

    pub async fn find_or_insert(
        &self,
        pred: impl Fn(&T) -> bool,
        make: impl FnOnce() -> T,
    ) -> Result<(T, bool), AppError> {
        let _guard = self.write_lock.lock().await;
        {
            let map = self.records.read().await;
            if let Some(existing) = map.values().find(|r| pred(r)) {
                return Ok((existing.clone(), false));
            }
        }
        let record = make();
        {
            let mut map = self.records.write().await;
            map.insert(record.id().to_string(), record.clone());
        }
        self.persist().await?;
        Ok((record, true))
    }

    // 记录级 check-and-mutate：闭包在临界区内校验并修改副本；
    // 返回 Err 则不落任何变更。mutated=false 时跳过落盘。
    pub async fn update_with<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut T) -> Result<(R, bool), AppError>,
    ) -> Result<R, AppError> {
        let _guard = self.write_lock.lock().await;
        let (value, mutated) = {
            let mut map = self.records.write().await;
            let record = map.get_mut(id).ok_or(AppError::NotFound(T::ENTITY))?;
            let mut draft = record.clone();
            let (value, mutated) = f(&mut draft)?;
            if mutated {
                *record = draft;
            }
            (value, mutated)
        };
        if mutated {
            self.persist().await?;
        }
        Ok(value)
    }

    pub async fn update(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut T) -> Result<(), AppError>,
    ) -> Result<T, AppError> {
        self.update_with(id, |record| {
            mutate(record)?;
            Ok((record.clone(), true))
        })
        .await
    }

    // 写临时文件再改名，避免半写状态
    async fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut snapshot: Vec<T> = self.records.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| a.id().cmp(b.id()));

        let bytes =
            serde_json::to_vec_pretty(&snapshot).map_err(|source| StoreError::Encode {
                collection: T::COLLECTION,
                source,
            })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct Store {
    pub users: Collection<User>,
    pub donations: Collection<Donation>,
    pub chats: Collection<Chat>,
    pub notifications: Collection<Notification>,
}

impl Store {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;

        Ok(Store {
            users: Collection::load(dir).await?,
            donations: Collection::load(dir).await?,
            chats: Collection::load(dir).await?,
            notifications: Collection::load(dir).await?,
        })
    }

    pub fn in_memory() -> Self {
        Store {
            users: Collection::in_memory(),
            donations: Collection::in_memory(),
            chats: Collection::in_memory(),
            notifications: Collection::in_memory(),
        }
    }
}
