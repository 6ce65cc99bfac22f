//! 抓取开关
//!
//! [`PreferenceGate`] 保存一个布尔值 `feedEnabled`（缺省为 `true`），
//! 由外部键值存储持久化。每个执行上下文持有自己的镜像：协调上下文通过
//! [`PreferenceGate::set_enabled`] 写入并通知，抓取上下文收到 `feedToggle`
//! 后用 [`PreferenceGate::apply_remote`] 只更新内存值。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::config::constants::{DEFAULT_FEED_ENABLED, FEED_ENABLED_KEY};
use crate::error::{helpers, BaitblockError, BaitblockResult};

/// 外部键值存储
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> BaitblockResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> BaitblockResult<()>;
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: Value) -> Self {
        let store = Self::default();
        if let Ok(mut values) = store.values.lock() {
            values.insert(key.to_string(), value);
        }
        store
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> BaitblockResult<Option<Value>> {
        let values = self
            .values
            .lock()
            .map_err(|e| BaitblockError::PreferenceError(format!("锁已中毒: {}", e)))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> BaitblockResult<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| BaitblockError::PreferenceError(format!("锁已中毒: {}", e)))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON 文件存储，整个文件是一个对象
#[derive(Debug)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFilePreferenceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> BaitblockResult<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            other => Err(BaitblockError::PreferenceError(format!(
                "偏好文件不是JSON对象: {}",
                other
            ))),
        }
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn get(&self, key: &str) -> BaitblockResult<Option<Value>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| BaitblockError::PreferenceError(format!("锁已中毒: {}", e)))?;
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> BaitblockResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|e| BaitblockError::PreferenceError(format!("锁已中毒: {}", e)))?;

        let mut map = self.read_map()?;
        map.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(&Value::Object(map))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

type ChangeListener = Arc<dyn Fn(bool) + Send + Sync>;

struct GateInner {
    store: Option<Arc<dyn PreferenceStore>>,
    state: watch::Sender<bool>,
    listeners: Mutex<Vec<(u64, ChangeListener)>>,
    next_id: AtomicU64,
}

/// 抓取开关
#[derive(Clone)]
pub struct PreferenceGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for PreferenceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceGate")
            .field("enabled", &self.is_enabled())
            .field("persistent", &self.inner.store.is_some())
            .finish()
    }
}

impl PreferenceGate {
    fn build(store: Option<Arc<dyn PreferenceStore>>, initial: bool) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            inner: Arc::new(GateInner {
                store,
                state,
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// 从存储读取初始值，缺失或读取失败时使用缺省值 `true`
    pub fn load(store: Arc<dyn PreferenceStore>) -> Self {
        Self::load_with_default(store, DEFAULT_FEED_ENABLED)
    }

    pub fn load_with_default(store: Arc<dyn PreferenceStore>, default: bool) -> Self {
        let initial = match store.get(FEED_ENABLED_KEY) {
            Ok(Some(Value::Bool(enabled))) => enabled,
            Ok(Some(other)) => {
                tracing::warn!("{} 的值不是布尔类型: {}，使用缺省值", FEED_ENABLED_KEY, other);
                default
            }
            Ok(None) => default,
            Err(e) => {
                helpers::log_error(&e);
                default
            }
        };
        tracing::debug!("抓取开关初始值: {}", initial);
        Self::build(Some(store), initial)
    }

    /// 不带存储的镜像
    pub fn mirror(initial: bool) -> Self {
        Self::build(None, initial)
    }

    pub fn is_enabled(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// 用户操作：持久化并通知
    ///
    /// 持久化失败只记录日志，内存值仍然改变。
    pub fn set_enabled(&self, enabled: bool) {
        if let Some(store) = &self.inner.store {
            if let Err(e) = store.set(FEED_ENABLED_KEY, Value::Bool(enabled)) {
                helpers::log_error(&e);
            }
        }
        self.update(enabled);
    }

    /// 收到其他上下文的广播：只更新内存值
    pub fn apply_remote(&self, enabled: bool) {
        self.update(enabled);
    }

    fn update(&self, enabled: bool) {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == enabled {
                false
            } else {
                *current = enabled;
                true
            }
        });
        if !changed {
            return;
        }

        tracing::info!("抓取开关: {}", if enabled { "开启" } else { "关闭" });
        let listeners: Vec<ChangeListener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(e) => {
                tracing::error!("偏好监听器锁已中毒: {}", e);
                return;
            }
        };
        for listener in listeners {
            listener(enabled);
        }
    }

    /// 注册变化回调，丢弃返回值即取消
    pub fn on_change<F>(&self, callback: F) -> PreferenceSubscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.inner.listeners.lock() {
            listeners.push((id, Arc::new(callback)));
        }
        PreferenceSubscription {
            gate: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// 异步上下文使用的变化通知
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }
}

/// 偏好回调句柄
pub struct PreferenceSubscription {
    gate: Weak<GateInner>,
    id: u64,
}

impl PreferenceSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for PreferenceSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.gate.upgrade() {
            if let Ok(mut listeners) = inner.listeners.lock() {
                listeners.retain(|(id, _)| *id != self.id);
            }
        }
    }
}
