//! 配置管理模块
//!
//! 提供简化的配置管理，支持环境变量、配置文件和默认值

pub mod manager;

pub use manager::{BaitblockConfig, ConfigManager, SinkConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 分类批次相关
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8000";
    pub const CLASSIFY_PATH: &str = "label_messages";
    pub const DEFAULT_POSITIVE_LABEL: &str = "phishing";

    // 信号过滤相关
    pub const MIN_SIGNAL_WORDS: usize = 3;
    pub const LONG_TOKEN_CHARS: usize = 20;

    // 容器查找
    pub const CONTAINER_RETRY_INTERVAL: Duration = Duration::from_millis(500);
    pub const CONTAINER_MAX_ATTEMPTS: u32 = 20;

    // 路由
    pub const URL_POLL_INTERVAL: Duration = Duration::from_millis(250);

    // 偏好存储
    pub const FEED_ENABLED_KEY: &str = "feedEnabled";
    pub const DEFAULT_FEED_ENABLED: bool = true;

    // 持久化
    pub const DEFAULT_SINK_TABLE: &str = "kick_messages";

    // 标注
    pub const FLAG_STYLE: &str = "outline: 2px solid red;";
    pub const FLAG_ATTR: &str = "data-baitblock-flag";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "baitblock.toml",
        ".baitblock.toml",
        "~/.config/baitblock/config.toml",
    ];
}

/// 加载配置，失败时回退到默认值
pub fn load_config() -> BaitblockConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            BaitblockConfig::default()
        }
    }
}
