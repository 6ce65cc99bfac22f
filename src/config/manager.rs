//! 配置管理器
//!
//! 加载顺序：`.env` 文件 → 配置文件（TOML 或 JSON）→ `BAITBLOCK_*` 环境变量 → 验证

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::error::{BaitblockError, BaitblockResult};

/// 持久化目标配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SinkConfig {
    pub url: Option<String>,
    pub table: String,
    pub api_key: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: None,
            table: constants::DEFAULT_SINK_TABLE.to_string(),
            api_key: None,
        }
    }
}

impl SinkConfig {
    /// 地址与密钥都存在时才启用持久化
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

/// 管道配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BaitblockConfig {
    // 分类服务
    pub classifier_url: String,
    pub positive_label: String,
    pub flush_interval_ms: u64,
    pub request_timeout_ms: u64,

    // 信号过滤
    pub min_signal_words: usize,
    pub long_token_chars: usize,

    // 提取
    pub container_retry_ms: u64,
    pub container_max_attempts: u32,
    pub url_poll_ms: u64,

    // 偏好
    pub capture_default: bool,
    pub preference_path: Option<String>,

    pub sink: SinkConfig,
}

impl Default for BaitblockConfig {
    fn default() -> Self {
        Self {
            classifier_url: constants::DEFAULT_CLASSIFIER_URL.to_string(),
            positive_label: constants::DEFAULT_POSITIVE_LABEL.to_string(),
            flush_interval_ms: constants::DEFAULT_FLUSH_INTERVAL.as_millis() as u64,
            request_timeout_ms: constants::DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,

            min_signal_words: constants::MIN_SIGNAL_WORDS,
            long_token_chars: constants::LONG_TOKEN_CHARS,

            container_retry_ms: constants::CONTAINER_RETRY_INTERVAL.as_millis() as u64,
            container_max_attempts: constants::CONTAINER_MAX_ATTEMPTS,
            url_poll_ms: constants::URL_POLL_INTERVAL.as_millis() as u64,

            capture_default: constants::DEFAULT_FEED_ENABLED,
            preference_path: None,

            sink: SinkConfig::default(),
        }
    }
}

impl BaitblockConfig {
    /// 验证配置
    pub fn validate(&self) -> BaitblockResult<()> {
        if self.flush_interval_ms == 0 {
            return Err(BaitblockError::ConfigError("批次间隔不能为0".to_string()));
        }

        if self.request_timeout_ms == 0 {
            return Err(BaitblockError::ConfigError("请求超时不能为0".to_string()));
        }

        if self.container_max_attempts == 0 {
            return Err(BaitblockError::ConfigError(
                "容器查找次数必须大于0".to_string(),
            ));
        }

        if self.positive_label.trim().is_empty() {
            return Err(BaitblockError::ConfigError("正例标签不能为空".to_string()));
        }

        let classifier = url::Url::parse(&self.classifier_url)?;
        if !matches!(classifier.scheme(), "http" | "https") {
            return Err(BaitblockError::ConfigError(format!(
                "分类服务地址必须是 http(s): {}",
                self.classifier_url
            )));
        }

        if let Some(sink_url) = &self.sink.url {
            url::Url::parse(sink_url)?;
            if self.sink.api_key.is_none() {
                return Err(BaitblockError::ConfigError(
                    "配置了数据库地址但缺少 API 密钥".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{classifier, extraction, storage, switches, EnvVar};

        if let Ok(api_url) = classifier::ApiUrl::get() {
            self.classifier_url = api_url;
            tracing::info!("环境变量覆盖分类服务地址: {}", self.classifier_url);
        }

        if let Ok(label) = classifier::PositiveLabel::get() {
            self.positive_label = label;
        }

        // 带默认值的变量只在显式设置时覆盖文件配置
        if std::env::var(classifier::FlushInterval::NAME).is_ok() {
            if let Ok(interval) = classifier::FlushInterval::get() {
                self.flush_interval_ms = interval.as_millis() as u64;
            }
        }

        if std::env::var(classifier::RequestTimeout::NAME).is_ok() {
            if let Ok(timeout) = classifier::RequestTimeout::get() {
                self.request_timeout_ms = timeout.as_millis() as u64;
            }
        }

        if std::env::var(extraction::RetryInterval::NAME).is_ok() {
            if let Ok(retry) = extraction::RetryInterval::get() {
                self.container_retry_ms = retry.as_millis() as u64;
            }
        }

        if std::env::var(extraction::MaxAttempts::NAME).is_ok() {
            if let Ok(attempts) = extraction::MaxAttempts::get() {
                self.container_max_attempts = attempts as u32;
            }
        }

        if std::env::var(extraction::UrlPollInterval::NAME).is_ok() {
            if let Ok(poll) = extraction::UrlPollInterval::get() {
                self.url_poll_ms = poll.as_millis() as u64;
            }
        }

        if std::env::var(switches::CaptureDefault::NAME).is_ok() {
            if let Ok(enabled) = switches::CaptureDefault::get() {
                self.capture_default = enabled;
            }
        }

        if let Ok(path) = storage::PreferencePath::get() {
            self.preference_path = Some(path);
        }

        if let Ok(sink_url) = storage::SinkUrl::get() {
            self.sink.url = Some(sink_url);
        }

        if let Ok(table) = storage::SinkTable::get() {
            self.sink.table = table;
        }

        if let Ok(key) = storage::SinkApiKey::get() {
            self.sink.api_key = Some(key);
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn container_retry_interval(&self) -> Duration {
        Duration::from_millis(self.container_retry_ms)
    }

    pub fn url_poll_interval(&self) -> Duration {
        Duration::from_millis(self.url_poll_ms)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: BaitblockConfig,
}

impl ConfigManager {
    /// 从搜索路径加载配置
    pub fn new() -> BaitblockResult<Self> {
        let config = Self::load_config()?;
        Self::finish(config)
    }

    /// 从指定文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> BaitblockResult<Self> {
        Self::load_dotenv();
        let config = Self::load_from_file(path.as_ref())?;
        Self::finish(config)
    }

    fn finish(mut config: BaitblockConfig) -> BaitblockResult<Self> {
        config.apply_env_overrides();
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &BaitblockConfig {
        &self.config
    }

    pub fn into_config(self) -> BaitblockConfig {
        self.config
    }

    fn load_config() -> BaitblockResult<BaitblockConfig> {
        Self::load_dotenv();

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(BaitblockConfig::default())
    }

    fn load_from_file(path: &Path) -> BaitblockResult<BaitblockConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BaitblockError::ConfigError(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&content)
                .map_err(|e| BaitblockError::ConfigError(format!("解析TOML配置失败: {}", e)))
        } else {
            serde_json::from_str(&content)
                .map_err(|e| BaitblockError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> BaitblockResult<()> {
        let content = toml::to_string_pretty(&BaitblockConfig::default())
            .map_err(|e| BaitblockError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| BaitblockError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
