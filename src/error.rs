//! 统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。错误按照来源分为三类：
//!
//! - **瞬时环境错误**: 聊天容器尚未出现、元素结构不符合预期、标注时节点已被移除
//! - **外部服务错误**: 分类器不可达或响应格式错误、持久化写入失败
//! - **配置错误**: 不支持的平台/URL、无效的配置文件
//!
//! 本模块中没有任何错误对宿主页面是致命的；调用方记录日志后丢弃即可。

use std::fmt;

use thiserror::Error;

/// 管道错误类型
#[derive(Error, Debug, Clone)]
pub enum BaitblockError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 不支持的页面（非目标平台或保留路径）
    #[error("不支持的页面: {0}")]
    UnsupportedPage(String),

    /// 聊天容器在有限次重试后仍未找到
    #[error("未找到聊天容器 ({platform})，已尝试 {attempts} 次")]
    ContainerNotFound { platform: String, attempts: u32 },

    /// 元素结构不符合消息约定
    #[error("元素不是聊天消息: {0}")]
    NotAMessage(String),

    /// 标注时节点已不存在
    #[error("节点已不存在: {0}")]
    NodeGone(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 分类服务返回错误状态或无法解析的响应
    #[error("分类服务错误: {0}")]
    ClassifierError(String),

    /// 持久化写入失败
    #[error("持久化错误: {0}")]
    PersistenceError(String),

    /// 偏好存储读写失败
    #[error("偏好存储错误: {0}")]
    PreferenceError(String),

    /// 超时错误
    #[error("操作超时: {0}")]
    TimeoutError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 上下文之间的通道已关闭
    #[error("消息通道已关闭: {0}")]
    ChannelClosed(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl BaitblockError {
    /// 检查错误是否可重试
    ///
    /// 分类批次失败后不会重新入队，这里的结果只用于日志和统计。
    pub fn is_retryable(&self) -> bool {
        match self {
            BaitblockError::ContainerNotFound { .. } => true,
            BaitblockError::NetworkError(_) => true,
            BaitblockError::TimeoutError(_) => true,
            BaitblockError::ClassifierError(_) => true,
            BaitblockError::PersistenceError(_) => true,
            BaitblockError::PreferenceError(_) => true,
            BaitblockError::ConfigError(_) => false,
            BaitblockError::UnsupportedPage(_) => false,
            BaitblockError::NotAMessage(_) => false,
            BaitblockError::NodeGone(_) => false,
            BaitblockError::ParseError(_) => false,
            BaitblockError::SerializationError(_) => false,
            BaitblockError::ChannelClosed(_) => false,
            BaitblockError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BaitblockError::ConfigError(_) => ErrorSeverity::Critical,
            BaitblockError::UnsupportedPage(_) => ErrorSeverity::Info,
            BaitblockError::ContainerNotFound { .. } => ErrorSeverity::Warning,
            BaitblockError::NotAMessage(_) => ErrorSeverity::Info,
            BaitblockError::NodeGone(_) => ErrorSeverity::Info,
            BaitblockError::NetworkError(_) => ErrorSeverity::Warning,
            BaitblockError::ClassifierError(_) => ErrorSeverity::Warning,
            BaitblockError::PersistenceError(_) => ErrorSeverity::Warning,
            BaitblockError::PreferenceError(_) => ErrorSeverity::Warning,
            BaitblockError::TimeoutError(_) => ErrorSeverity::Warning,
            BaitblockError::ParseError(_) => ErrorSeverity::Error,
            BaitblockError::SerializationError(_) => ErrorSeverity::Error,
            BaitblockError::ChannelClosed(_) => ErrorSeverity::Error,
            BaitblockError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            BaitblockError::ContainerNotFound { .. }
            | BaitblockError::NotAMessage(_)
            | BaitblockError::NodeGone(_) => ErrorCategory::TransientEnvironment,
            BaitblockError::NetworkError(_)
            | BaitblockError::ClassifierError(_)
            | BaitblockError::PersistenceError(_)
            | BaitblockError::PreferenceError(_)
            | BaitblockError::TimeoutError(_) => ErrorCategory::ExternalService,
            BaitblockError::ConfigError(_)
            | BaitblockError::UnsupportedPage(_)
            | BaitblockError::ParseError(_) => ErrorCategory::Configuration,
            BaitblockError::SerializationError(_)
            | BaitblockError::ChannelClosed(_)
            | BaitblockError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let current_msg = self.to_string();
        let new_msg = format!("{} (上下文: {})", current_msg, context);

        match &mut self {
            BaitblockError::ConfigError(ref mut msg)
            | BaitblockError::UnsupportedPage(ref mut msg)
            | BaitblockError::NotAMessage(ref mut msg)
            | BaitblockError::NodeGone(ref mut msg)
            | BaitblockError::NetworkError(ref mut msg)
            | BaitblockError::ClassifierError(ref mut msg)
            | BaitblockError::PersistenceError(ref mut msg)
            | BaitblockError::PreferenceError(ref mut msg)
            | BaitblockError::TimeoutError(ref mut msg)
            | BaitblockError::ParseError(ref mut msg)
            | BaitblockError::SerializationError(ref mut msg)
            | BaitblockError::ChannelClosed(ref mut msg)
            | BaitblockError::InternalError(ref mut msg) => *msg = new_msg,
            BaitblockError::ContainerNotFound { .. } => {}
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 容器缺失、结构异常、节点消失：有限重试或静默跳过
    TransientEnvironment,
    /// 分类器或数据库不可用：记录日志并丢弃
    ExternalService,
    /// 不支持的页面或无效配置：进入空操作状态
    Configuration,
    Internal,
}

impl From<std::io::Error> for BaitblockError {
    fn from(error: std::io::Error) -> Self {
        BaitblockError::PreferenceError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for BaitblockError {
    fn from(error: serde_json::Error) -> Self {
        BaitblockError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for BaitblockError {
    fn from(error: toml::de::Error) -> Self {
        BaitblockError::ParseError(format!("TOML解析错误: {}", error))
    }
}

impl From<reqwest::Error> for BaitblockError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BaitblockError::TimeoutError(format!("HTTP请求超时: {}", error))
        } else if error.is_decode() {
            BaitblockError::ClassifierError(format!("响应解析失败: {}", error))
        } else {
            BaitblockError::NetworkError(error.to_string())
        }
    }
}

impl From<url::ParseError> for BaitblockError {
    fn from(error: url::ParseError) -> Self {
        BaitblockError::ConfigError(format!("URL无效: {}", error))
    }
}

impl From<tokio::time::error::Elapsed> for BaitblockError {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        BaitblockError::TimeoutError(format!("异步操作超时: {}", error))
    }
}

/// 错误结果类型别名
pub type BaitblockResult<T> = Result<T, BaitblockError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误，不向上传播
    pub fn log_error(error: &BaitblockError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::debug!("{}", error),
            ErrorSeverity::Warning => tracing::warn!("{}", error),
            ErrorSeverity::Error => tracing::error!("{}", error),
            ErrorSeverity::Critical => tracing::error!("严重错误: {}", error),
        }
    }

    /// 记录并返回错误
    pub fn log_and_return<T>(error: BaitblockError) -> BaitblockResult<T> {
        log_error(&error);
        Err(error)
    }

    /// 创建网络错误
    pub fn network_error<T: fmt::Display>(msg: T) -> BaitblockError {
        BaitblockError::NetworkError(msg.to_string())
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> BaitblockError {
        BaitblockError::ConfigError(msg.to_string())
    }

    /// 创建结构错误
    pub fn not_a_message<T: fmt::Display>(msg: T) -> BaitblockError {
        BaitblockError::NotAMessage(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_follow_taxonomy() {
        let missing = BaitblockError::ContainerNotFound {
            platform: "kick".to_string(),
            attempts: 20,
        };
        assert_eq!(missing.category(), ErrorCategory::TransientEnvironment);
        assert!(missing.is_retryable());

        let classifier = BaitblockError::ClassifierError("502".to_string());
        assert_eq!(classifier.category(), ErrorCategory::ExternalService);

        let page = BaitblockError::UnsupportedPage("https://example.com".to_string());
        assert_eq!(page.category(), ErrorCategory::Configuration);
        assert!(!page.is_retryable());
    }

    #[test]
    fn test_with_context_appends_message() {
        let err = BaitblockError::NetworkError("connection refused".to_string())
            .with_context("label_messages");
        let text = err.to_string();
        assert!(text.contains("connection refused"));
        assert!(text.contains("label_messages"));
    }
}
