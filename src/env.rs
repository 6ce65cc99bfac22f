//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问。所有变量以 `BAITBLOCK_` 为前缀，
//! 由 [`crate::config::BaitblockConfig::apply_env_overrides`] 统一读取。

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "BAITBLOCK_LOG_LEVEL";
        const DEFAULT: Option<String> = None;

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 分类服务相关环境变量
pub mod classifier {
    use super::*;

    /// 分类服务地址
    pub struct ApiUrl;
    impl EnvVar<String> for ApiUrl {
        const NAME: &'static str = "BAITBLOCK_CLASSIFIER_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Base URL of the message classifier service";

        fn parse(value: &str) -> EnvResult<String> {
            parse_http_url(value, Self::NAME)
        }
    }

    /// 批次发送间隔
    pub struct FlushInterval;
    impl EnvVar<Duration> for FlushInterval {
        const NAME: &'static str = "BAITBLOCK_FLUSH_INTERVAL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(1000));
        const DESCRIPTION: &'static str = "Classification batch cadence in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 50, 60_000)
        }
    }

    /// 请求超时
    pub struct RequestTimeout;
    impl EnvVar<Duration> for RequestTimeout {
        const NAME: &'static str = "BAITBLOCK_CLASSIFIER_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_secs(10));
        const DESCRIPTION: &'static str = "Classifier request timeout in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 100, 120_000)
        }
    }

    /// 判定为钓鱼的标签
    pub struct PositiveLabel;
    impl EnvVar<String> for PositiveLabel {
        const NAME: &'static str = "BAITBLOCK_POSITIVE_LABEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Classifier label treated as a positive (flagged) verdict";

        fn parse(value: &str) -> EnvResult<String> {
            let label = value.trim();
            if label.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Label cannot be empty".to_string(),
                });
            }
            Ok(label.to_string())
        }
    }
}

/// 消息提取相关环境变量
pub mod extraction {
    use super::*;

    /// 容器查找重试间隔
    pub struct RetryInterval;
    impl EnvVar<Duration> for RetryInterval {
        const NAME: &'static str = "BAITBLOCK_CONTAINER_RETRY_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(500));
        const DESCRIPTION: &'static str = "Delay between chat container lookups in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 10, 10_000)
        }
    }

    /// 容器查找最大次数
    pub struct MaxAttempts;
    impl EnvVar<usize> for MaxAttempts {
        const NAME: &'static str = "BAITBLOCK_CONTAINER_MAX_ATTEMPTS";
        const DEFAULT: Option<usize> = Some(20);
        const DESCRIPTION: &'static str = "Maximum chat container lookups before giving up";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1000)
        }
    }

    /// URL 轮询间隔
    pub struct UrlPollInterval;
    impl EnvVar<Duration> for UrlPollInterval {
        const NAME: &'static str = "BAITBLOCK_URL_POLL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(250));
        const DESCRIPTION: &'static str = "Interval for polling the page URL in milliseconds";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 10, 10_000)
        }
    }
}

/// 偏好与持久化相关环境变量
pub mod storage {
    use super::*;

    /// 偏好文件路径
    pub struct PreferencePath;
    impl EnvVar<String> for PreferencePath {
        const NAME: &'static str = "BAITBLOCK_PREFERENCE_PATH";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "JSON file backing the capture preference";

        fn parse(value: &str) -> EnvResult<String> {
            let path = value.trim();
            if path.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Path cannot be empty".to_string(),
                });
            }
            Ok(shellexpand::tilde(path).into_owned())
        }
    }

    /// 数据库 REST 地址
    pub struct SinkUrl;
    impl EnvVar<String> for SinkUrl {
        const NAME: &'static str = "BAITBLOCK_SINK_URL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Base URL of the hosted database REST endpoint";

        fn parse(value: &str) -> EnvResult<String> {
            parse_http_url(value, Self::NAME)
        }
    }

    /// 数据库表名
    pub struct SinkTable;
    impl EnvVar<String> for SinkTable {
        const NAME: &'static str = "BAITBLOCK_SINK_TABLE";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Table receiving captured chat messages";

        fn parse(value: &str) -> EnvResult<String> {
            let table = value.trim();
            if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Table name must be non-empty [A-Za-z0-9_]".to_string(),
                });
            }
            Ok(table.to_string())
        }
    }

    /// 数据库匿名密钥
    pub struct SinkApiKey;
    impl EnvVar<String> for SinkApiKey {
        const NAME: &'static str = "BAITBLOCK_SINK_ANON_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Anonymous API key for the hosted database";

        fn parse(value: &str) -> EnvResult<String> {
            let key = value.trim();
            if key.len() < 8 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API key must be at least 8 characters".to_string(),
                });
            }
            Ok(key.to_string())
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_millis(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let millis = parse_positive_usize(value, var_name, min as usize, max as usize)?;
    Ok(Duration::from_millis(millis as u64))
}

fn parse_http_url(value: &str, var_name: &str) -> EnvResult<String> {
    let url = value.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(url.to_string())
    } else {
        Err(EnvError {
            variable: var_name.to_string(),
            message: "URL must start with http:// or https://".to_string(),
        })
    }
}

/// 布尔开关
pub mod switches {
    use super::*;

    /// 首次运行时的默认抓取开关
    pub struct CaptureDefault;
    impl EnvVar<bool> for CaptureDefault {
        const NAME: &'static str = "BAITBLOCK_CAPTURE_DEFAULT";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Capture state used when no preference has been stored";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("YES", "X").unwrap(), true);
        assert_eq!(parse_bool("off", "X").unwrap(), false);
        assert!(parse_bool("maybe", "X").is_err());
    }

    #[test]
    fn test_parse_millis_bounds() {
        assert_eq!(
            parse_millis("250", "X", 10, 1000).unwrap(),
            Duration::from_millis(250)
        );
        assert!(parse_millis("5", "X", 10, 1000).is_err());
        assert!(parse_millis("abc", "X", 10, 1000).is_err());
    }

    #[test]
    fn test_url_validation_strips_trailing_slash() {
        assert_eq!(
            classifier::ApiUrl::parse("http://localhost:8000/").unwrap(),
            "http://localhost:8000"
        );
        assert!(classifier::ApiUrl::parse("localhost:8000").is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(storage::SinkTable::parse("kick_messages").is_ok());
        assert!(storage::SinkTable::parse("drop table;").is_err());
    }
}
