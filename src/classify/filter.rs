//! 信号过滤器
//!
//! 判断一条消息是否值得送去分类。过滤发生在入队时而不是提取时，
//! 所以原始消息的持久化不受影响。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use regex::Regex;

use crate::config::{constants, BaitblockConfig};

/// 最小信号过滤器
#[derive(Debug)]
pub struct SignalFilter {
    min_words: usize,
    long_token_chars: usize,
    permissive: bool,
    stats: FilterStats,
}

/// 过滤统计
#[derive(Debug, Default)]
pub struct FilterStats {
    pub accepted: AtomicUsize,
    pub rejected: AtomicUsize,
}

fn link_regex() -> Option<&'static Regex> {
    static LINK: OnceLock<Option<Regex>> = OnceLock::new();
    LINK.get_or_init(|| {
        // 协议链接、www 开头或「名字.顶级域」形式的裸域名，输入已转为小写
        Regex::new(r"^(?:https?://\S+|www\.\S+|[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}(?:/\S*)?)$")
            .map_err(|e| tracing::error!("链接正则编译失败: {}", e))
            .ok()
    })
    .as_ref()
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self::new(constants::MIN_SIGNAL_WORDS, constants::LONG_TOKEN_CHARS)
    }
}

impl SignalFilter {
    pub fn new(min_words: usize, long_token_chars: usize) -> Self {
        Self {
            min_words,
            long_token_chars,
            permissive: false,
            stats: FilterStats::default(),
        }
    }

    pub fn from_config(config: &BaitblockConfig) -> Self {
        Self::new(config.min_signal_words, config.long_token_chars)
    }

    /// 接受任何非空文本
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn accepts(&self, text: &str) -> bool {
        let accepted = self.evaluate(text.trim());
        let counter = if accepted {
            &self.stats.accepted
        } else {
            &self.stats.rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
        accepted
    }

    fn evaluate(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        if self.permissive {
            return true;
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() >= self.min_words {
            return true;
        }

        tokens.iter().any(|token| {
            token.chars().count() >= self.long_token_chars
                || link_regex().map_or(false, |re| re.is_match(&token.to_lowercase()))
        })
    }

    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_threshold() {
        let filter = SignalFilter::default();
        assert!(filter.accepts("free skins here"));
        assert!(!filter.accepts("hello friend"));
        assert!(!filter.accepts("ok"));
        assert!(!filter.accepts("   "));
    }

    #[test]
    fn test_links_and_long_tokens_pass() {
        let filter = SignalFilter::default();
        assert!(filter.accepts("https://bit.ly/x"));
        assert!(filter.accepts("visit csgo-drop.gg"));
        assert!(filter.accepts("aaaaaaaaaaaaaaaaaaaaaaaa"));
        assert!(!filter.accepts("lol."));
        assert_eq!(filter.stats().accepted.load(Ordering::Relaxed), 3);
        assert_eq!(filter.stats().rejected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_permissive_keeps_short_text() {
        let filter = SignalFilter::permissive();
        assert!(filter.accepts("ok"));
        assert!(!filter.accepts(""));
    }
}
