//! 聊天容器查找
//!
//! 容器可能在启动时还不存在。查找过程是一个显式状态机：
//! `Searching` 每次查找失败后计数加一，达到上限进入 `GaveUp`。

use std::time::Duration;

use markup5ever_rcdom::Handle;

use super::layout::ChatLayout;
use crate::config::{constants, BaitblockConfig};
use crate::dom::PageDocument;
use crate::error::{BaitblockError, BaitblockResult};

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: constants::CONTAINER_RETRY_INTERVAL,
            max_attempts: constants::CONTAINER_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &BaitblockConfig) -> Self {
        Self {
            interval: config.container_retry_interval(),
            max_attempts: config.container_max_attempts,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ContainerSearch {
    Searching { attempts: u32 },
    Found(Handle),
    GaveUp { attempts: u32 },
}

impl ContainerSearch {
    pub fn new() -> Self {
        ContainerSearch::Searching { attempts: 0 }
    }

    /// 执行一次查找
    pub fn step(self, layout: &ChatLayout, root: &Handle, max_attempts: u32) -> Self {
        match self {
            ContainerSearch::Searching { attempts } => match layout.locate_container(root) {
                Some(container) => ContainerSearch::Found(container),
                None if attempts + 1 >= max_attempts => ContainerSearch::GaveUp {
                    attempts: attempts + 1,
                },
                None => ContainerSearch::Searching {
                    attempts: attempts + 1,
                },
            },
            terminal => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ContainerSearch::Searching { .. })
    }
}

impl Default for ContainerSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// 按重试策略查找容器
pub async fn search_container<D: PageDocument>(
    document: &D,
    layout: &ChatLayout,
    policy: RetryPolicy,
) -> BaitblockResult<Handle> {
    let mut state = ContainerSearch::new();
    loop {
        state = state.step(layout, &document.root(), policy.max_attempts);
        match state {
            ContainerSearch::Found(container) => {
                tracing::info!("找到 {} 聊天容器", layout.platform);
                return Ok(container);
            }
            ContainerSearch::GaveUp { attempts } => {
                return Err(BaitblockError::ContainerNotFound {
                    platform: layout.platform.to_string(),
                    attempts,
                });
            }
            ContainerSearch::Searching { attempts } => {
                tracing::debug!("{} 聊天容器尚未出现，第 {} 次", layout.platform, attempts);
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}
