//! 页面路由
//!
//! 把当前 URL 归类为「无直播」或「平台 + 主播标识」，并在单页应用内的 URL
//! 变化时通知订阅者。提供两种等价的检测策略：
//!
//! - [`PageRouter::watch_polling`]：定时轮询 [`UrlSource`]
//! - [`PageRouter::watch_history`]：拦截 [`History`] 的 push/replace/pop/hash 事件
//!
//! 两种策略都在订阅时立即触发一次，之后只在 href 真正变化时触发。

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{BaitblockError, BaitblockResult};

/// 支持的直播平台
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Kick,
    Twitch,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Kick, Platform::Twitch];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Kick => "kick",
            Platform::Twitch => "twitch",
        }
    }

    /// 注册域名，子域名同样匹配
    pub fn domain(&self) -> &'static str {
        match self {
            Platform::Kick => "kick.com",
            Platform::Twitch => "twitch.tv",
        }
    }

    /// 不代表直播间的路径首段
    pub fn reserved_segments(&self) -> &'static [&'static str] {
        match self {
            Platform::Kick => &[
                "category",
                "categories",
                "browse",
                "following",
                "search",
                "dashboard",
                "settings",
                "subscriptions",
                "transactions",
            ],
            Platform::Twitch => &[
                "directory",
                "downloads",
                "jobs",
                "settings",
                "search",
                "subscriptions",
                "inventory",
                "wallet",
                "drops",
                "videos",
                "p",
            ],
        }
    }

    fn matches_host(&self, host: &str) -> bool {
        let domain = self.domain();
        host == domain
            || host
                .strip_suffix(domain)
                .map_or(false, |prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 平台与主播标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamContext {
    pub platform: Platform,
    pub stream_identity: String,
}

impl StreamContext {
    pub fn new(platform: Platform, stream_identity: impl Into<String>) -> Self {
        Self {
            platform,
            stream_identity: stream_identity.into(),
        }
    }
}

impl fmt::Display for StreamContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.platform, self.stream_identity)
    }
}

/// 归类一个 href，无法解析或不受支持时返回 `None`
pub fn classify_url(href: &str) -> Option<StreamContext> {
    match Url::parse(href) {
        Ok(url) => classify(&url),
        Err(e) => {
            tracing::debug!("无法解析URL {}: {}", href, e);
            None
        }
    }
}

pub fn classify(url: &Url) -> Option<StreamContext> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let platform = Platform::ALL
        .into_iter()
        .find(|platform| platform.matches_host(&host))?;

    let segment = url
        .path_segments()?
        .find(|segment| !segment.is_empty())?
        .to_lowercase();

    if platform.reserved_segments().contains(&segment.as_str()) {
        tracing::debug!("{} 的保留路径: /{}", platform, segment);
        return None;
    }

    Some(StreamContext::new(platform, segment))
}

/// 与 [`classify_url`] 相同，但把不支持的页面报告为错误
pub fn detect(href: &str) -> BaitblockResult<StreamContext> {
    classify_url(href).ok_or_else(|| BaitblockError::UnsupportedPage(href.to_string()))
}

/// 去重的 URL 变化检测
#[derive(Debug, Default)]
pub struct UrlChangeDetector {
    last_href: Option<String>,
}

impl UrlChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// href 与上一次不同（或是第一次）时返回新的归类结果
    pub fn observe(&mut self, href: &str) -> Option<Option<StreamContext>> {
        if self.last_href.as_deref() == Some(href) {
            return None;
        }
        self.last_href = Some(href.to_string());
        Some(classify_url(href))
    }
}

/// 可读取当前 href 的来源
pub trait UrlSource: 'static {
    fn href(&self) -> String;
}

/// 共享的地址栏
#[derive(Debug, Clone, Default)]
pub struct Location {
    href: Rc<RefCell<String>>,
}

impl Location {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: Rc::new(RefCell::new(href.into())),
        }
    }

    pub fn set(&self, href: impl Into<String>) {
        *self.href.borrow_mut() = href.into();
    }

    /// 以当前地址为基准解析相对地址
    pub fn navigate(&self, target: &str) -> BaitblockResult<()> {
        let base = Url::parse(&self.href())?;
        let next = base.join(target)?;
        self.set(next.as_str());
        Ok(())
    }
}

impl UrlSource for Location {
    fn href(&self) -> String {
        self.href.borrow().clone()
    }
}

type Listener = (Rc<Cell<bool>>, Rc<dyn Fn()>);

/// 单页应用的历史记录接口
///
/// 四种操作都先修改地址再同步派发同一个内部变化信号。
#[derive(Clone)]
pub struct History {
    location: Location,
    listeners: Rc<RefCell<Vec<Listener>>>,
}

impl History {
    pub fn new(initial_href: impl Into<String>) -> Self {
        Self {
            location: Location::new(initial_href),
            listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn location(&self) -> Location {
        self.location.clone()
    }

    pub fn push_state(&self, url: &str) -> BaitblockResult<()> {
        self.location.navigate(url)?;
        self.emit();
        Ok(())
    }

    pub fn replace_state(&self, url: &str) -> BaitblockResult<()> {
        self.location.navigate(url)?;
        self.emit();
        Ok(())
    }

    /// 前进/后退：浏览器已切换到 `url`
    pub fn pop_state(&self, url: &str) -> BaitblockResult<()> {
        self.location.navigate(url)?;
        self.emit();
        Ok(())
    }

    pub fn hash_change(&self, fragment: &str) -> BaitblockResult<()> {
        let mut url = Url::parse(&self.location.href())?;
        url.set_fragment(Some(fragment.trim_start_matches('#')));
        self.location.set(url.as_str());
        self.emit();
        Ok(())
    }

    fn listen(&self, listener: Rc<dyn Fn()>) -> Rc<Cell<bool>> {
        let active = Rc::new(Cell::new(true));
        self.listeners.borrow_mut().push((active.clone(), listener));
        active
    }

    fn emit(&self) {
        self.listeners.borrow_mut().retain(|(active, _)| active.get());
        let snapshot: Vec<Listener> = self.listeners.borrow().clone();
        for (active, listener) in snapshot {
            if active.get() {
                listener();
            }
        }
    }
}

/// 路由订阅句柄，丢弃即取消
pub struct RouteSubscription {
    active: Rc<Cell<bool>>,
    task: Option<JoinHandle<()>>,
}

impl RouteSubscription {
    pub fn unsubscribe(self) {}

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Drop for RouteSubscription {
    fn drop(&mut self) {
        self.active.set(false);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub type RouteCallback = Rc<dyn Fn(Option<StreamContext>)>;

pub struct PageRouter;

impl PageRouter {
    /// 轮询策略，必须在 `LocalSet` 中调用
    pub fn watch_polling<S: UrlSource>(
        source: S,
        interval: Duration,
        on_change: RouteCallback,
    ) -> RouteSubscription {
        let mut detector = UrlChangeDetector::new();
        if let Some(context) = detector.observe(&source.href()) {
            on_change(context);
        }

        let active = Rc::new(Cell::new(true));
        let alive = active.clone();
        let task = tokio::task::spawn_local(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !alive.get() {
                    break;
                }
                if let Some(context) = detector.observe(&source.href()) {
                    tracing::debug!("URL变化: {:?}", context);
                    on_change(context);
                }
            }
        });

        RouteSubscription {
            active,
            task: Some(task),
        }
    }

    /// 历史记录拦截策略
    pub fn watch_history(history: &History, on_change: RouteCallback) -> RouteSubscription {
        let detector = Rc::new(RefCell::new(UrlChangeDetector::new()));
        let location = history.location();

        let check: Rc<dyn Fn()> = Rc::new(move || {
            let changed = detector.borrow_mut().observe(&location.href());
            if let Some(context) = changed {
                on_change(context);
            }
        });

        let active = history.listen(check.clone());
        check();

        RouteSubscription { active, task: None }
    }
}
