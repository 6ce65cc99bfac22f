// 集成测试公共模块
//
// 提供页面构造、分类器替身和测试服务器

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use baitblock::classify::{Classifier, Verdict};
use baitblock::error::{BaitblockError, BaitblockResult};
use baitblock::router::{Platform, StreamContext};

/// 页面构造工具
pub struct PageBuilder;

impl PageBuilder {
    /// Kick 消息主体：时间、用户、分隔符、内容
    pub fn kick_body(time: &str, user: &str, content: &str) -> String {
        format!(
            r#"<div class="chat-entry"><div class="chat-line"><span class="time">{}</span><div class="identity"><button class="username">{}</button></div><span class="sep">: </span><span class="content">{}</span></div></div>"#,
            time, user, content
        )
    }

    pub fn kick_message(index: &str, user: &str, text: &str) -> String {
        format!(
            r#"<div data-index="{}">{}</div>"#,
            index,
            Self::kick_body("08:09 PM", user, text)
        )
    }

    pub fn kick_reply(index: &str, user: &str, text: &str) -> String {
        format!(
            r#"<div data-index="{}"><div class="reply-preview">replying to someone</div><div class="reply-body">{}</div></div>"#,
            index,
            Self::kick_body("08:10 PM", user, text)
        )
    }

    pub fn kick_emote(index: &str, user: &str, emote_id: &str) -> String {
        format!(
            r#"<div data-index="{}">{}</div>"#,
            index,
            Self::kick_body(
                "08:11 PM",
                user,
                &format!(r#"<span data-emote-id="{}"><img alt="emote"></span>"#, emote_id)
            )
        )
    }

    /// 缺少内容部分的消息元素
    pub fn kick_malformed(index: &str) -> String {
        format!(
            r#"<div data-index="{}"><div><div><span>08:12 PM</span><div><button>ghost</button></div><span>: </span></div></div></div>"#,
            index
        )
    }

    /// 带聊天容器的 Kick 页面
    pub fn kick_page(messages: &[String]) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>alice - Kick</title>
    <meta charset="UTF-8">
</head>
<body>
    <main>
        <div id="chatroom-messages"><div class="message-list">{}</div></div>
    </main>
</body>
</html>"#,
            messages.concat()
        )
    }

    /// 聊天容器尚未渲染的页面
    pub fn kick_page_without_chat() -> String {
        r#"<!DOCTYPE html>
<html><head><title>loading</title></head><body><main><div id="player"></div></main></body></html>"#
            .to_string()
    }

    pub fn twitch_message(id: &str, user: &str, text: &str) -> String {
        format!(
            r#"<div data-message-id="{}"><div class="chat-line"><span role="button" class="chat-author">{}</span><span>: </span><span class="text-fragment">{}</span></div></div>"#,
            id, user, text
        )
    }

    pub fn twitch_page(messages: &[String]) -> String {
        format!(
            r#"<!DOCTYPE html>
<html><head><title>bob - Twitch</title></head>
<body><section><div data-test-selector="chat-scrollable-area__message-container">{}</div></section></body></html>"#,
            messages.concat()
        )
    }
}

pub fn kick_context(identity: &str) -> StreamContext {
    StreamContext::new(Platform::Kick, identity)
}

/// 按文本关键字返回结果的分类器，记录收到的每个批次
#[derive(Default)]
pub struct KeywordClassifier {
    keyword: String,
    batches: Mutex<Vec<Vec<String>>>,
}

impl KeywordClassifier {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn label(&self, texts: &[String]) -> BaitblockResult<Vec<Verdict>> {
        self.batches.lock().unwrap().push(texts.to_vec());
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains(&self.keyword) {
                    Verdict::new("phishing")
                } else {
                    Verdict::new("safe")
                }
            })
            .collect())
    }
}

/// 在放行前一直挂起的分类器，用于观察调用期间的缓冲区
pub struct GatedClassifier {
    pub entered: Notify,
    pub release: Notify,
    keyword: Option<String>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl GatedClassifier {
    pub fn new() -> Self {
        Self {
            entered: Notify::new(),
            release: Notify::new(),
            keyword: None,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// 放行后把包含 `keyword` 的文本标为钓鱼
    pub fn flagging(keyword: &str) -> Self {
        Self {
            keyword: Some(keyword.to_string()),
            ..Self::new()
        }
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for GatedClassifier {
    async fn label(&self, texts: &[String]) -> BaitblockResult<Vec<Verdict>> {
        self.batches.lock().unwrap().push(texts.to_vec());
        self.entered.notify_one();
        self.release.notified().await;
        Ok(texts
            .iter()
            .map(|text| match &self.keyword {
                Some(keyword) if text.contains(keyword.as_str()) => Verdict::new("phishing"),
                _ => Verdict::new("safe"),
            })
            .collect())
    }
}

/// 始终不可达的分类器
pub struct UnreachableClassifier;

#[async_trait]
impl Classifier for UnreachableClassifier {
    async fn label(&self, _texts: &[String]) -> BaitblockResult<Vec<Verdict>> {
        Err(BaitblockError::NetworkError("connection refused".to_string()))
    }
}

/// 测试服务器工具
pub struct StubServer;

impl StubServer {
    /// 在随机端口上启动 axum 路由，返回基础地址
    pub async fn spawn(router: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

/// 共享的请求记录
pub type Recorded = Arc<Mutex<Vec<serde_json::Value>>>;

pub fn recorded() -> Recorded {
    Arc::new(Mutex::new(Vec::new()))
}
