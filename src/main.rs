//! baitblock 命令行入口
//!
//! 对保存下来的直播页面快照执行提取，并可选地调用分类服务标记钓鱼消息。
//! `watch` 按配置装配完整的运行时（路由轮询、抓取上下文、协调上下文），
//! 在快照上运行一段时间。

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::task::LocalSet;

use baitblock::config::{self, ConfigManager};
use baitblock::dom::PageDocument;
use baitblock::env::{core::LogLevel, EnvVar};
use baitblock::error::{BaitblockError, BaitblockResult};
use baitblock::extract::{ChatExtractor, ChatMessage, RetryPolicy};
use baitblock::channel::message_channel;
use baitblock::router::{self, Location, PageRouter};
use baitblock::runtime;
use baitblock::{
    ClassificationBatcher, HttpClassifier, LiveDocument, PreferenceGate, ResultAnnotator,
    SignalFilter,
};

#[derive(Parser)]
#[command(name = "baitblock", version)]
#[command(about = "Extract live-chat messages from stream pages and flag phishing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract chat messages from a saved page
    Scan {
        /// HTML snapshot of the stream page
        file: PathBuf,

        /// URL the snapshot was taken from
        #[arg(long)]
        url: String,

        /// Base URL of the classification service
        #[arg(long)]
        classifier: Option<String>,

        /// Write the annotated page here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Character encoding of the snapshot
        #[arg(long, default_value = "utf-8")]
        encoding: String,

        /// Send every non-empty message to the classifier
        #[arg(long)]
        permissive: bool,
    },

    /// Run the live pipeline on a saved page for a fixed time
    Watch {
        /// HTML snapshot of the stream page
        file: PathBuf,

        /// URL the snapshot was taken from
        #[arg(long)]
        url: String,

        /// Base URL of the classification service, overrides the config
        #[arg(long)]
        classifier: Option<String>,

        /// Write the annotated page here when the run ends
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Character encoding of the snapshot
        #[arg(long, default_value = "utf-8")]
        encoding: String,

        /// How long to keep the pipeline running
        #[arg(long, default_value_t = 5000)]
        duration_ms: u64,
    },

    /// Print the stream context a URL maps to
    ClassifyUrl { url: String },

    /// Write an example configuration file
    InitConfig {
        #[arg(default_value = "baitblock.toml")]
        path: PathBuf,
    },
}

struct ScanArgs {
    file: PathBuf,
    url: String,
    classifier: Option<String>,
    output: Option<PathBuf>,
    encoding: String,
    permissive: bool,
}

fn init_logging() {
    let level = LogLevel::get()
        .ok()
        .and_then(|level| level.parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct WatchArgs {
    file: PathBuf,
    url: String,
    classifier: Option<String>,
    output: Option<PathBuf>,
    encoding: String,
    duration: Duration,
}

fn read_document(path: &Path, encoding: &str) -> BaitblockResult<LiveDocument> {
    let data = fs::read(path).map_err(|e| {
        BaitblockError::InternalError(format!("无法读取 {}: {}", path.display(), e))
    })?;
    LiveDocument::from_bytes(&data, encoding)
}

fn write_document(document: &LiveDocument, path: &Path, encoding: &str) -> BaitblockResult<()> {
    fs::write(path, document.serialize(encoding)?).map_err(|e| {
        BaitblockError::InternalError(format!("无法写入 {}: {}", path.display(), e))
    })?;
    tracing::info!("已写入 {}", path.display());
    Ok(())
}

async fn scan(args: ScanArgs) -> BaitblockResult<()> {
    let config = config::load_config();
    let context = router::detect(&args.url)?;
    let document = read_document(&args.file, &args.encoding)?;

    // 快照不会再变化，容器只查找一次
    let policy = RetryPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 1,
    };
    let extractor =
        ChatExtractor::new(document.clone(), PreferenceGate::mirror(true)).with_retry_policy(policy);

    let collected: Rc<RefCell<Vec<ChatMessage>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = collected.clone();
    let session = extractor
        .start(
            context,
            Rc::new(move |message: ChatMessage| {
                match serde_json::to_string(&message) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!("无法序列化消息 {}: {}", message.id, e),
                }
                sink.borrow_mut().push(message);
            }),
        )
        .await?;

    tracing::info!("提取到 {} 条消息", session.stats().emitted);

    if let Some(base_url) = args.classifier {
        let classifier = HttpClassifier::with_timeout(&base_url, config.request_timeout())?;
        let mut batcher = ClassificationBatcher::from_config(&config, Arc::new(classifier));
        if args.permissive {
            batcher = batcher.with_filter(SignalFilter::permissive());
        }

        for message in collected.borrow_mut().drain(..) {
            batcher.push(message);
        }

        let flagged = match batcher.flush() {
            Some(job) => job.try_run().await?,
            None => Vec::new(),
        };

        let report = ResultAnnotator::new(session.layout()).apply(&document.root(), &flagged);
        tracing::info!(
            "分类完成：标记 {} 条，缺失 {} 条",
            report.marked.len(),
            report.missing.len()
        );
    }

    if let Some(output) = args.output {
        write_document(&document, &output, &args.encoding)?;
    }

    Ok(())
}

async fn watch(args: WatchArgs) -> BaitblockResult<()> {
    let mut config = config::load_config();
    if let Some(base_url) = args.classifier {
        config.classifier_url = base_url;
        config.validate()?;
    }
    router::detect(&args.url)?;
    let document = read_document(&args.file, &args.encoding)?;

    let gate = runtime::open_preferences(&config);
    let (scraper_port, coordinator_port) = message_channel();
    let coordinator = runtime::coordinator_from_config(&config, coordinator_port, gate.clone())?;
    let coordinator_task = tokio::spawn(coordinator.run());

    let mirror = PreferenceGate::mirror(gate.is_enabled());
    let (scraper, on_route) =
        runtime::scraper_from_config(&config, document.clone(), mirror, scraper_port);
    let scraper_task = tokio::task::spawn_local(scraper.run());

    let route = PageRouter::watch_polling(
        Location::new(args.url),
        config.url_poll_interval(),
        on_route,
    );
    tracing::info!("运行 {:?}", args.duration);
    tokio::time::sleep(args.duration).await;

    drop(route);
    scraper_task.abort();
    coordinator_task.abort();

    if let Some(output) = args.output {
        write_document(&document, &output, &args.encoding)?;
    }
    Ok(())
}

fn local_runtime() -> BaitblockResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| BaitblockError::InternalError(format!("无法创建运行时: {}", e)))
}

fn run(command: Commands) -> BaitblockResult<ExitCode> {
    match command {
        Commands::Scan {
            file,
            url,
            classifier,
            output,
            encoding,
            permissive,
        } => {
            let local = LocalSet::new();
            local.block_on(
                &local_runtime()?,
                scan(ScanArgs {
                    file,
                    url,
                    classifier,
                    output,
                    encoding,
                    permissive,
                }),
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Watch {
            file,
            url,
            classifier,
            output,
            encoding,
            duration_ms,
        } => {
            let local = LocalSet::new();
            local.block_on(
                &local_runtime()?,
                watch(WatchArgs {
                    file,
                    url,
                    classifier,
                    output,
                    encoding,
                    duration: Duration::from_millis(duration_ms),
                }),
            )?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ClassifyUrl { url } => match router::classify_url(&url) {
            Some(context) => {
                println!("{}", serde_json::to_string(&context)?);
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("Not a stream page: {}", url);
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::InitConfig { path } => {
            ConfigManager::generate_example_config(&path)?;
            println!("Wrote {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
