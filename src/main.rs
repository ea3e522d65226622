//! 命令行入口：在无头文档上运行一次完整的页内翻译会话并输出结果 HTML

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing::Level;

use inpage_translate::env::{self as envvars, EnvConfig};
use inpage_translate::network::{MemoryNetworkClient, NetworkClient};
use inpage_translate::parsers::{serialize_document, DocumentAccessor, HtmlDocument};
use inpage_translate::translation::core::LanguagePair;
use inpage_translate::translation::{
    EngineConfig, RecordingObserver, TranslateController, TranslationEngine, TranslationError,
    TranslationResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// 调用配置中的翻译接口
    Http,
    /// 本地伪翻译，用于检查页面结构
    Pseudo,
}

/// 在页面上就地翻译文本
#[derive(Parser, Debug)]
#[command(name = "inpage-translate")]
#[command(about = "Translate an HTML page in place, progressively and reversibly")]
#[command(version)]
struct Cli {
    /// 输入 HTML 文件
    input: PathBuf,

    /// 目标语言（可由 INPAGE_TARGET_LANG 提供）
    #[arg(short, long)]
    target: Option<String>,

    /// 源语言（默认取 INPAGE_SOURCE_LANG，否则为 en）
    #[arg(short, long)]
    source: Option<String>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 翻译后端
    #[arg(short, long, value_enum, default_value_t = Backend::Pseudo)]
    backend: Backend,

    /// 输入文档编码
    #[arg(short, long, default_value = "utf-8")]
    encoding: String,

    /// 首轮之后向下滚动的最大次数（每次一个视口高度）
    #[arg(long, default_value_t = 100)]
    scroll_steps: usize,

    /// 翻译完成后撤销，输出应与输入一致
    #[arg(long)]
    revert: bool,

    /// 输出文件，默认写到标准输出
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 日志级别
    #[arg(long)]
    log_level: Option<String>,

    /// 列出支持的环境变量后退出
    #[arg(long)]
    env_docs: bool,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if cli.env_docs {
        print!("{}", envvars::generate_env_docs());
        return;
    }

    let env = match EnvConfig::from_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(2);
        }
    };
    init_logging(cli.log_level.as_deref().unwrap_or(&env.log_level), env.no_color);

    match run(&cli, &env) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_logging(level: &str, no_color: bool) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(!no_color)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli, env: &EnvConfig) -> TranslationResult<bool> {
    let target = cli
        .target
        .clone()
        .or_else(|| env.target_lang.clone())
        .ok_or_else(|| {
            TranslationError::InvalidInput(
                "未指定目标语言 (--target 或 INPAGE_TARGET_LANG)".to_string(),
            )
        })?;
    let source = cli.source.clone().unwrap_or_else(|| env.source_lang.clone());

    let data = fs::read(&cli.input).map_err(|e| {
        TranslationError::InvalidInput(format!("无法读取 {}: {}", cli.input.display(), e))
    })?;

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    config.debug |= env.debug;

    let document = HtmlDocument::parse(&data, &cli.encoding);
    match cli.backend {
        Backend::Pseudo => {
            let pair = LanguagePair::new(&source, &target)?;
            let network = MemoryNetworkClient::automatic(
                &[pair.source.as_str(), pair.target.as_str()],
                |t| format!("[{}]", t),
            );
            session(cli, document, network, config, &source, &target)
        }
        #[cfg(feature = "http")]
        Backend::Http => {
            let network =
                inpage_translate::network::HttpNetworkClient::new(config.backend.clone())?;
            session(cli, document, network, config, &source, &target)
        }
        #[cfg(not(feature = "http"))]
        Backend::Http => Err(TranslationError::ConfigError(
            "HTTP 后端未启用，请使用 --features http 编译".to_string(),
        )),
    }
}

fn session<N: NetworkClient>(
    cli: &Cli,
    document: HtmlDocument,
    network: N,
    config: EngineConfig,
    source: &str,
    target: &str,
) -> TranslationResult<bool> {
    let engine = TranslationEngine::new(document, network, RecordingObserver::new(), config);
    let mut host = TranslateController::new(engine);

    if !host.translate(source, target) {
        return Err(TranslationError::StateError(format!(
            "无法开始翻译: {}",
            host.error_code()
        )));
    }
    host.pump();

    for _ in 0..cli.scroll_steps {
        let document = host.engine().document();
        if document.viewport_bottom() >= document.document_height() {
            break;
        }
        let step = document.viewport().height;
        host.engine_mut().document_mut().scroll_by(step);
        host.on_scroll();
        host.pump();
    }

    tracing::info!(
        "完成: finished={} error={} source={:?} 耗时 {:?}",
        host.finished(),
        host.error_code(),
        host.source_lang(),
        host.translation_time()
    );

    if cli.revert {
        let report = host.revert();
        tracing::info!("已撤销 {} 处改动", report.restored());
    }

    let html = serialize_document(host.engine().document().dom(), &cli.encoding)?;
    let written = match &cli.output {
        Some(path) => fs::write(path, &html),
        None => io::stdout().write_all(&html),
    };
    written.map_err(|e| TranslationError::SerializationError(format!("写出结果失败: {}", e)))?;

    Ok(!host.error())
}
