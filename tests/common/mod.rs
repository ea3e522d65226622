// 集成测试公共模块
//
// 提供测试引擎、脚本后端和页面生成等共享工具

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use inpage_translate::network::{MemoryBackend, MemoryNetworkClient};
use inpage_translate::parsers::html::dom::{html_to_dom, text_content};
use inpage_translate::parsers::html::{DocumentAccessor, HtmlDocument, Viewport};
use inpage_translate::translation::core::{MutationLog, Progress, RecordingObserver};
use inpage_translate::translation::{EngineConfig, TranslationEngine};

pub type TestEngine = TranslationEngine<HtmlDocument, MemoryNetworkClient, RecordingObserver>;

/// 测试环境：引擎 + 后端控制句柄 + 变化日志 + 进度记录
pub struct Harness {
    pub engine: TestEngine,
    pub backend: MemoryBackend,
    pub log: MutationLog,
    pub progress: Rc<RefCell<Vec<Progress>>>,
}

impl Harness {
    /// 脚本后端、默认配置与默认视口
    pub fn new(html: &str, languages: &[&str]) -> Self {
        Self::with_config(html, languages, EngineConfig::default(), Viewport::default())
    }

    pub fn with_config(
        html: &str,
        languages: &[&str],
        config: EngineConfig,
        viewport: Viewport,
    ) -> Self {
        let document = HtmlDocument::with_viewport(html_to_dom(html.as_bytes(), "utf-8"), viewport);
        let network = MemoryNetworkClient::scripted(languages);
        Self::assemble(document, network, config)
    }

    /// 自动后端：每个请求立即用 `translator` 完成
    pub fn automatic<F>(html: &str, languages: &[&str], translator: F) -> Self
    where
        F: Fn(&str) -> String + 'static,
    {
        let document = HtmlDocument::parse(html.as_bytes(), "utf-8");
        let network = MemoryNetworkClient::automatic(languages, translator);
        Self::assemble(document, network, EngineConfig::default())
    }

    fn assemble(document: HtmlDocument, network: MemoryNetworkClient, config: EngineConfig) -> Self {
        let backend = network.handle();
        let observer = RecordingObserver::new();
        let log = observer.log();
        let mut engine = TranslationEngine::new(document, network, observer, config);

        let progress = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&progress);
        engine.set_progress_callback(move |p| sink.borrow_mut().push(p));

        Self {
            engine,
            backend,
            log,
            progress,
        }
    }

    pub fn body(&self) -> Handle {
        self.engine.document().body().expect("document has a body")
    }

    pub fn body_text(&self) -> String {
        text_content(&self.body())
    }

    pub fn last_progress(&self) -> Option<Progress> {
        self.progress.borrow().last().copied()
    }

    /// 用 `translate` 回应所有在途请求并处理结果，直到没有在途请求
    pub fn respond_all<F: Fn(&str) -> String>(&mut self, translate: F) {
        loop {
            let ids = self.engine.session().batcher().in_flight_ids();
            if ids.is_empty() {
                break;
            }
            for id in ids {
                self.backend.respond_with(id, &translate);
            }
            self.engine.pump();
        }
    }

    /// 开始翻译并处理语言列表结果
    pub fn start(&mut self, source: &str, target: &str) {
        self.engine
            .translate(source, target)
            .expect("translate accepted");
        self.engine.pump();
    }
}

pub fn upper(text: &str) -> String {
    text.to_uppercase()
}

/// 生成 `count` 个段落的页面
pub fn paragraphs(count: usize) -> String {
    let body: String = (0..count)
        .map(|i| format!("<p>paragraph {}</p>", i))
        .collect();
    format!("<html><body>{}</body></html>", body)
}

/// 与原始页面相同结构下的文本内容
pub fn original_text(html: &str) -> String {
    let doc = HtmlDocument::parse(html.as_bytes(), "utf-8");
    text_content(&doc.body().expect("document has a body"))
}
