//! 翻译引擎配置
//!
//! 配置按层加载：默认值 → TOML 配置文件 → 环境变量（前缀 `INPAGE`，
//! 层级分隔符 `__`，例如 `INPAGE__BACKEND__ACCESS_TOKEN`）。

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译配置常量
pub mod constants {
    /// 单次请求的查询串配额
    pub const DEFAULT_REQUEST_QUOTA: usize = 50;
    /// 每个批次允许的重试次数
    pub const DEFAULT_MAX_RETRIES: u32 = 1;

    pub const DEFAULT_VIEWPORT_WIDTH: f64 = 1024.0;
    pub const DEFAULT_VIEWPORT_HEIGHT: f64 = 768.0;
    pub const DEFAULT_LINE_HEIGHT: f64 = 20.0;

    pub const DEFAULT_API_URL: &str = "https://translation.googleapis.com/language/translate/v2";
    pub const DEFAULT_LANGUAGES_URL: &str =
        "https://translation.googleapis.com/language/translate/v2/languages";

    pub const ENV_PREFIX: &str = "INPAGE";

    pub const CONFIG_PATHS: &[&str] = &[
        "inpage-translate.toml",
        ".inpage-translate.toml",
        "config/inpage-translate.toml",
    ];

    /// 父元素为这些标签时，文本节点不参与翻译
    pub const EXCLUDED_TAGS: &[&str] = &[
        "applet", "area", "base", "br", "col", "command", "embed", "frame", "hr", "img", "input",
        "iframe", "isindex", "keygen", "link", "noframes", "noscript", "meta", "object", "param",
        "script", "source", "style", "textarea", "track", "wbr",
    ];

    /// 可合并的内联标签
    pub const MERGEABLE_TAGS: &[&str] = &[
        "a", "abbr", "acronym", "b", "basefont", "bdo", "big", "cite", "dfn", "em", "font", "i",
        "input", "nobr", "label", "q", "s", "small", "span", "strike", "strong", "sub", "sup",
        "tt", "u", "var",
    ];

    /// 视觉上是内联，但不放入合并组
    pub const NOT_MERGEABLE_TAGS: &[&str] = &["sub", "sup"];

    /// 没有布局盒时依然视为可见的标签
    pub const ALWAYS_VISIBLE_TAGS: &[&str] = &["option"];

    /// 中性包装元素
    pub const WRAPPER_TAG: &str = "font";

    /// 流式布局中的块级元素
    pub const BLOCK_ELEMENTS: &[&str] = &[
        "address", "article", "aside", "blockquote", "body", "dd", "details", "dialog", "div",
        "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4",
        "h5", "h6", "header", "hr", "html", "li", "main", "nav", "ol", "p", "pre", "section",
        "summary", "table", "tbody", "thead", "tfoot", "tr", "td", "th", "ul", "option", "select",
    ];

    /// 不产生布局盒的元素
    pub const NON_RENDERED_ELEMENTS: &[&str] = &[
        "head", "script", "style", "title", "meta", "link", "template", "noscript",
    ];
}

/// 翻译后端配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// 翻译接口地址
    pub api_url: String,
    /// 语言列表接口地址
    pub languages_url: String,
    /// 宿主环境提供的访问令牌
    pub access_token: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            languages_url: constants::DEFAULT_LANGUAGES_URL.to_string(),
            access_token: String::new(),
        }
    }
}

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 单次请求允许的查询串数量
    pub request_quota: usize,
    /// 预读距离（像素），为空时使用视口高度
    pub look_ahead_px: Option<f64>,
    /// 每个批次的重试次数
    pub max_retries: u32,
    /// 输出逐条查询与译文的调试日志
    pub debug: bool,
    pub backend: BackendConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_quota: constants::DEFAULT_REQUEST_QUOTA,
            look_ahead_px: None,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            debug: false,
            backend: BackendConfig::default(),
        }
    }
}

impl EngineConfig {
    /// 从 TOML 文本解析配置
    pub fn from_toml_str(source: &str) -> TranslationResult<Self> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// 按层加载配置：指定文件（或默认搜索路径）+ 环境变量
    pub fn load(path: Option<&Path>) -> TranslationResult<Self> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(TranslationError::ConfigError(format!(
                        "配置文件不存在: {}",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(found) = Self::find_config_file() {
                    tracing::debug!("使用配置文件: {}", found.display());
                    builder = builder.add_source(File::from(found).format(FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(constants::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 在默认搜索路径中查找第一个存在的配置文件
    pub fn find_config_file() -> Option<PathBuf> {
        constants::CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
    }

    /// 校验配置
    pub fn validate(&self) -> TranslationResult<()> {
        if self.request_quota == 0 {
            return Err(TranslationError::ConfigError(
                "request_quota 必须大于 0".to_string(),
            ));
        }
        if let Some(look_ahead) = self.look_ahead_px {
            if !look_ahead.is_finite() || look_ahead <= 0.0 {
                return Err(TranslationError::ConfigError(format!(
                    "look_ahead_px 必须为正数: {}",
                    look_ahead
                )));
            }
        }
        if self.backend.api_url.trim().is_empty() {
            return Err(TranslationError::ConfigError("backend.api_url 不能为空".to_string()));
        }
        Ok(())
    }
}
