//! 文本过滤器模块
//!
//! 判断文本节点及其父元素是否值得送去翻译

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::translation::config::constants;

/// 把 `&nbsp;` 与连续的空格/制表符折叠为单个空格
pub fn normalize_spaces(text: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    let re = SPACES.get_or_init(|| Regex::new(r"\x{a0}|[ \t]+").expect("valid regex"));
    re.replace_all(text, " ").into_owned()
}

/// 去掉首尾空白（含 `&nbsp;`）
pub fn trim_spaces(text: &str) -> &str {
    text.trim_matches(|c: char| c.is_whitespace() || c == '\u{a0}')
}

/// 文本是否是纯数字（按十进制数解析）
pub fn is_numeric(text: &str) -> bool {
    let trimmed = text.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().map(|n| n.is_finite()).unwrap_or(false)
}

/// 文本过滤器
#[derive(Debug, Clone)]
pub struct TextFilter {
    excluded_tags: HashSet<&'static str>,
    always_visible_tags: HashSet<&'static str>,
}

impl Default for TextFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFilter {
    /// 创建新的文本过滤器
    pub fn new() -> Self {
        Self {
            excluded_tags: constants::EXCLUDED_TAGS.iter().copied().collect(),
            always_visible_tags: constants::ALWAYS_VISIBLE_TAGS.iter().copied().collect(),
        }
    }

    /// 文本内容是否需要翻译：非空且不是纯数字
    pub fn should_translate(&self, text: &str) -> bool {
        let normalized = normalize_spaces(text);
        let content = trim_spaces(&normalized);
        !content.is_empty() && !is_numeric(content)
    }

    /// 父元素标签是否允许承载可翻译文本
    pub fn is_valid_parent_tag(&self, tag: &str) -> bool {
        !self.excluded_tags.contains(tag.to_ascii_lowercase().as_str())
    }

    /// 该标签即使没有布局盒也视为可见
    pub fn is_always_visible(&self, tag: &str) -> bool {
        self.always_visible_tags
            .contains(tag.to_ascii_lowercase().as_str())
    }
}
