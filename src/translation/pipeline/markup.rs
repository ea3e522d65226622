//! 分段标记通道
//!
//! 合并组的多段文本以 `<a i=N>文本</a>` 串接后作为一条查询发送，
//! 后端会原样保留这些标记，从而在译文中保留分段边界。
//! 这只是引擎与后端之间的私有约定，与真实的超链接无关，这里完全按字符串处理。

use std::sync::OnceLock;

use regex::Regex;

/// 解析出的一个分段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 分段在合并组中的位置；无法解析时为 `None`
    pub index: Option<usize>,
    pub text: String,
}

impl Segment {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            text: text.into(),
        }
    }
}

const SEGMENT_OPEN: &str = "<a i=";
const SEGMENT_CLOSE: &str = "</a>";

fn segmented_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^<a\si=\d+>.*</a>\s*$").expect("valid regex"))
}

fn piece_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^(\d+)>(.*)</a>\s*$").expect("valid regex"))
}

/// 把合并组的各段文本编码为一条查询串；只有一段时原样返回
pub fn encode_segments<S: AsRef<str>>(texts: &[S]) -> String {
    match texts.len() {
        0 => String::new(),
        1 => texts[0].as_ref().to_string(),
        _ => texts
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{}{}>{}{}", SEGMENT_OPEN, i, text.as_ref(), SEGMENT_CLOSE))
            .collect(),
    }
}

/// 按给定的位置编码分段（用于回传翻译结果）
pub fn encode_indexed(segments: &[Segment]) -> String {
    segments
        .iter()
        .filter_map(|segment| {
            segment
                .index
                .map(|i| format!("{}{}>{}{}", SEGMENT_OPEN, i, segment.text, SEGMENT_CLOSE))
        })
        .collect()
}

/// 文本是否为分段标记格式
pub fn is_segmented(text: &str) -> bool {
    segmented_regex().is_match(text)
}

/// 拆分分段标记。第一个 `<a i=` 之前的前缀被丢弃，
/// 格式不合法的片段以 `index: None` 返回。
pub fn decode_segments(text: &str) -> Vec<Segment> {
    text.split(SEGMENT_OPEN)
        .skip(1)
        .map(|piece| {
            let parsed = piece_regex().captures(piece).and_then(|caps| {
                let index = caps.get(1)?.as_str().parse::<usize>().ok()?;
                let body = caps.get(2)?.as_str();
                // 与后端约定：分段内容到第一个结束标记为止
                let body = body.split(SEGMENT_CLOSE).next().unwrap_or_default();
                Some(Segment::new(index, body))
            });
            parsed.unwrap_or(Segment {
                index: None,
                text: String::new(),
            })
        })
        .collect()
}

/// 解码 HTML 字符引用：`&amp; &lt; &gt; &quot; &apos; &nbsp;` 以及数字引用。
/// 无法识别的引用保持原样。
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"&([^;\s<&]+);?").expect("valid regex"));

    re.replace_all(text, |caps: &regex::Captures| {
        let whole = &caps[0];
        let name = &caps[1];
        let named = match whole {
            "&amp;" => Some('&'),
            "&lt;" => Some('<'),
            "&gt;" => Some('>'),
            "&quot;" => Some('"'),
            "&apos;" => Some('\''),
            "&nbsp;" => Some('\u{a0}'),
            _ => None,
        };
        named
            .or_else(|| decode_numeric(name))
            .map(String::from)
            .unwrap_or_else(|| whole.to_string())
    })
    .into_owned()
}

fn decode_numeric(name: &str) -> Option<char> {
    let digits = name.strip_prefix('#')?;
    let code = match digits.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code)
}
