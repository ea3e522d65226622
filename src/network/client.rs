//! 翻译后端通信接口
//!
//! 引擎只通过 [`NetworkClient`] 与后端交互：发出请求后立即返回，
//! 完成结果稍后由 [`NetworkClient::poll_completion`] 取回。完成顺序不受约束，
//! 引擎按 [`RequestId`] 对应到自己记录的批次。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::translation::error::{TranslationError, TranslationResult};

/// 请求编号，由引擎分配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 一次翻译请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslateRequest {
    /// 查询串，顺序与响应中的译文一一对应
    pub queries: Vec<String>,
    /// 源语言；与目标语言相同时省略
    pub source: Option<String>,
    pub target: String,
}

impl TranslateRequest {
    /// 构建请求，源语言与目标语言相同时不发送源语言
    pub fn new(queries: Vec<String>, source: &str, target: &str) -> Self {
        Self {
            queries,
            source: (source != target).then(|| source.to_string()),
            target: target.to_string(),
        }
    }
}

/// 后端完成的一个请求
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// 支持的语言列表
    Languages(TranslationResult<Vec<String>>),
    /// 某个翻译请求的结果
    Translate {
        id: RequestId,
        result: TranslationResult<Vec<String>>,
    },
}

/// 翻译后端接口
pub trait NetworkClient {
    /// 请求后端支持的语言列表
    fn request_languages(&mut self);

    /// 发送翻译请求
    fn send_translate(&mut self, id: RequestId, request: &TranslateRequest);

    /// 取出一个已完成的请求
    fn poll_completion(&mut self) -> Option<Completion>;
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslationsData,
}

#[derive(Debug, Deserialize)]
struct TranslationsData {
    #[serde(default)]
    translations: Vec<TranslationEntry>,
}

#[derive(Debug, Deserialize)]
struct TranslationEntry {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Debug, Deserialize)]
struct LanguagesResponse {
    data: LanguagesData,
}

#[derive(Debug, Deserialize)]
struct LanguagesData {
    #[serde(default)]
    languages: Vec<LanguageEntry>,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    language: String,
}

/// 解析翻译响应体 `{"data":{"translations":[{"translatedText":..}]}}`
pub fn parse_translate_response(body: &str) -> TranslationResult<Vec<String>> {
    let response: TranslateResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .translations
        .into_iter()
        .map(|entry| entry.translated_text)
        .collect())
}

/// 解析语言列表响应体 `{"data":{"languages":[{"language":..}]}}`
pub fn parse_languages_response(body: &str) -> TranslationResult<Vec<String>> {
    let response: LanguagesResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .languages
        .into_iter()
        .map(|entry| entry.language)
        .collect())
}

/// 根据状态码与响应体生成结果
pub fn response_result<F>(status: u16, body: String, parse: F) -> TranslationResult<Vec<String>>
where
    F: FnOnce(&str) -> TranslationResult<Vec<String>>,
{
    if (200..300).contains(&status) {
        parse(&body)
    } else {
        Err(TranslationError::TransportError { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_omitted_when_equal_to_target() {
        let request = TranslateRequest::new(vec!["x".into()], "en", "en");
        assert_eq!(request.source, None);
        let request = TranslateRequest::new(vec!["x".into()], "en", "ko");
        assert_eq!(request.source.as_deref(), Some("en"));
    }

    #[test]
    fn test_parse_translate_response() {
        let body = r#"{"data":{"translations":[{"translatedText":"안녕"},{"translatedText":"세계","detectedSourceLanguage":"en"}]}}"#;
        assert_eq!(parse_translate_response(body).unwrap(), vec!["안녕", "세계"]);
    }

    #[test]
    fn test_parse_languages_response() {
        let body = r#"{"data":{"languages":[{"language":"en"},{"language":"ko"}]}}"#;
        assert_eq!(parse_languages_response(body).unwrap(), vec!["en", "ko"]);
    }

    #[test]
    fn test_failure_status_is_transport_error() {
        let result = response_result(503, "busy".into(), parse_translate_response);
        assert_eq!(
            result,
            Err(TranslationError::TransportError {
                status: 503,
                body: "busy".into()
            })
        );
        assert!(matches!(
            response_result(200, "not json".into(), parse_translate_response),
            Err(TranslationError::ParseError(_))
        ));
    }
}
