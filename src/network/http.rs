//! HTTP 翻译后端
//!
//! 使用阻塞式 reqwest 客户端访问 Cloud Translation v2 风格的接口。
//! 请求在 `send_translate` 内同步完成，结果排入完成队列，由引擎在 `pump` 时取回。

use std::collections::VecDeque;
use std::time::Duration;

use reqwest::blocking::Client;
use url::Url;

use super::client::{
    parse_languages_response, parse_translate_response, response_result, Completion,
    NetworkClient, RequestId, TranslateRequest,
};
use crate::translation::config::BackendConfig;
use crate::translation::error::{TranslationError, TranslationResult};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// HTTP 翻译后端
pub struct HttpNetworkClient {
    client: Client,
    config: BackendConfig,
    completions: VecDeque<Completion>,
}

impl HttpNetworkClient {
    /// 创建新的 HTTP 后端
    pub fn new(config: BackendConfig) -> TranslationResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("inpage-translate/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TranslationError::NetworkError(format!("创建HTTP客户端失败: {}", e)))?;

        Ok(Self {
            client,
            config,
            completions: VecDeque::new(),
        })
    }

    fn endpoint(&self, base: &str, params: &[(&str, &str)]) -> TranslationResult<Url> {
        let mut url = Url::parse(base)
            .map_err(|e| TranslationError::ConfigError(format!("接口地址无效 {}: {}", base, e)))?;
        {
            let mut pairs = url.query_pairs_mut();
            if !self.config.access_token.is_empty() {
                pairs.append_pair("access_token", &self.config.access_token);
            }
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn fetch_languages(&self) -> TranslationResult<Vec<String>> {
        let url = self.endpoint(&self.config.languages_url, &[])?;
        tracing::debug!("请求语言列表: {}", self.config.languages_url);

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| TranslationError::NetworkError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TranslationError::NetworkError(e.to_string()))?;
        response_result(status, body, parse_languages_response)
    }

    fn fetch_translations(&self, request: &TranslateRequest) -> TranslationResult<Vec<String>> {
        let mut params = vec![("target", request.target.as_str())];
        if let Some(source) = request.source.as_deref() {
            params.push(("source", source));
        }
        let url = self.endpoint(&self.config.api_url, &params)?;

        let form: Vec<(&str, &str)> = request.queries.iter().map(|q| ("q", q.as_str())).collect();
        let response = self
            .client
            .post(url)
            .form(&form)
            .send()
            .map_err(|e| TranslationError::NetworkError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| TranslationError::NetworkError(e.to_string()))?;
        response_result(status, body, parse_translate_response)
    }
}

impl NetworkClient for HttpNetworkClient {
    fn request_languages(&mut self) {
        let result = self.fetch_languages();
        if let Err(ref e) = result {
            tracing::warn!("获取语言列表失败: {}", e);
        }
        self.completions.push_back(Completion::Languages(result));
    }

    fn send_translate(&mut self, id: RequestId, request: &TranslateRequest) {
        tracing::debug!("发送翻译请求 {}: {} 条查询", id, request.queries.len());
        let result = self.fetch_translations(request);
        self.completions.push_back(Completion::Translate { id, result });
    }

    fn poll_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_appends_token_and_params() {
        let config = BackendConfig {
            access_token: "tok".into(),
            ..BackendConfig::default()
        };
        let client = HttpNetworkClient::new(config).unwrap();
        let url = client
            .endpoint("https://example.com/v2", &[("target", "ko"), ("source", "en")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/v2?access_token=tok&target=ko&source=en"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let client = HttpNetworkClient::new(BackendConfig::default()).unwrap();
        assert!(matches!(
            client.endpoint("not a url", &[]),
            Err(TranslationError::ConfigError(_))
        ));
    }
}
