//! 内存翻译后端
//!
//! 两种用法：
//! - 脚本模式：请求只被记录，由宿主（测试）通过 [`MemoryBackend`] 决定何时、以何种顺序、
//!   以何种结果完成它们；
//! - 自动模式：每个请求立即用给定的翻译函数完成，分段标记会被保留。

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use super::client::{Completion, NetworkClient, RequestId, TranslateRequest};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::markup::{decode_segments, encode_indexed, is_segmented, Segment};

type Translator = Box<dyn Fn(&str) -> String>;

#[derive(Default)]
struct BackendState {
    languages: Option<TranslationResult<Vec<String>>>,
    languages_requests: usize,
    sent: Vec<(RequestId, TranslateRequest)>,
    completions: VecDeque<Completion>,
    translator: Option<Translator>,
    injected_failures: VecDeque<u16>,
}

/// 宿主持有的后端控制句柄
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Rc<RefCell<BackendState>>,
}

impl MemoryBackend {
    /// 已发送的翻译请求（按发送顺序，重试会重复出现）
    pub fn sent(&self) -> Vec<(RequestId, TranslateRequest)> {
        self.state.borrow().sent.clone()
    }

    pub fn translate_requests(&self) -> usize {
        self.state.borrow().sent.len()
    }

    pub fn languages_requests(&self) -> usize {
        self.state.borrow().languages_requests
    }

    /// 最近一次发送的请求
    pub fn last_sent(&self) -> Option<(RequestId, TranslateRequest)> {
        self.state.borrow().sent.last().cloned()
    }

    /// 以成功结果完成请求
    pub fn respond(&self, id: RequestId, translations: Vec<String>) {
        self.push(Completion::Translate {
            id,
            result: Ok(translations),
        });
    }

    /// 按查询逐条生成译文并完成请求
    pub fn respond_with<F: Fn(&str) -> String>(&self, id: RequestId, translate: F) {
        let queries = self
            .state
            .borrow()
            .sent
            .iter()
            .rev()
            .find(|(sent_id, _)| *sent_id == id)
            .map(|(_, request)| request.queries.clone())
            .unwrap_or_default();
        let translations = queries.iter().map(|q| translate_query(q, &translate)).collect();
        self.respond(id, translations);
    }

    /// 以失败状态码完成请求
    pub fn fail(&self, id: RequestId, status: u16) {
        self.push(Completion::Translate {
            id,
            result: Err(TranslationError::TransportError {
                status,
                body: String::new(),
            }),
        });
    }

    /// 设置语言列表查询的结果
    pub fn set_languages(&self, languages: &[&str]) {
        self.state.borrow_mut().languages =
            Some(Ok(languages.iter().map(|l| l.to_string()).collect()));
    }

    pub fn set_languages_failure(&self, status: u16) {
        self.state.borrow_mut().languages = Some(Err(TranslationError::TransportError {
            status,
            body: String::new(),
        }));
    }

    /// 自动模式下，让接下来的 `count` 个翻译请求以 `status` 失败
    pub fn fail_next(&self, count: usize, status: u16) {
        let mut state = self.state.borrow_mut();
        state.injected_failures.extend(std::iter::repeat(status).take(count));
    }

    fn push(&self, completion: Completion) {
        self.state.borrow_mut().completions.push_back(completion);
    }
}

/// 内存翻译后端
pub struct MemoryNetworkClient {
    backend: MemoryBackend,
}

impl MemoryNetworkClient {
    /// 脚本模式：翻译请求等待宿主完成
    pub fn scripted(languages: &[&str]) -> Self {
        let backend = MemoryBackend::default();
        backend.set_languages(languages);
        Self { backend }
    }

    /// 自动模式：每个请求立即用 `translator` 完成
    pub fn automatic<F>(languages: &[&str], translator: F) -> Self
    where
        F: Fn(&str) -> String + 'static,
    {
        let client = Self::scripted(languages);
        client.backend.state.borrow_mut().translator = Some(Box::new(translator));
        client
    }

    /// 获取控制句柄
    pub fn handle(&self) -> MemoryBackend {
        self.backend.clone()
    }
}

impl NetworkClient for MemoryNetworkClient {
    fn request_languages(&mut self) {
        let mut state = self.backend.state.borrow_mut();
        state.languages_requests += 1;
        let result = state
            .languages
            .clone()
            .unwrap_or_else(|| Ok(Vec::new()));
        state.completions.push_back(Completion::Languages(result));
    }

    fn send_translate(&mut self, id: RequestId, request: &TranslateRequest) {
        let mut state = self.backend.state.borrow_mut();
        state.sent.push((id, request.clone()));

        if state.translator.is_none() {
            return;
        }
        let completion = match state.injected_failures.pop_front() {
            Some(status) => Completion::Translate {
                id,
                result: Err(TranslationError::TransportError {
                    status,
                    body: String::new(),
                }),
            },
            None => {
                let translator = state.translator.as_ref();
                let translations = request
                    .queries
                    .iter()
                    .map(|q| match translator {
                        Some(translate) => translate_query(q, translate),
                        None => q.clone(),
                    })
                    .collect();
                Completion::Translate {
                    id,
                    result: Ok(translations),
                }
            }
        };
        state.completions.push_back(completion);
    }

    fn poll_completion(&mut self) -> Option<Completion> {
        self.backend.state.borrow_mut().completions.pop_front()
    }
}

/// 翻译一条查询；分段查询逐段翻译并保留标记
pub fn translate_query<F: Fn(&str) -> String + ?Sized>(query: &str, translate: &F) -> String {
    if !is_segmented(query) {
        return translate(query);
    }
    let segments: Vec<Segment> = decode_segments(query)
        .into_iter()
        .filter_map(|segment| {
            segment
                .index
                .map(|index| Segment::new(index, translate(&segment.text)))
        })
        .collect();
    encode_indexed(&segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_requests_wait_for_host() {
        let mut client = MemoryNetworkClient::scripted(&["en", "ko"]);
        let backend = client.handle();

        client.request_languages();
        assert_eq!(
            client.poll_completion(),
            Some(Completion::Languages(Ok(vec!["en".into(), "ko".into()])))
        );

        let request = TranslateRequest::new(vec!["hi".into()], "en", "ko");
        client.send_translate(RequestId(1), &request);
        assert_eq!(client.poll_completion(), None);

        backend.respond_with(RequestId(1), |q| q.to_uppercase());
        assert_eq!(
            client.poll_completion(),
            Some(Completion::Translate {
                id: RequestId(1),
                result: Ok(vec!["HI".into()])
            })
        );
    }

    #[test]
    fn test_automatic_mode_keeps_segments() {
        let mut client = MemoryNetworkClient::automatic(&["ko"], |q| format!("[{}]", q));
        let request = TranslateRequest::new(
            vec!["<a i=0>Hello </a><a i=1>world</a>".into(), "plain".into()],
            "en",
            "ko",
        );
        client.send_translate(RequestId(7), &request);

        match client.poll_completion() {
            Some(Completion::Translate { id, result }) => {
                assert_eq!(id, RequestId(7));
                assert_eq!(
                    result.unwrap(),
                    vec!["<a i=0>[Hello ]</a><a i=1>[world]</a>", "[plain]"]
                );
            }
            other => panic!("unexpected completion: {:?}", other),
        }
    }

    #[test]
    fn test_injected_failures() {
        let mut client = MemoryNetworkClient::automatic(&["ko"], |q| q.to_string());
        client.handle().fail_next(1, 500);
        let request = TranslateRequest::new(vec!["x".into()], "en", "ko");

        client.send_translate(RequestId(1), &request);
        client.send_translate(RequestId(1), &request);

        assert!(matches!(
            client.poll_completion(),
            Some(Completion::Translate { result: Err(_), .. })
        ));
        assert!(matches!(
            client.poll_completion(),
            Some(Completion::Translate { result: Ok(_), .. })
        ));
        assert_eq!(client.handle().translate_requests(), 2);
    }
}
