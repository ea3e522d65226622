//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型、宿主可见的错误码以及错误处理辅助函数

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 传输错误（非成功状态码）
    #[error("传输错误: 状态码 {status}: {body}")]
    TransportError { status: u16, body: String },

    /// 网络错误（连接失败等）
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 不支持的目标语言
    #[error("不支持的目标语言: {0}")]
    UnsupportedLanguage(String),

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 分组错误
    #[error("分组错误: {0}")]
    GroupingError(String),

    /// DOM 操作错误
    #[error("DOM操作错误: {0}")]
    DomError(String),

    /// 节点已脱离文档
    #[error("节点已脱离文档")]
    DetachedNode,

    /// 分段标记解析错误
    #[error("标记解析错误: {0}")]
    MarkupError(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 状态错误（在不允许的状态下调用）
    #[error("状态错误: {0}")]
    StateError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::TransportError { status, .. } => *status >= 400,
            TranslationError::NetworkError(_) => true,
            _ => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::TransportError { .. } => ErrorSeverity::Warning,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::UnsupportedLanguage(_) => ErrorSeverity::Info,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::GroupingError(_) => ErrorSeverity::Warning,
            TranslationError::DomError(_) => ErrorSeverity::Error,
            TranslationError::DetachedNode => ErrorSeverity::Info,
            TranslationError::MarkupError(_) => ErrorSeverity::Warning,
            TranslationError::ParseError(_) => ErrorSeverity::Error,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::StateError(_) => ErrorSeverity::Error,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::TransportError { .. } | TranslationError::NetworkError(_) => {
                ErrorCategory::Network
            }
            TranslationError::UnsupportedLanguage(_) => ErrorCategory::Capability,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::GroupingError(_) => ErrorCategory::Processing,
            TranslationError::DomError(_) | TranslationError::DetachedNode => ErrorCategory::Dom,
            TranslationError::MarkupError(_) | TranslationError::ParseError(_) => {
                ErrorCategory::Parsing
            }
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::StateError(_) | TranslationError::InternalError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self, context);

        match self {
            TranslationError::ConfigError(_) => TranslationError::ConfigError(new_msg),
            TranslationError::NetworkError(_) => TranslationError::NetworkError(new_msg),
            TranslationError::InvalidInput(_) => TranslationError::InvalidInput(new_msg),
            TranslationError::GroupingError(_) => TranslationError::GroupingError(new_msg),
            TranslationError::DomError(_) => TranslationError::DomError(new_msg),
            TranslationError::MarkupError(_) => TranslationError::MarkupError(new_msg),
            TranslationError::ParseError(_) => TranslationError::ParseError(new_msg),
            TranslationError::SerializationError(_) => {
                TranslationError::SerializationError(new_msg)
            }
            TranslationError::StateError(_) => TranslationError::StateError(new_msg),
            TranslationError::InternalError(_) => TranslationError::InternalError(new_msg),
            other => other,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Capability,
    Input,
    Processing,
    Dom,
    Parsing,
    Serialization,
    Internal,
}

/// 报告给宿主的错误码（数值与宿主约定保持一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ErrorCode {
    #[default]
    None,
    InitializationError,
    UnsupportedLanguage,
    TranslationError,
    TranslationTimeout,
    UnexpectedScriptError,
    BadOrigin,
    ScriptLoadError,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::None => 0,
            ErrorCode::InitializationError => 2,
            ErrorCode::UnsupportedLanguage => 4,
            ErrorCode::TranslationError => 6,
            ErrorCode::TranslationTimeout => 7,
            ErrorCode::UnexpectedScriptError => 8,
            ErrorCode::BadOrigin => 9,
            ErrorCode::ScriptLoadError => 10,
        }
    }

    pub fn is_error(self) -> bool {
        self != ErrorCode::None
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_i32())
    }
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::NetworkError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::ParseError(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<config::ConfigError> for TranslationError {
    fn from(error: config::ConfigError) -> Self {
        TranslationError::ConfigError(format!("配置加载错误: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }

    /// 创建DOM错误
    pub fn dom_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::DomError(msg.to_string())
    }

    /// 创建分组错误
    pub fn grouping_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::GroupingError(msg.to_string())
    }

    /// 创建标记解析错误
    pub fn markup_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::MarkupError(msg.to_string())
    }

    /// 创建内部错误
    pub fn internal_error<T: fmt::Display>(msg: T) -> TranslationError {
        TranslationError::InternalError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_match_host_contract() {
        assert_eq!(ErrorCode::None.as_i32(), 0);
        assert_eq!(ErrorCode::UnsupportedLanguage.as_i32(), 4);
        assert_eq!(ErrorCode::TranslationError.as_i32(), 6);
        assert_eq!(ErrorCode::UnexpectedScriptError.as_i32(), 8);
        assert!(!ErrorCode::None.is_error());
    }

    #[test]
    fn test_transport_errors_retry_only_on_failure_status() {
        let server = TranslationError::TransportError {
            status: 503,
            body: String::new(),
        };
        let odd = TranslationError::TransportError {
            status: 302,
            body: String::new(),
        };
        assert!(server.is_retryable());
        assert!(!odd.is_retryable());
        assert!(!TranslationError::DetachedNode.is_retryable());
    }

    #[test]
    fn test_pipeline_errors_are_categorized() {
        assert_eq!(
            helpers::grouping_error("bad index").category(),
            ErrorCategory::Processing
        );
        assert_eq!(helpers::markup_error("i=9").category(), ErrorCategory::Parsing);
        assert_eq!(
            TranslationError::UnsupportedLanguage("xx".into()).severity(),
            ErrorSeverity::Info
        );
    }

    #[test]
    fn test_with_context_keeps_variant() {
        let error = helpers::dom_error("missing child").with_context("unit 3");
        match error {
            TranslationError::DomError(msg) => {
                assert!(msg.contains("missing child"));
                assert!(msg.contains("unit 3"));
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert_eq!(
            TranslationError::DetachedNode.with_context("x"),
            TranslationError::DetachedNode
        );
    }
}
