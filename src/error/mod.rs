//! 错误处理模块
//!
//! 拦截器本身从不改写 RPC 的结果（`tonic::Status` 原样返回），
//! 这里只定义上下文提取与配置加载两类错误

use thiserror::Error;

/// 配置加载结果类型
pub type Result<T> = std::result::Result<T, ConfigError>;

/// 从 gRPC 元数据中提取父 SpanContext 的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// 元数据中没有任何追踪字段，当前调用是一条新链路的根
    #[error("span context not found in gRPC metadata")]
    NotFound,

    /// 存在追踪字段但无法解码
    #[error("malformed span context in gRPC metadata (fields: {fields})")]
    Malformed { fields: String },
}

impl ExtractError {
    /// 是否为"未找到"，即正常的根调用
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExtractError::NotFound)
    }
}

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tracing config: {0}")]
    Parse(#[from] toml::de::Error),
}
