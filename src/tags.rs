//! span 标签
//!
//! 服务端 span 的固定标签，以及根据 gRPC 状态码给出的错误标签

use opentelemetry::KeyValue;
use opentelemetry::trace::{SpanRef, Status as SpanStatus};
use tonic::{Code, Status};

/// 标识埋点来源的标签
pub const COMPONENT_KEY: &str = "component";
pub const COMPONENT_VALUE: &str = "gRPC";

pub const RESPONSE_CODE_KEY: &str = "response_code";
pub const RESPONSE_CLASS_KEY: &str = "response_class";
pub const ERROR_KEY: &str = "error";

/// 载荷事件名
pub const REQUEST_EVENT: &str = "gRPC request";
pub const RESPONSE_EVENT: &str = "gRPC response";
pub const ERROR_EVENT: &str = "error";

/// 每个服务端 span 在创建时带上的标签
pub fn server_span_tags() -> Vec<KeyValue> {
    vec![KeyValue::new(COMPONENT_KEY, COMPONENT_VALUE)]
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Success,
    ClientError,
    ServerError,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Success => "2xx",
            ErrorClass::ClientError => "4xx",
            ErrorClass::ServerError => "5xx",
        }
    }

    /// 按状态码分类
    pub fn of(code: Code) -> Self {
        match code {
            Code::Ok => ErrorClass::Success,
            Code::Cancelled
            | Code::InvalidArgument
            | Code::NotFound
            | Code::AlreadyExists
            | Code::PermissionDenied
            | Code::Unauthenticated
            | Code::FailedPrecondition
            | Code::OutOfRange => ErrorClass::ClientError,
            _ => ErrorClass::ServerError,
        }
    }
}

/// 给失败的调用打上错误标签
///
/// `client` 为 `false` 时只有服务端类错误会被标记为失败
pub fn set_span_tags(span: &SpanRef<'_>, status: &Status, client: bool) {
    let class = ErrorClass::of(status.code());
    span.set_attribute(KeyValue::new(RESPONSE_CODE_KEY, grpc_code(status.code())));
    span.set_attribute(KeyValue::new(RESPONSE_CLASS_KEY, class.as_str()));
    if client || class == ErrorClass::ServerError {
        span.set_attribute(KeyValue::new(ERROR_KEY, true));
        span.set_status(SpanStatus::error(status.message().to_string()));
    }
}

/// gRPC 协议中的数值状态码
pub fn grpc_code(code: Code) -> i64 {
    i64::from(code as i32)
}

/// 记录 error 事件
pub fn log_error(span: &SpanRef<'_>, status: &Status) {
    span.add_event(
        ERROR_EVENT,
        vec![
            KeyValue::new("event", ERROR_EVENT),
            KeyValue::new("message", status.message().to_string()),
        ],
    );
}

/// 记录一条载荷事件
pub fn log_payload(span: &SpanRef<'_>, event: &'static str, payload: &impl std::fmt::Debug) {
    span.add_event(event, vec![KeyValue::new(event, format!("{payload:?}"))]);
}
