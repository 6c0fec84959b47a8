use crate::handler::{
    StreamHandler, StreamServerInfo, StreamServerInterceptor, UnaryHandler, UnaryResult,
    UnaryServerInfo, UnaryServerInterceptor,
};
use crate::message::Message;
use crate::stream::ServerStream;
use async_trait::async_trait;
use opentelemetry::Context;
use opentelemetry::trace::{TraceContextExt, TraceId};
use std::time::{Duration, Instant};
use tonic::Status;
use tracing::{info, warn};

/// 日志拦截器
///
/// 每次调用结束后输出一条结构化日志，带上当前上下文中的 trace_id，
/// 放在追踪拦截器之下时日志可以与 span 关联
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UnaryServerInterceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        cx: Context,
        req: Message,
        info: &UnaryServerInfo,
        handler: UnaryHandler,
    ) -> UnaryResult {
        let trace_id = cx.span().span_context().trace_id();
        let start = Instant::now();
        let result = handler(cx, req).await;
        log_outcome(&info.full_method, trace_id, start.elapsed(), result.as_ref().err());
        result
    }
}

#[async_trait]
impl StreamServerInterceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        stream: Box<dyn ServerStream>,
        info: &StreamServerInfo,
        handler: StreamHandler,
    ) -> Result<(), Status> {
        let trace_id = stream.context().span().span_context().trace_id();
        let start = Instant::now();
        let result = handler(stream).await;
        log_outcome(&info.full_method, trace_id, start.elapsed(), result.as_ref().err());
        result
    }
}

fn log_outcome(method: &str, trace_id: TraceId, elapsed: Duration, err: Option<&Status>) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match err {
        None => info!(method, %trace_id, elapsed_ms, "gRPC call completed"),
        Some(status) => warn!(
            method,
            %trace_id,
            elapsed_ms,
            code = ?status.code(),
            message = status.message(),
            "gRPC call failed"
        ),
    }
}
