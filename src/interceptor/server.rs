//! OpenTelemetry 服务端拦截器
//!
//! 每个被追踪的调用对应一个服务端 span：从 gRPC 元数据中提取父 SpanContext，
//! 找到时新 span 作为它的子 span，否则作为新链路的根。
//! span 放入执行上下文后交给业务 handler，handler 可以通过
//! `cx.span()` 读取并继续添加标签。

use crate::error::ExtractError;
use crate::extract::{Extraction, extract, with_incoming_baggage};
use crate::handler::{
    StreamHandler, StreamServerInfo, StreamServerInterceptor, UnaryHandler, UnaryResult,
    UnaryServerInfo, UnaryServerInterceptor,
};
use crate::message::Message;
use crate::options::{ServerOption, ServerOptions};
use crate::stream::{ServerStream, TracedServerStream};
use crate::tags::{
    REQUEST_EVENT, RESPONSE_EVENT, log_error, log_payload, server_span_tags, set_span_tags,
};
use async_trait::async_trait;
use opentelemetry::Context;
use opentelemetry::trace::{SpanContext, SpanKind, TraceContextExt, Tracer};
use std::sync::Arc;
use tonic::Status;
use tracing::{debug, trace};

/// 创建一元调用的追踪拦截器
///
/// ```rust,ignore
/// let interceptor = unary_server_interceptor(tracer, [log_payloads()]);
/// let resp: HelloReply = serve_unary(&interceptor, cx, req, &info, handler).await?;
/// ```
pub fn unary_server_interceptor<T>(
    tracer: T,
    opts: impl IntoIterator<Item = ServerOption>,
) -> UnaryTracingInterceptor<T> {
    UnaryTracingInterceptor {
        tracer,
        options: Arc::new(ServerOptions::new(opts)),
    }
}

/// 创建流式调用的追踪拦截器，一个 span 覆盖整个流的生命周期
pub fn stream_server_interceptor<T>(
    tracer: T,
    opts: impl IntoIterator<Item = ServerOption>,
) -> StreamTracingInterceptor<T> {
    StreamTracingInterceptor {
        tracer,
        options: Arc::new(ServerOptions::new(opts)),
    }
}

/// 一元追踪拦截器
#[derive(Clone)]
pub struct UnaryTracingInterceptor<T> {
    tracer: T,
    options: Arc<ServerOptions>,
}

impl<T> UnaryTracingInterceptor<T> {
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
}

/// 流式追踪拦截器
#[derive(Clone)]
pub struct StreamTracingInterceptor<T> {
    tracer: T,
    options: Arc<ServerOptions>,
}

impl<T> StreamTracingInterceptor<T> {
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
}

#[async_trait]
impl<T> UnaryServerInterceptor for UnaryTracingInterceptor<T>
where
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    async fn intercept(
        &self,
        cx: Context,
        req: Message,
        info: &UnaryServerInfo,
        handler: UnaryHandler,
    ) -> UnaryResult {
        let options = &*self.options;
        let method = info.full_method.as_str();

        let Extraction { decoded, parent } = extract(&cx, options.propagator());
        let parent = parent_span_context(parent, method);
        if !options.includes(parent.as_ref(), method, Some(&req), None) {
            trace!(method, "call excluded from tracing");
            return match &options.unary_interceptor {
                Some(next) => next.intercept(cx, req, info, handler).await,
                None => handler(cx, req).await,
            };
        }

        let cx = start_server_span(&self.tracer, &cx, &decoded, parent, method);
        let _finish = FinishOnDrop(cx.clone());

        if options.log_payloads {
            log_payload(&cx.span(), REQUEST_EVENT, &req);
        }
        let kept_req = options.decorator.as_ref().map(|_| req.clone());

        let result = match &options.unary_interceptor {
            Some(next) => next.intercept(cx.clone(), req, info, handler).await,
            None => handler(cx.clone(), req).await,
        };

        let span = cx.span();
        match &result {
            Ok(resp) => {
                if options.log_payloads {
                    log_payload(&span, RESPONSE_EVENT, resp);
                }
            }
            Err(status) => {
                if options.log_errors {
                    set_span_tags(&span, status, false);
                    log_error(&span, status);
                }
            }
        }
        if let Some(decorator) = &options.decorator {
            decorator(
                &cx,
                &span,
                method,
                kept_req.as_ref(),
                result.as_ref().ok(),
                result.as_ref().err(),
            );
        }
        result
    }
}

#[async_trait]
impl<T> StreamServerInterceptor for StreamTracingInterceptor<T>
where
    T: Tracer + Send + Sync + 'static,
    T::Span: Send + Sync + 'static,
{
    async fn intercept(
        &self,
        stream: Box<dyn ServerStream>,
        info: &StreamServerInfo,
        handler: StreamHandler,
    ) -> Result<(), Status> {
        let options = &*self.options;
        let method = info.full_method.as_str();

        let Extraction { decoded, parent } = extract(stream.context(), options.propagator());
        let parent = parent_span_context(parent, method);
        if !options.includes(parent.as_ref(), method, None, None) {
            trace!(method, "stream excluded from tracing");
            return match &options.stream_interceptor {
                Some(next) => next.intercept(stream, info, handler).await,
                None => handler(stream).await,
            };
        }

        let cx = start_server_span(&self.tracer, stream.context(), &decoded, parent, method);
        let _finish = FinishOnDrop(cx.clone());
        let stream: Box<dyn ServerStream> = Box::new(TracedServerStream::new(stream, cx.clone()));

        let result = match &options.stream_interceptor {
            Some(next) => next.intercept(stream, info, handler).await,
            None => handler(stream).await,
        };

        let span = cx.span();
        if let Err(status) = &result {
            if options.log_errors {
                set_span_tags(&span, status, false);
                log_error(&span, status);
            }
        }
        if let Some(decorator) = &options.decorator {
            decorator(&cx, &span, method, None, None, result.as_ref().err());
        }
        result
    }
}

/// 离开作用域时结束上下文中的 span，覆盖正常返回、panic 展开与 future 被取消
struct FinishOnDrop(Context);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.span().end();
    }
}

fn parent_span_context(
    parent: Result<SpanContext, ExtractError>,
    method: &str,
) -> Option<SpanContext> {
    match parent {
        Ok(span_context) => Some(span_context),
        Err(ExtractError::NotFound) => None,
        Err(err) => {
            // 交给 tracer 之外没有更合适的上报通道，按根调用继续
            debug!(method, error = %err, "ignoring undecodable parent span context");
            None
        }
    }
}

/// 启动服务端 span，并派生携带该 span 与入站 baggage 的新上下文
fn start_server_span<T>(
    tracer: &T,
    cx: &Context,
    decoded: &Context,
    parent: Option<SpanContext>,
    method: &str,
) -> Context
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let parent_cx = match parent {
        Some(span_context) => Context::new().with_remote_span_context(span_context),
        None => Context::new(),
    };
    let span = tracer
        .span_builder(method.to_owned())
        .with_kind(SpanKind::Server)
        .with_attributes(server_span_tags())
        .start_with_context(tracer, &parent_cx);
    with_incoming_baggage(cx, decoded).with_span(span)
}
