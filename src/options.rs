//! 拦截器选项
//!
//! 选项以函数的形式按顺序作用在默认配置上，构建完成后配置不再改变，
//! 在所有调用之间只读共享

use crate::handler::{StreamServerInterceptor, UnaryServerInterceptor};
use crate::message::Message;
use opentelemetry::Context;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanContext, SpanRef};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::fmt;
use std::sync::Arc;
use tonic::Status;

/// 决定某次调用是否需要追踪
///
/// 参数依次为父 SpanContext（没有时为 `None`）、完整方法名、请求、响应。
/// 一元调用时请求为实际请求，响应总是 `None`；流式调用时两者都是 `None`
pub type InclusionFn =
    Arc<dyn Fn(Option<&SpanContext>, &str, Option<&Message>, Option<&Message>) -> bool + Send + Sync>;

/// handler 返回后、span 结束前调用的装饰器
pub type SpanDecoratorFn = Arc<
    dyn Fn(&Context, &SpanRef<'_>, &str, Option<&Message>, Option<&Message>, Option<&Status>)
        + Send
        + Sync,
>;

/// 拦截器配置
#[derive(Clone)]
pub struct ServerOptions {
    pub(crate) log_payloads: bool,
    pub(crate) log_errors: bool,
    pub(crate) inclusion: Option<InclusionFn>,
    pub(crate) decorator: Option<SpanDecoratorFn>,
    pub(crate) unary_interceptor: Option<Arc<dyn UnaryServerInterceptor>>,
    pub(crate) stream_interceptor: Option<Arc<dyn StreamServerInterceptor>>,
    pub(crate) propagator: Arc<dyn TextMapPropagator + Send + Sync>,
}

impl ServerOptions {
    /// 在默认配置上依次应用选项
    pub fn new(opts: impl IntoIterator<Item = ServerOption>) -> Self {
        let mut options = Self::default();
        for opt in opts {
            (opt.0)(&mut options);
        }
        options
    }

    pub fn log_payloads(&self) -> bool {
        self.log_payloads
    }

    pub fn log_errors(&self) -> bool {
        self.log_errors
    }

    pub fn propagator(&self) -> &dyn TextMapPropagator {
        self.propagator.as_ref()
    }

    /// 未设置谓词时所有调用都会被追踪
    pub(crate) fn includes(
        &self,
        parent: Option<&SpanContext>,
        full_method: &str,
        req: Option<&Message>,
        resp: Option<&Message>,
    ) -> bool {
        match &self.inclusion {
            Some(inclusion) => inclusion(parent, full_method, req, resp),
            None => true,
        }
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            log_payloads: false,
            log_errors: true,
            inclusion: None,
            decorator: None,
            unary_interceptor: None,
            stream_interceptor: None,
            propagator: Arc::new(TraceContextPropagator::new()),
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("log_payloads", &self.log_payloads)
            .field("log_errors", &self.log_errors)
            .field("inclusion", &self.inclusion.is_some())
            .field("decorator", &self.decorator.is_some())
            .field("unary_interceptor", &self.unary_interceptor.is_some())
            .field("stream_interceptor", &self.stream_interceptor.is_some())
            .finish_non_exhaustive()
    }
}

/// 单个选项
pub struct ServerOption(Box<dyn FnOnce(&mut ServerOptions) + Send>);

impl ServerOption {
    fn new(apply: impl FnOnce(&mut ServerOptions) + Send + 'static) -> Self {
        Self(Box::new(apply))
    }
}

/// 在 span 上记录请求与响应内容
pub fn log_payloads() -> ServerOption {
    ServerOption::new(|o| o.log_payloads = true)
}

/// 是否在 span 上记录错误标签与 error 事件，默认开启
pub fn log_errors(enabled: bool) -> ServerOption {
    ServerOption::new(move |o| o.log_errors = enabled)
}

/// 设置追踪谓词，返回 `false` 的调用完全跳过追踪
pub fn including_spans<F>(inclusion: F) -> ServerOption
where
    F: Fn(Option<&SpanContext>, &str, Option<&Message>, Option<&Message>) -> bool
        + Send
        + Sync
        + 'static,
{
    let inclusion: InclusionFn = Arc::new(inclusion);
    ServerOption::new(move |o| o.inclusion = Some(inclusion))
}

/// 设置 span 装饰器
pub fn span_decorator<F>(decorator: F) -> ServerOption
where
    F: Fn(&Context, &SpanRef<'_>, &str, Option<&Message>, Option<&Message>, Option<&Status>)
        + Send
        + Sync
        + 'static,
{
    let decorator: SpanDecoratorFn = Arc::new(decorator);
    ServerOption::new(move |o| o.decorator = Some(decorator))
}

/// 在追踪之下串联另一个一元拦截器
pub fn unary_interceptor(interceptor: Arc<dyn UnaryServerInterceptor>) -> ServerOption {
    ServerOption::new(move |o| o.unary_interceptor = Some(interceptor))
}

/// 在追踪之下串联另一个流式拦截器
pub fn stream_interceptor(interceptor: Arc<dyn StreamServerInterceptor>) -> ServerOption {
    ServerOption::new(move |o| o.stream_interceptor = Some(interceptor))
}

/// 替换默认的 W3C trace-context 传播器
pub fn propagator<P>(propagator: P) -> ServerOption
where
    P: TextMapPropagator + Send + Sync + 'static,
{
    let propagator: Arc<dyn TextMapPropagator + Send + Sync> = Arc::new(propagator);
    ServerOption::new(move |o| o.propagator = propagator)
}
