//! 集成测试公共工具
//!
//! 使用 OpenTelemetry SDK 的内存导出器观察已结束的 span

#![allow(dead_code)]

use flare_otgrpc::{
    ChannelServerStream, Message, StreamHandler, StreamServerInfo, StreamServerInterceptor,
    UnaryHandler, UnaryResult, UnaryServerInfo, UnaryServerInterceptor, context_with_metadata,
    inject_span_context,
};
use async_trait::async_trait;
use opentelemetry::trace::{
    Span, SpanBuilder, SpanContext, SpanId, Status as SpanStatus, TraceContextExt, TraceFlags,
    TraceId, TraceState, Tracer, TracerProvider,
};
use opentelemetry::{Context, KeyValue, Value};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{
    InMemorySpanExporter, SdkTracer, SdkTracerProvider, SpanData,
};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tonic::Status;
use tonic::metadata::MetadataMap;

pub const PARENT_TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
pub const PARENT_SPAN_ID: &str = "00f067aa0ba902b7";

#[derive(Debug, Clone, PartialEq)]
pub struct Ping {
    pub seq: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pong {
    pub seq: u32,
}

/// 测试用 tracer，结束的 span 同步写入内存导出器
pub struct TestTracing {
    pub provider: SdkTracerProvider,
    pub exporter: InMemorySpanExporter,
}

impl TestTracing {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("flare_otgrpc=trace")
            .with_test_writer()
            .try_init();

        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        Self { provider, exporter }
    }

    pub fn tracer(&self) -> SdkTracer {
        self.provider.tracer("otgrpc-test")
    }

    pub fn finished(&self) -> Vec<SpanData> {
        self.exporter
            .get_finished_spans()
            .expect("Failed to read finished spans")
    }

    pub fn single(&self) -> SpanData {
        let mut spans = self.finished();
        assert_eq!(spans.len(), 1, "expected exactly one finished span");
        spans.remove(0)
    }
}

/// 统计 span 启动与结束次数的 tracer
///
/// SDK 会忽略重复的 `end`，这里每次调用都计数
#[derive(Clone, Default)]
pub struct CountingTracer {
    started: Arc<AtomicUsize>,
    ended: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl CountingTracer {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct CountingSpan {
    span_context: SpanContext,
    ended: Arc<AtomicUsize>,
}

impl Span for CountingSpan {
    fn add_event_with_timestamp<T>(&mut self, _name: T, _timestamp: SystemTime, _attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
    }

    fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    fn is_recording(&self) -> bool {
        true
    }

    fn set_attribute(&mut self, _attribute: KeyValue) {}

    fn set_status(&mut self, _status: SpanStatus) {}

    fn update_name<T>(&mut self, _new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
    }

    fn add_link(&mut self, _span_context: SpanContext, _attributes: Vec<KeyValue>) {}

    fn end_with_timestamp(&mut self, _timestamp: SystemTime) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

impl Tracer for CountingTracer {
    type Span = CountingSpan;

    fn build_with_context(&self, _builder: SpanBuilder, _parent_cx: &Context) -> CountingSpan {
        self.started.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        CountingSpan {
            span_context: SpanContext::new(
                TraceId::from(u128::from(id)),
                SpanId::from(id),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            ended: self.ended.clone(),
        }
    }
}

/// 调用方的父 SpanContext
pub fn remote_parent() -> SpanContext {
    SpanContext::new(
        TraceId::from_hex(PARENT_TRACE_ID).expect("valid trace id"),
        SpanId::from_hex(PARENT_SPAN_ID).expect("valid span id"),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    )
}

/// 构建携带父 span 元数据的调用上下文
pub fn context_with_parent(parent: &SpanContext) -> Context {
    let mut metadata = MetadataMap::new();
    inject_span_context(
        &Context::new().with_remote_span_context(parent.clone()),
        &TraceContextPropagator::new(),
        &mut metadata,
    );
    context_with_metadata(&Context::new(), metadata)
}

pub fn attr<'a>(span: &'a SpanData, key: &str) -> Option<&'a Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| &kv.value)
}

pub fn event_names(span: &SpanData) -> Vec<String> {
    span.events.events.iter().map(|event| event.name.to_string()).collect()
}

pub fn event_attr(span: &SpanData, event: &str, key: &str) -> Option<String> {
    span.events
        .events
        .iter()
        .find(|e| e.name == event)
        .and_then(|e| e.attributes.iter().find(|kv| kv.key.as_str() == key))
        .map(|kv| kv.value.as_str().into_owned())
}

/// 构建以 `ping` 为输入的通道流，返回流和出站接收端
pub fn ping_stream(
    cx: Context,
    pings: Vec<Ping>,
) -> (
    Box<ChannelServerStream<futures::stream::Iter<std::vec::IntoIter<Result<Ping, Status>>>, Pong>>,
    mpsc::Receiver<Result<Pong, Status>>,
) {
    let inbound = futures::stream::iter(pings.into_iter().map(Ok).collect::<Vec<_>>());
    let (tx, rx) = mpsc::channel(16);
    (Box::new(ChannelServerStream::new(cx, inbound, tx)), rx)
}

/// 记录调用顺序以及所见上下文的拦截器
pub struct Recorder {
    pub name: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new(name: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self { name, log })
    }

    fn record(&self, cx: &Context) {
        let entry = if cx.has_active_span() {
            format!("{}:span={}", self.name, cx.span().span_context().span_id())
        } else {
            format!("{}:no-span", self.name)
        };
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl UnaryServerInterceptor for Recorder {
    async fn intercept(
        &self,
        cx: Context,
        req: Message,
        _info: &UnaryServerInfo,
        handler: UnaryHandler,
    ) -> UnaryResult {
        self.record(&cx);
        handler(cx, req).await
    }
}

#[async_trait]
impl StreamServerInterceptor for Recorder {
    async fn intercept(
        &self,
        stream: Box<dyn flare_otgrpc::ServerStream>,
        _info: &StreamServerInfo,
        handler: StreamHandler,
    ) -> Result<(), Status> {
        self.record(stream.context());
        handler(stream).await
    }
}
