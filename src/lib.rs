//! Flare OpenTelemetry gRPC Server Interceptors
//!
//! Provides unary and streaming server interceptors that extract the caller's trace
//! context from gRPC metadata, open one server span per call and expose that span
//! to handlers through the call's `opentelemetry::Context`.

pub mod carrier;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod handler;
pub mod message;
pub mod options;
pub mod stream;
pub mod tags;

// 拦截器
pub mod interceptor;

// Re-exports
pub use carrier::{MetadataReader, MetadataWriter, inject_span_context};
pub use config::TracingConfig;
pub use context::{context_from_request, context_with_metadata, metadata_from_context};
pub use error::{ConfigError, ExtractError, Result};
pub use extract::{Extraction, extract, extract_span_context, with_incoming_baggage};
pub use handler::{
    StreamHandler, StreamServerInfo, StreamServerInterceptor, UnaryHandler, UnaryResult,
    UnaryServerInfo, UnaryServerInterceptor, serve_unary, stream_handler, unary_handler,
};
pub use message::Message;
pub use options::{
    InclusionFn, ServerOption, ServerOptions, SpanDecoratorFn, including_spans, log_errors,
    log_payloads, propagator, span_decorator, stream_interceptor, unary_interceptor,
};
pub use stream::{ChannelServerStream, ServerStream, TracedServerStream};

pub use interceptor::*;
