//! gRPC 拦截器模块
//!
//! 提供追踪、组合、日志等拦截器功能

pub mod composite;
pub mod logging;
pub mod server;

pub use composite::{CompositeStreamInterceptor, CompositeUnaryInterceptor};
pub use logging::LoggingInterceptor;
pub use server::{
    StreamTracingInterceptor, UnaryTracingInterceptor, stream_server_interceptor,
    unary_server_interceptor,
};
