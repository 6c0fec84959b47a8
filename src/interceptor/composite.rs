//! 组合拦截器
//!
//! 把多个拦截器按顺序嵌套为一个，第一个位于最外层

use crate::handler::{
    StreamHandler, StreamServerInfo, StreamServerInterceptor, UnaryHandler, UnaryResult,
    UnaryServerInfo, UnaryServerInterceptor,
};
use crate::message::Message;
use crate::stream::ServerStream;
use async_trait::async_trait;
use futures::FutureExt;
use opentelemetry::Context;
use std::sync::Arc;
use tonic::Status;

/// 组合一元拦截器
#[derive(Clone)]
pub struct CompositeUnaryInterceptor {
    interceptors: Arc<[Arc<dyn UnaryServerInterceptor>]>,
}

impl CompositeUnaryInterceptor {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new().into(),
        }
    }

    /// 追加一层，位于已有各层之内
    #[must_use]
    pub fn with(self, interceptor: Arc<dyn UnaryServerInterceptor>) -> Self {
        let mut interceptors = self.interceptors.to_vec();
        interceptors.push(interceptor);
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl Default for CompositeUnaryInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnaryServerInterceptor for CompositeUnaryInterceptor {
    async fn intercept(
        &self,
        cx: Context,
        req: Message,
        info: &UnaryServerInfo,
        handler: UnaryHandler,
    ) -> UnaryResult {
        let chained = chain_unary(self.interceptors.clone(), 0, info.clone(), handler);
        chained(cx, req).await
    }
}

fn chain_unary(
    interceptors: Arc<[Arc<dyn UnaryServerInterceptor>]>,
    index: usize,
    info: UnaryServerInfo,
    handler: UnaryHandler,
) -> UnaryHandler {
    if index >= interceptors.len() {
        return handler;
    }
    Arc::new(move |cx: Context, req: Message| {
        let interceptors = interceptors.clone();
        let info = info.clone();
        let handler = handler.clone();
        async move {
            let current = interceptors[index].clone();
            let next = chain_unary(interceptors, index + 1, info.clone(), handler);
            current.intercept(cx, req, &info, next).await
        }
        .boxed()
    })
}

/// 组合流式拦截器
#[derive(Clone)]
pub struct CompositeStreamInterceptor {
    interceptors: Arc<[Arc<dyn StreamServerInterceptor>]>,
}

impl CompositeStreamInterceptor {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new().into(),
        }
    }

    /// 追加一层，位于已有各层之内
    #[must_use]
    pub fn with(self, interceptor: Arc<dyn StreamServerInterceptor>) -> Self {
        let mut interceptors = self.interceptors.to_vec();
        interceptors.push(interceptor);
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl Default for CompositeStreamInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamServerInterceptor for CompositeStreamInterceptor {
    async fn intercept(
        &self,
        stream: Box<dyn ServerStream>,
        info: &StreamServerInfo,
        handler: StreamHandler,
    ) -> Result<(), Status> {
        let chained = chain_stream(self.interceptors.clone(), 0, info.clone(), handler);
        chained(stream).await
    }
}

fn chain_stream(
    interceptors: Arc<[Arc<dyn StreamServerInterceptor>]>,
    index: usize,
    info: StreamServerInfo,
    handler: StreamHandler,
) -> StreamHandler {
    if index >= interceptors.len() {
        return handler;
    }
    Arc::new(move |stream: Box<dyn ServerStream>| {
        let interceptors = interceptors.clone();
        let info = info.clone();
        let handler = handler.clone();
        async move {
            let current = interceptors[index].clone();
            let next = chain_stream(interceptors, index + 1, info.clone(), handler);
            current.intercept(stream, &info, next).await
        }
        .boxed()
    })
}
