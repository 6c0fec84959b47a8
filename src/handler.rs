//! 调用描述、handler 与拦截器抽象
//!
//! 拦截器以链的方式组合：每一层拿到执行上下文、请求和下一层 handler，
//! 决定如何调用下一层并观察其结果

use crate::message::Message;
use crate::stream::ServerStream;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use opentelemetry::Context;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tonic::Status;

/// 一元调用的结果
pub type UnaryResult = Result<Message, Status>;

/// 一元调用的最终 handler
pub type UnaryHandler = Arc<dyn Fn(Context, Message) -> BoxFuture<'static, UnaryResult> + Send + Sync>;

/// 流式调用的最终 handler，持有整个流直到调用结束
pub type StreamHandler =
    Arc<dyn Fn(Box<dyn ServerStream>) -> BoxFuture<'static, Result<(), Status>> + Send + Sync>;

/// 一元调用描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnaryServerInfo {
    /// 完整方法名，形如 `/package.Service/Method`
    pub full_method: String,
}

impl UnaryServerInfo {
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
        }
    }
}

/// 流式调用描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamServerInfo {
    pub full_method: String,
    pub is_client_stream: bool,
    pub is_server_stream: bool,
}

impl StreamServerInfo {
    /// 双向流
    pub fn new(full_method: impl Into<String>) -> Self {
        Self {
            full_method: full_method.into(),
            is_client_stream: true,
            is_server_stream: true,
        }
    }

    pub fn client_streaming(full_method: impl Into<String>) -> Self {
        Self {
            is_server_stream: false,
            ..Self::new(full_method)
        }
    }

    pub fn server_streaming(full_method: impl Into<String>) -> Self {
        Self {
            is_client_stream: false,
            ..Self::new(full_method)
        }
    }
}

/// 一元拦截器
#[async_trait]
pub trait UnaryServerInterceptor: Send + Sync {
    async fn intercept(
        &self,
        cx: Context,
        req: Message,
        info: &UnaryServerInfo,
        handler: UnaryHandler,
    ) -> UnaryResult;
}

/// 流式拦截器
#[async_trait]
pub trait StreamServerInterceptor: Send + Sync {
    async fn intercept(
        &self,
        stream: Box<dyn ServerStream>,
        info: &StreamServerInfo,
        handler: StreamHandler,
    ) -> Result<(), Status>;
}

/// 将强类型的 async 函数包装为 [`UnaryHandler`]
///
/// 请求类型与实际传入的消息不符时返回 `Status::internal`
pub fn unary_handler<Req, Resp, F, Fut>(f: F) -> UnaryHandler
where
    Req: Any + Clone + Send + Sync,
    Resp: Any + fmt::Debug + Send + Sync,
    F: Fn(Context, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    Arc::new(move |cx: Context, req: Message| match req.into_inner::<Req>() {
        Some(req) => f(cx, req).map(|res| res.map(Message::new)).boxed(),
        None => future::ready(Err(Status::internal(format!(
            "unexpected request type, expected {}",
            std::any::type_name::<Req>()
        ))))
        .boxed(),
    })
}

/// 将 async 函数包装为 [`StreamHandler`]
pub fn stream_handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(Box<dyn ServerStream>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Status>> + Send + 'static,
{
    Arc::new(move |stream: Box<dyn ServerStream>| f(stream).boxed())
}

/// 通过拦截器执行一次强类型的一元调用
///
/// 供 tonic 服务实现使用：把请求交给拦截器链，再把响应还原为具体类型
pub async fn serve_unary<Req, Resp>(
    interceptor: &dyn UnaryServerInterceptor,
    cx: Context,
    req: Req,
    info: &UnaryServerInfo,
    handler: UnaryHandler,
) -> Result<Resp, Status>
where
    Req: Any + fmt::Debug + Send + Sync,
    Resp: Any + Clone + Send + Sync,
{
    let resp = interceptor
        .intercept(cx, Message::new(req), info, handler)
        .await?;
    resp.into_inner::<Resp>().ok_or_else(|| {
        Status::internal(format!(
            "unexpected response type, expected {}",
            std::any::type_name::<Resp>()
        ))
    })
}
