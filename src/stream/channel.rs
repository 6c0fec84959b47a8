//! 基于通道的服务端流
//!
//! 把 tonic 的入站流（`tonic::Streaming<Req>`）与出站 mpsc 通道组合成
//! [`ServerStream`]。出站通道的接收端通过 `ReceiverStream` 作为 tonic
//! 的响应流返回：
//!
//! ```rust,ignore
//! let cx = context_from_request(&request);
//! let (stream, responses) = ChannelServerStream::channel(cx, request.into_inner(), 16);
//! tokio::spawn(async move {
//!     let _ = interceptor.intercept(Box::new(stream), &info, handler).await;
//! });
//! Ok(Response::new(responses))
//! ```

use super::{ServerStream, merge_metadata};
use crate::message::Message;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use opentelemetry::Context;
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;
use tonic::metadata::MetadataMap;

#[derive(Debug, Default)]
struct Collected {
    header: MetadataMap,
    trailer: MetadataMap,
    header_sent: bool,
}

/// handler 设置的响应头与 trailer
///
/// 流被交给 handler 之后仍可通过此句柄读取
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    inner: Arc<Mutex<Collected>>,
}

impl ResponseMetadata {
    fn lock(&self) -> MutexGuard<'_, Collected> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn header(&self) -> MetadataMap {
        self.lock().header.clone()
    }

    pub fn trailer(&self) -> MetadataMap {
        self.lock().trailer.clone()
    }

    /// 响应头是否已经定稿（显式发送或已发送过消息）
    pub fn header_sent(&self) -> bool {
        self.lock().header_sent
    }
}

/// 入站流 + 出站通道
pub struct ChannelServerStream<S, Resp> {
    cx: Context,
    inbound: S,
    outbound: mpsc::Sender<Result<Resp, Status>>,
    metadata: ResponseMetadata,
}

impl<S, Req, Resp> ChannelServerStream<S, Resp>
where
    S: Stream<Item = Result<Req, Status>> + Send + Unpin,
    Req: Any + fmt::Debug + Send + Sync,
    Resp: Any + Clone + Send + Sync,
{
    pub fn new(cx: Context, inbound: S, outbound: mpsc::Sender<Result<Resp, Status>>) -> Self {
        Self {
            cx,
            inbound,
            outbound,
            metadata: ResponseMetadata::default(),
        }
    }

    /// 创建出站通道，接收端包装为可直接交给 tonic 的响应流
    pub fn channel(
        cx: Context,
        inbound: S,
        buffer: usize,
    ) -> (Self, ReceiverStream<Result<Resp, Status>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self::new(cx, inbound, tx), ReceiverStream::new(rx))
    }

    pub fn response_metadata(&self) -> ResponseMetadata {
        self.metadata.clone()
    }
}

#[async_trait]
impl<S, Req, Resp> ServerStream for ChannelServerStream<S, Resp>
where
    S: Stream<Item = Result<Req, Status>> + Send + Unpin,
    Req: Any + fmt::Debug + Send + Sync,
    Resp: Any + Clone + Send + Sync,
{
    fn context(&self) -> &Context {
        &self.cx
    }

    fn set_header(&mut self, metadata: MetadataMap) -> Result<(), Status> {
        let mut collected = self.metadata.lock();
        if collected.header_sent {
            return Err(Status::internal("response header already sent"));
        }
        merge_metadata(&mut collected.header, &metadata);
        Ok(())
    }

    async fn send_header(&mut self, metadata: MetadataMap) -> Result<(), Status> {
        let mut collected = self.metadata.lock();
        if collected.header_sent {
            return Err(Status::internal("response header already sent"));
        }
        merge_metadata(&mut collected.header, &metadata);
        collected.header_sent = true;
        Ok(())
    }

    fn set_trailer(&mut self, metadata: MetadataMap) {
        merge_metadata(&mut self.metadata.lock().trailer, &metadata);
    }

    async fn send_msg(&mut self, msg: Message) -> Result<(), Status> {
        let resp = msg.into_inner::<Resp>().ok_or_else(|| {
            Status::internal(format!(
                "unexpected response type, expected {}",
                std::any::type_name::<Resp>()
            ))
        })?;
        self.metadata.lock().header_sent = true;
        self.outbound
            .send(Ok(resp))
            .await
            .map_err(|_| Status::cancelled("response stream closed by client"))
    }

    async fn recv_msg(&mut self) -> Result<Option<Message>, Status> {
        match self.inbound.next().await {
            Some(Ok(req)) => Ok(Some(Message::new(req))),
            Some(Err(status)) => Err(status),
            None => Ok(None),
        }
    }
}
