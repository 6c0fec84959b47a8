//! 服务端流抽象
//!
//! 提供流对象的能力集合 [`ServerStream`]，以及只替换执行上下文、
//! 其余操作全部转发给原始流的 [`TracedServerStream`]

pub mod channel;

pub use channel::ChannelServerStream;

use crate::message::Message;
use async_trait::async_trait;
use opentelemetry::Context;
use tonic::Status;
use tonic::metadata::{KeyAndValueRef, MetadataMap};

/// 服务端流
#[async_trait]
pub trait ServerStream: Send {
    /// 流的执行上下文
    fn context(&self) -> &Context;

    /// 设置响应头，在首次发送前可多次调用，条目依次追加
    fn set_header(&mut self, metadata: MetadataMap) -> Result<(), Status>;

    /// 立即发送响应头
    async fn send_header(&mut self, metadata: MetadataMap) -> Result<(), Status>;

    /// 设置流结束时发送的 trailer
    fn set_trailer(&mut self, metadata: MetadataMap);

    async fn send_msg(&mut self, msg: Message) -> Result<(), Status>;

    /// 读取下一条消息，对端结束发送时返回 `Ok(None)`
    async fn recv_msg(&mut self) -> Result<Option<Message>, Status>;
}

/// 携带新执行上下文的流包装
///
/// 只覆盖 [`ServerStream::context`]
pub struct TracedServerStream {
    inner: Box<dyn ServerStream>,
    cx: Context,
}

impl TracedServerStream {
    pub fn new(inner: Box<dyn ServerStream>, cx: Context) -> Self {
        Self { inner, cx }
    }

    pub fn into_inner(self) -> Box<dyn ServerStream> {
        self.inner
    }
}

#[async_trait]
impl ServerStream for TracedServerStream {
    fn context(&self) -> &Context {
        &self.cx
    }

    fn set_header(&mut self, metadata: MetadataMap) -> Result<(), Status> {
        self.inner.set_header(metadata)
    }

    async fn send_header(&mut self, metadata: MetadataMap) -> Result<(), Status> {
        self.inner.send_header(metadata).await
    }

    fn set_trailer(&mut self, metadata: MetadataMap) {
        self.inner.set_trailer(metadata)
    }

    async fn send_msg(&mut self, msg: Message) -> Result<(), Status> {
        self.inner.send_msg(msg).await
    }

    async fn recv_msg(&mut self) -> Result<Option<Message>, Status> {
        self.inner.recv_msg().await
    }
}

/// 将 `src` 的全部条目追加到 `dst`
pub(crate) fn merge_metadata(dst: &mut MetadataMap, src: &MetadataMap) {
    for entry in src.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                dst.append(key.clone(), value.clone());
            }
            KeyAndValueRef::Binary(key, value) => {
                dst.append_bin(key.clone(), value.clone());
            }
        }
    }
}
