//! 执行上下文中的元数据访问

use opentelemetry::Context;
use tonic::metadata::MetadataMap;

/// 入站调用携带的元数据，作为上下文中的一层值存放
#[derive(Debug, Clone)]
struct IncomingMetadata(MetadataMap);

/// 派生一个携带入站元数据的新上下文，不修改 `cx`
pub fn context_with_metadata(cx: &Context, metadata: MetadataMap) -> Context {
    cx.with_value(IncomingMetadata(metadata))
}

/// 读取上下文中的入站元数据
pub fn metadata_from_context(cx: &Context) -> Option<&MetadataMap> {
    cx.get::<IncomingMetadata>().map(|incoming| &incoming.0)
}

/// 由 tonic 请求构建调用的执行上下文
///
/// 如果请求扩展中已经放入了 `Context`（例如由外层中间件放入），以它为基础；
/// 否则从空上下文开始
pub fn context_from_request<T>(request: &tonic::Request<T>) -> Context {
    let base = request
        .extensions()
        .get::<Context>()
        .cloned()
        .unwrap_or_else(Context::new);
    context_with_metadata(&base, request.metadata().clone())
}
