//! 父 SpanContext 提取

use crate::carrier::MetadataReader;
use crate::context::metadata_from_context;
use crate::error::ExtractError;
use opentelemetry::Context;
use opentelemetry::baggage::{Baggage, BaggageExt};
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::{SpanContext, TraceContextExt};
use tonic::metadata::MetadataMap;

/// 入站元数据的解码结果
#[derive(Debug, Clone)]
pub struct Extraction {
    /// 传播器解码出的上下文，除远程 span 外还带有 baggage 等其它字段
    pub decoded: Context,
    pub parent: Result<SpanContext, ExtractError>,
}

/// 用传播器解码调用上下文中的入站元数据
///
/// 上下文中没有元数据时按空元数据处理。解码以空上下文为基础，
/// 线程当前的上下文不会混入结果
pub fn extract(cx: &Context, propagator: &dyn TextMapPropagator) -> Extraction {
    let empty = MetadataMap::new();
    let metadata = metadata_from_context(cx).unwrap_or(&empty);

    let decoded = propagator.extract_with_context(&Context::new(), &MetadataReader::new(metadata));
    let span_context = decoded.span().span_context().clone();
    let parent = if span_context.is_valid() {
        Ok(span_context)
    } else {
        Err(classify_missing(metadata, propagator))
    };
    Extraction { decoded, parent }
}

/// 从调用上下文的入站元数据中解码父 SpanContext
///
/// 返回 [`ExtractError::NotFound`] 表示这是一条新链路的根调用，并不是故障
pub fn extract_span_context(
    cx: &Context,
    propagator: &dyn TextMapPropagator,
) -> Result<SpanContext, ExtractError> {
    extract(cx, propagator).parent
}

/// 把解码出的 baggage 合并进 `cx`，同名条目以入站元数据为准
pub fn with_incoming_baggage(cx: &Context, decoded: &Context) -> Context {
    let incoming = decoded.baggage();
    if incoming.is_empty() {
        return cx.clone();
    }
    let merged: Baggage = cx
        .baggage()
        .iter()
        .chain(incoming.iter())
        .map(|(key, (value, metadata))| (key.clone(), (value.clone(), metadata.clone())))
        .collect();
    cx.with_baggage(merged)
}

/// 字段存在但值无法解码（包括非可见 ASCII 的值）时视为 Malformed
fn classify_missing(metadata: &MetadataMap, propagator: &dyn TextMapPropagator) -> ExtractError {
    let present: Vec<&str> = propagator
        .fields()
        .filter(|field| metadata.contains_key(*field))
        .collect();
    if present.is_empty() {
        ExtractError::NotFound
    } else {
        ExtractError::Malformed {
            fields: present.join(","),
        }
    }
}
