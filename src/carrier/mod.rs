//! 元数据载体适配
//!
//! 把 gRPC 的 `MetadataMap` 暴露为 OpenTelemetry 传播器使用的文本载体，
//! 传播器无需了解 tonic 的元数据类型即可完成上下文的提取与注入

use opentelemetry::Context;
use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, KeyAndValueRef, KeyRef, MetadataMap};

/// 只读载体，用于提取
pub struct MetadataReader<'a>(&'a MetadataMap);

impl<'a> MetadataReader<'a> {
    pub fn new(metadata: &'a MetadataMap) -> Self {
        Self(metadata)
    }

    /// 逐一产出存储的 (key, value) 对
    ///
    /// 二进制 (`-bin`) 条目以及无法表示为字符串的值会被跳过
    pub fn pairs(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.0.iter().filter_map(|entry| match entry {
            KeyAndValueRef::Ascii(key, value) => {
                value.to_str().ok().map(|value| (key.as_str(), value))
            }
            KeyAndValueRef::Binary(..) => None,
        })
    }

    /// 某个 key 下按顺序存储的全部值
    pub fn values(&self, key: &str) -> Vec<&'a str> {
        self.0
            .get_all(key)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }
}

impl Extractor for MetadataReader<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .filter_map(|key| match key {
                KeyRef::Ascii(key) => Some(key.as_str()),
                KeyRef::Binary(_) => None,
            })
            .collect()
    }
}

/// 可写载体，用于注入
pub struct MetadataWriter<'a>(&'a mut MetadataMap);

impl<'a> MetadataWriter<'a> {
    pub fn new(metadata: &'a mut MetadataMap) -> Self {
        Self(metadata)
    }
}

impl Injector for MetadataWriter<'_> {
    /// 将 value 追加到 key 的值列表末尾
    fn set(&mut self, key: &str, value: String) {
        let Ok(key) = AsciiMetadataKey::from_bytes(key.as_bytes()) else {
            return;
        };
        if let Ok(value) = AsciiMetadataValue::try_from(value.as_str()) {
            self.0.append(key, value);
        }
    }
}

/// 把 `cx` 中的 span 上下文写入出站元数据
pub fn inject_span_context(
    cx: &Context,
    propagator: &dyn TextMapPropagator,
    metadata: &mut MetadataMap,
) {
    propagator.inject_context(cx, &mut MetadataWriter::new(metadata));
}
