use crate::error::{ConfigError, Result};
use crate::options::{ServerOption, including_spans, log_errors, log_payloads};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 追踪拦截器的文件配置
///
/// ```toml
/// log_payloads = true
/// log_errors = true
/// excluded_methods = ["/grpc.health.v1.Health/Check"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TracingConfig {
    #[serde(default)]
    pub log_payloads: bool,
    #[serde(default = "default_log_errors")]
    pub log_errors: bool,
    /// 这些完整方法名的调用不创建 span
    #[serde(default)]
    pub excluded_methods: Vec<String>,
}

fn default_log_errors() -> bool {
    true
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_payloads: false,
            log_errors: default_log_errors(),
            excluded_methods: Vec::new(),
        }
    }
}

impl TracingConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 转换为拦截器选项
    ///
    /// 配置了 `excluded_methods` 时会设置追踪谓词；之后再传入的
    /// `including_spans` 会覆盖它
    pub fn options(&self) -> Vec<ServerOption> {
        let mut opts = vec![log_errors(self.log_errors)];
        if self.log_payloads {
            opts.push(log_payloads());
        }
        if !self.excluded_methods.is_empty() {
            let excluded = self.excluded_methods.clone();
            opts.push(including_spans(move |_, method, _, _| {
                !excluded.iter().any(|m| m == method)
            }));
        }
        opts
    }
}
