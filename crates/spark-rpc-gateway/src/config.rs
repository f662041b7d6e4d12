//! 网关构造参数。
//!
//! # 契约说明（What）
//! - 所有字段都有默认值，空文档即等价于 [`GatewayConfig::default`]；
//! - 未知字段被拒绝，拼写错误在构造阶段暴露为 [`BuildError::Config`]。

use serde::Deserialize;

use crate::error::BuildError;

/// 调度线程的默认名称。
pub const DEFAULT_DISPATCHER_THREAD_NAME: &str = "spark-cq-dispatcher";

/// 网关配置。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// 完成队列调度线程的名称。
    pub dispatcher_thread_name: String,
    /// 调度线程栈大小（字节）；`None` 沿用标准库默认值。
    pub dispatcher_stack_size: Option<usize>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            dispatcher_thread_name: DEFAULT_DISPATCHER_THREAD_NAME.to_owned(),
            dispatcher_stack_size: None,
        }
    }
}

impl GatewayConfig {
    /// 从 TOML 文本解析配置。
    pub fn from_toml_str(source: &str) -> Result<Self, BuildError> {
        Ok(toml::from_str(source)?)
    }
}
