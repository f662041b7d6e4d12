//! 测试与示例使用的传输桩集合。
//!
//! # 使用方式（How）
//! - 通过 `use spark_rpc_gateway::test_stubs::memory::*;` 引入内存传输；
//! - 内存传输按脚本完成操作，不涉及网络，也不会产生真实的超时。
//!
//! # 契约说明（What）
//! - 桩实现遵守 [`crate::transport`] 的全部契约：先写结果单元，再投递标签；关闭时冲刷在途操作；
//! - 仅用于测试或示例环境，生产代码不应依赖。

pub mod memory;
