//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 网关向调用方交付的每一个失败都归入 [`ErrorKind`] 中的一类，结果处理器只需按类别分支；
//! - 构造期失败（调度线程无法启动、配置解析失败）与调用期失败分离，前者走 [`BuildError`]，
//!   不会进入任何结果处理器。
//!
//! ## 契约（What）
//! - [`GatewayError`] 实现 `Clone + Eq`，可被常量响应处理器反复投递；
//! - `end-of-stream` 不是故障，而是流读取的终止哨兵，只能通过 [`is_end_of_stream`] 判定。

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// 网关对外暴露的通用错误类别。
///
/// 前三个变体由网关自身产生，其余变体由 [`crate::status::error_from_status`] 从传输层状态映射而来。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 完成队列已关闭：关停信号发出之后仍有提交，或在途操作被关停打断。
    QueueClosed,
    /// 流工厂持有的网关弱引用已无法升级。
    GatewayDestroyed,
    /// 服务端流自然结束且终态状态为 OK。
    EndOfStream,
    /// 远端或本端取消。
    Canceled,
    /// 请求参数或前置条件不满足。
    InvalidArgument,
    /// 超过截止时间。
    TimedOut,
    /// 未认证或无权限。
    PermissionDenied,
    /// 远端未实现该方法。
    NotSupported,
    /// 其余全部传输失败的兜底类别。
    Io,
}

impl ErrorKind {
    /// 返回稳定错误码，遵循 `<域>.<语义>` 命名。
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::QueueClosed => "gateway.queue_closed",
            ErrorKind::GatewayDestroyed => "gateway.destroyed",
            ErrorKind::EndOfStream => "gateway.end_of_stream",
            ErrorKind::Canceled => "rpc.canceled",
            ErrorKind::InvalidArgument => "rpc.invalid_argument",
            ErrorKind::TimedOut => "rpc.timed_out",
            ErrorKind::PermissionDenied => "rpc.permission_denied",
            ErrorKind::NotSupported => "rpc.not_supported",
            ErrorKind::Io => "rpc.io",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            ErrorKind::QueueClosed => "completion queue is closed",
            ErrorKind::GatewayDestroyed => "gateway has been destroyed",
            ErrorKind::EndOfStream => "end of stream",
            ErrorKind::Canceled => "operation canceled",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::TimedOut => "deadline exceeded",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::NotSupported => "operation not supported",
            ErrorKind::Io => "transport I/O error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// 交付给结果处理器的错误值。
///
/// # 契约说明（What）
/// - `kind` 决定处置分支；`message` 仅供排障，来自传输层状态描述或默认文案；
/// - 相等性比较包含 `message`，断言类别时请使用 [`GatewayError::kind`]。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("[{}] {message}", .kind.code())]
pub struct GatewayError {
    kind: ErrorKind,
    message: Cow<'static, str>,
}

impl GatewayError {
    /// 以自定义描述构造错误。
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 完成队列已关闭。
    pub fn queue_closed() -> Self {
        ErrorKind::QueueClosed.into()
    }

    /// 网关已销毁。
    pub fn gateway_destroyed() -> Self {
        ErrorKind::GatewayDestroyed.into()
    }

    /// 流结束哨兵，仅由流读取的 finish 步骤产生。
    pub(crate) fn end_of_stream() -> Self {
        ErrorKind::EndOfStream.into()
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorKind> for GatewayError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, kind.default_message())
    }
}

/// 判断错误是否为流结束哨兵。
///
/// 读取循环应以此作为正常退出条件，而非比较状态码。
pub fn is_end_of_stream(error: &GatewayError) -> bool {
    error.kind == ErrorKind::EndOfStream
}

/// 网关构造阶段的错误。
#[derive(Debug, Error)]
pub enum BuildError {
    /// 完成队列调度线程无法启动。
    #[error("failed to spawn completion dispatcher thread `{thread_name}`: {source}")]
    SpawnDispatcher {
        thread_name: String,
        source: std::io::Error,
    },
    /// 网关配置无法解析。
    #[error("invalid gateway configuration: {source}")]
    Config {
        #[from]
        source: toml::de::Error,
    },
}
