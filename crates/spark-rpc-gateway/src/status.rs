//! 传输层终态状态及其到 [`GatewayError`] 的映射。

use std::borrow::Cow;
use std::fmt;

use crate::error::{ErrorKind, GatewayError};

/// 传输层状态码，数值与常见 RPC 传输的规范编号一致。
///
/// 无法识别的编号保存在 [`StatusCode::Unrecognized`] 中，映射时一律归入 `io-error`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    Unrecognized(i32),
}

impl StatusCode {
    /// 从线上编号解析状态码。
    pub const fn from_i32(value: i32) -> Self {
        match value {
            0 => StatusCode::Ok,
            1 => StatusCode::Cancelled,
            2 => StatusCode::Unknown,
            3 => StatusCode::InvalidArgument,
            4 => StatusCode::DeadlineExceeded,
            5 => StatusCode::NotFound,
            6 => StatusCode::AlreadyExists,
            7 => StatusCode::PermissionDenied,
            8 => StatusCode::ResourceExhausted,
            9 => StatusCode::FailedPrecondition,
            10 => StatusCode::Aborted,
            11 => StatusCode::OutOfRange,
            12 => StatusCode::Unimplemented,
            13 => StatusCode::Internal,
            14 => StatusCode::Unavailable,
            15 => StatusCode::DataLoss,
            16 => StatusCode::Unauthenticated,
            other => StatusCode::Unrecognized(other),
        }
    }

    /// 返回线上编号。
    pub const fn as_i32(self) -> i32 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::Cancelled => 1,
            StatusCode::Unknown => 2,
            StatusCode::InvalidArgument => 3,
            StatusCode::DeadlineExceeded => 4,
            StatusCode::NotFound => 5,
            StatusCode::AlreadyExists => 6,
            StatusCode::PermissionDenied => 7,
            StatusCode::ResourceExhausted => 8,
            StatusCode::FailedPrecondition => 9,
            StatusCode::Aborted => 10,
            StatusCode::OutOfRange => 11,
            StatusCode::Unimplemented => 12,
            StatusCode::Internal => 13,
            StatusCode::Unavailable => 14,
            StatusCode::DataLoss => 15,
            StatusCode::Unauthenticated => 16,
            StatusCode::Unrecognized(other) => other,
        }
    }
}

/// 一次 RPC 的终态状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    code: StatusCode,
    message: Cow<'static, str>,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 成功状态。
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.code, self.code.as_i32())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// 状态码到错误类别的静态映射表。
///
/// 全函数：未列出的状态码（包括 `Ok` 与未来新增编号）均落入 [`ErrorKind::Io`]。
pub const fn error_kind_for(code: StatusCode) -> ErrorKind {
    match code {
        StatusCode::Cancelled => ErrorKind::Canceled,
        StatusCode::InvalidArgument | StatusCode::FailedPrecondition => ErrorKind::InvalidArgument,
        StatusCode::DeadlineExceeded => ErrorKind::TimedOut,
        StatusCode::Unauthenticated | StatusCode::PermissionDenied => ErrorKind::PermissionDenied,
        StatusCode::Unimplemented => ErrorKind::NotSupported,
        StatusCode::NotFound
        | StatusCode::AlreadyExists
        | StatusCode::OutOfRange
        | StatusCode::ResourceExhausted
        | StatusCode::Aborted
        | StatusCode::Internal
        | StatusCode::Unavailable
        | StatusCode::DataLoss => ErrorKind::Io,
        _ => ErrorKind::Io,
    }
}

/// 将非 OK 终态状态翻译为交付给调用方的错误，保留状态描述。
pub fn error_from_status(status: &Status) -> GatewayError {
    let kind = error_kind_for(status.code());
    if status.message().is_empty() {
        kind.into()
    } else {
        GatewayError::new(kind, status.message().to_owned())
    }
}
