//! 单次 RPC 的取消与截止契约。
//!
//! 传输实现通过 [`RpcContext`] 读取绝对截止时间，并可轮询 [`Cancellation`] 感知调用方已放弃该调用。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

/// 取消原语，多方共享同一原子位。
///
/// # 契约说明（What）
/// - `cancel` 首次成功置位返回 `true`，重复调用返回 `false`；
/// - 取消是协作式的：传输层可以据此尽早终止，但不保证远端停止处理。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 标记取消，返回本次调用是否首次触发。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

/// 绝对截止时间。
///
/// `at == None` 表示可表示范围内的最大截止时间，即“永不过期”。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<SystemTime>,
}

impl Deadline {
    /// 可表示范围内的最大截止时间。
    pub const fn max() -> Self {
        Self { at: None }
    }

    pub const fn at(instant: SystemTime) -> Self {
        Self { at: Some(instant) }
    }

    /// 以 `now + timeout` 生成截止时间，溢出时饱和到 [`Deadline::max`]，绝不回绕到过去。
    pub fn after(now: SystemTime, timeout: Duration) -> Self {
        match now.checked_add(timeout) {
            Some(instant) => Self::at(instant),
            None => Self::max(),
        }
    }

    /// 以当前墙钟时间为起点。
    pub fn from_timeout(timeout: Duration) -> Self {
        Self::after(SystemTime::now(), timeout)
    }

    pub fn instant(&self) -> Option<SystemTime> {
        self.at
    }

    pub fn is_max(&self) -> bool {
        self.at.is_none()
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        match self.at {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }

    /// 距离截止的剩余时长；已过期返回零，最大截止时间返回 `None`。
    pub fn remaining(&self, now: SystemTime) -> Option<Duration> {
        self.at
            .map(|deadline| deadline.duration_since(now).unwrap_or(Duration::ZERO))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::max()
    }
}

/// 单次调用交给传输层的上下文。
///
/// 上下文被释放时自动取消：调用方丢弃整条续延路径即是唯一的取消手段。
#[derive(Debug)]
pub struct RpcContext {
    deadline: Deadline,
    cancellation: Cancellation,
}

impl RpcContext {
    pub fn new(deadline: Deadline) -> Self {
        Self {
            deadline,
            cancellation: Cancellation::new(),
        }
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// 供传输层持有的取消令牌副本。
    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }
}

impl Drop for RpcContext {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}
