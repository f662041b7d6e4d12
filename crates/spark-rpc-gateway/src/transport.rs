//! 完成队列驱动的 RPC 客户端传输契约。
//!
//! # 契约说明（What）
//! - 每个异步操作在提交时携带一个 [`Tag`]；操作完成后，传输层先写好对应的
//!   [`CompletionSlot`]，再把 `(tag, ok)` 投递到提交时给定的 [`CompletionQueue`]；
//! - [`CompletionQueue::shutdown`] 之后，队列应以 `ok = false` 冲刷尚未完成的操作，
//!   最终让 [`CompletionQueue::next`] 返回 [`QueueEvent::Shutdown`]；
//! - 网关保证：队列槽位被清空之后不再发起新的提交。

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::contract::RpcContext;
use crate::status::Status;
use crate::tag::Tag;

/// [`CompletionQueue::next`] 的返回值。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueEvent {
    /// 一个操作完成。`tag == None` 表示虚假唤醒。
    Completion { tag: Option<Tag>, ok: bool },
    /// 队列已关闭且排空，不会再有事件。
    Shutdown,
}

/// 完成队列。
pub trait CompletionQueue: Send + Sync + 'static {
    /// 阻塞直到下一个事件。
    fn next(&self) -> QueueEvent;

    /// 请求关闭。幂等。
    fn shutdown(&self);
}

/// 到远端的逻辑通道，负责创建与之配套的完成队列。
pub trait Channel: Send + Sync + 'static {
    type Queue: CompletionQueue;

    fn create_completion_queue(&self) -> Self::Queue;
}

/// 一元 RPC 方法描述，通常由生成的客户端桩实现。
pub trait UnaryMethod<C: Channel>: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// 发起调用，返回尚未请求终态的调用句柄。
    fn start(
        &self,
        channel: &C,
        rpc: &RpcContext,
        request: Self::Request,
        queue: &C::Queue,
    ) -> Box<dyn UnaryCall<Self::Response>>;
}

/// 在途的一元调用。
pub trait UnaryCall<Res>: Send {
    /// 请求终态：完成时填写 `response`（仅当状态为 OK）与 `status`，然后投递 `tag`。
    fn finish(
        self: Box<Self>,
        response: CompletionSlot<Res>,
        status: CompletionSlot<Status>,
        tag: Tag,
    );
}

/// 服务端流 RPC 方法描述。
pub trait StreamMethod<C: Channel>: Send + Sync + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    /// 打开流；流就绪（或打开失败）时投递 `tag`。
    fn open(
        &self,
        channel: &C,
        rpc: &RpcContext,
        request: Self::Request,
        queue: &C::Queue,
        tag: Tag,
    ) -> Box<dyn StreamReader<Self::Response>>;
}

/// 已打开的服务端流读取器，不允许并发使用。
pub trait StreamReader<Res>: Send {
    /// 读取下一条消息：`ok = true` 时 `message` 已填写，`ok = false` 表示流已结束。
    fn read(&mut self, message: CompletionSlot<Res>, tag: Tag);

    /// 请求终态状态，完成时填写 `status` 后投递 `tag`。
    fn finish(&mut self, status: CompletionSlot<Status>, tag: Tag);
}

/// 传输层写入、续延读取的共享输出单元。
pub struct CompletionSlot<T> {
    cell: Arc<Mutex<Option<T>>>,
}

impl<T> CompletionSlot<T> {
    pub fn new() -> Self {
        Self {
            cell: Arc::new(Mutex::new(None)),
        }
    }

    /// 写入结果，覆盖旧值。
    pub fn fill(&self, value: T) {
        *self.cell.lock() = Some(value);
    }

    pub fn take(&self) -> Option<T> {
        self.cell.lock().take()
    }

    pub fn is_filled(&self) -> bool {
        self.cell.lock().is_some()
    }
}

impl<T> Clone for CompletionSlot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Default for CompletionSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSlot")
            .field("filled", &self.is_filled())
            .finish()
    }
}
