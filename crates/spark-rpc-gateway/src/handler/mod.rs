//! 请求处理器契约与通用装饰器。
//!
//! # 契约说明（What）
//! - [`RequestHandler::handle_request`] 必须立即返回，结果稍后通过 `res_handler` 交付；
//! - `res_handler` 恰好被调用一次，且绝不在 `handle_request` 的调用栈内同步触发；
//! - 装饰器（单飞、惰性初始化、常量响应、请求变换）只依赖上述契约，可任意叠加。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::GatewayError;
use crate::event_loop::EventLoop;

mod const_response;
mod func;
mod lazy_init;
mod noconcurrent;
mod transforming;

pub use const_response::{
    ConstResponseRequestHandler, make_const_error_request_handler,
    make_const_response_request_handler,
};
pub use func::{FuncRequestHandler, make_func_request_handler};
pub use lazy_init::{LazyInitRequestHandler, make_lazy_init_request_handler};
pub use noconcurrent::{NoConcurrentRequestHandler, make_noconcurrent_request_handler};
pub use transforming::{TransformingRequestHandler, make_transforming_request_handler};

/// 处理结果：成功值或 [`GatewayError`]。
pub type HandlerResult<T> = Result<T, GatewayError>;

/// 一次性结果处理器。
pub type ResultHandler<T> = Box<dyn FnOnce(HandlerResult<T>) + Send + 'static>;

/// 共享的请求处理器句柄。
pub type SharedRequestHandler<Req, Res> = Arc<dyn RequestHandler<Req, Res>>;

/// 异步请求处理器。
pub trait RequestHandler<Req, Res>: Send + Sync {
    /// 提交请求；`timeout` 为调用方允许的最长等待时长。
    fn handle_request(&self, request: Req, timeout: Duration, res_handler: ResultHandler<Res>);
}

/// 把结果处理器推迟到事件循环上执行，保证“从不同步回调”。
pub fn invoke_result_handler_later<T>(
    evloop: &dyn EventLoop,
    res_handler: ResultHandler<T>,
    result: HandlerResult<T>,
) where
    T: Send + 'static,
{
    evloop.invoke_later(Box::new(move || res_handler(result)));
}

/// 排队等待转发的请求，记录入队时刻以便扣减等待耗时。
pub(crate) struct PendingRequest<Req, Res> {
    pub(crate) request: Req,
    timeout: Duration,
    enqueued_at: Instant,
    pub(crate) res_handler: ResultHandler<Res>,
}

impl<Req, Res> PendingRequest<Req, Res> {
    pub(crate) fn new(request: Req, timeout: Duration, res_handler: ResultHandler<Res>) -> Self {
        Self {
            request,
            timeout,
            enqueued_at: Instant::now(),
            res_handler,
        }
    }

    /// 原始超时减去排队耗时，最小为零。
    pub(crate) fn remaining_timeout(&self) -> Duration {
        self.timeout.saturating_sub(self.enqueued_at.elapsed())
    }

    pub(crate) fn forward_to(self, handler: &dyn RequestHandler<Req, Res>) {
        let timeout = self.remaining_timeout();
        handler.handle_request(self.request, timeout, self.res_handler);
    }
}

pub(crate) type PendingQueue<Req, Res> = VecDeque<PendingRequest<Req, Res>>;
