//! 一元调用适配器。
//!
//! # 逻辑解析（How）
//! 1. 槽位已清空时不触达传输层，经事件循环异步交付 `queue-closed`；
//! 2. 否则以 `now + timeout` 生成截止时间，登记完成续延后发起调用并请求终态；
//! 3. 完成续延读取终态状态：OK 交付响应，其余经状态映射交付错误；
//!    终态缺失（关停时被冲刷或遗弃）一律视为 `queue-closed`。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::contract::{Deadline, RpcContext};
use crate::dispatcher::QueueHandle;
use crate::error::{ErrorKind, GatewayError};
use crate::event_loop::EventLoop;
use crate::handler::{HandlerResult, RequestHandler, ResultHandler, invoke_result_handler_later};
use crate::status::{Status, error_from_status};
use crate::tag::TagContinuation;
use crate::transport::{Channel, CompletionSlot, UnaryMethod};

/// 单次一元调用的在途状态，存活到完成续延执行完毕。
struct CallContext<Res> {
    rpc: RpcContext,
    response: CompletionSlot<Res>,
    status: CompletionSlot<Status>,
}

impl<Res> CallContext<Res> {
    fn new(timeout: Duration) -> Self {
        Self {
            rpc: RpcContext::new(Deadline::from_timeout(timeout)),
            response: CompletionSlot::new(),
            status: CompletionSlot::new(),
        }
    }

    fn outcome(&self) -> HandlerResult<Res> {
        match self.status.take() {
            Some(status) if status.is_ok() => self.response.take().ok_or_else(|| {
                GatewayError::new(ErrorKind::Io, "transport reported OK without a response")
            }),
            Some(status) => Err(error_from_status(&status)),
            None => Err(GatewayError::queue_closed()),
        }
    }
}

/// 把 [`UnaryMethod`] 暴露为 [`RequestHandler`]。
pub(crate) struct UnaryCallHandler<C: Channel, M> {
    pub(crate) evloop: Arc<dyn EventLoop>,
    pub(crate) channel: Arc<C>,
    pub(crate) queue: Arc<QueueHandle<C::Queue>>,
    pub(crate) method: Arc<M>,
}

impl<C, M> RequestHandler<M::Request, M::Response> for UnaryCallHandler<C, M>
where
    C: Channel,
    M: UnaryMethod<C>,
{
    fn handle_request(
        &self,
        request: M::Request,
        timeout: Duration,
        res_handler: ResultHandler<M::Response>,
    ) {
        if self.queue.is_closed() {
            debug!("completion queue closed, unary call rejected");
            invoke_result_handler_later(
                self.evloop.as_ref(),
                res_handler,
                Err(GatewayError::queue_closed()),
            );
            return;
        }

        let ctx = Arc::new(CallContext::new(timeout));
        let continuation = {
            let ctx = Arc::clone(&ctx);
            TagContinuation::completion(move |_ok| res_handler(ctx.outcome()))
        };
        self.queue
            .submit(self.evloop.as_ref(), continuation, |queue, tag| {
                let call = self.method.start(&self.channel, &ctx.rpc, request, queue);
                call.finish(ctx.response.clone(), ctx.status.clone(), tag);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    #[test]
    fn outcome_prefers_terminal_status() {
        let ctx = CallContext::<u32>::new(Duration::from_secs(1));
        ctx.response.fill(7);
        ctx.status.fill(Status::ok());
        assert_eq!(ctx.outcome(), Ok(7));

        let ctx = CallContext::<u32>::new(Duration::from_secs(1));
        ctx.status
            .fill(Status::new(StatusCode::PermissionDenied, "no token"));
        let err = ctx.outcome().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.message(), "no token");
    }

    #[test]
    fn missing_status_means_queue_closed() {
        let ctx = CallContext::<u32>::new(Duration::from_secs(1));
        ctx.response.fill(7);
        assert_eq!(ctx.outcome().unwrap_err().kind(), ErrorKind::QueueClosed);
    }

    #[test]
    fn ok_without_response_is_io_error() {
        let ctx = CallContext::<u32>::new(Duration::from_secs(1));
        ctx.status.fill(Status::ok());
        assert_eq!(ctx.outcome().unwrap_err().kind(), ErrorKind::Io);
    }
}
