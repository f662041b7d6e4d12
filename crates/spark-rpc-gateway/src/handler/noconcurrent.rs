use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{PendingQueue, PendingRequest, RequestHandler, ResultHandler, SharedRequestHandler};
use crate::event_loop::EventLoop;

/// 单飞装饰器：同一时刻最多一个请求在底层处理器中执行。
///
/// # 契约说明（What）
/// - 忙碌期间到达的请求按 FIFO 排队，前一个结果交付之后才转发下一个；
/// - 排队请求的超时扣除排队耗时；
/// - 下一个请求经事件循环转发，避免在结果处理器的调用栈里递归进入底层处理器。
pub struct NoConcurrentRequestHandler<Req, Res> {
    inner: Arc<Inner<Req, Res>>,
}

struct Inner<Req, Res> {
    evloop: Arc<dyn EventLoop>,
    base: SharedRequestHandler<Req, Res>,
    state: Mutex<State<Req, Res>>,
}

struct State<Req, Res> {
    busy: bool,
    waiting: PendingQueue<Req, Res>,
}

impl<Req, Res> Inner<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn dispatch(
        self: &Arc<Self>,
        request: Req,
        timeout: Duration,
        res_handler: ResultHandler<Res>,
    ) {
        let inner = Arc::clone(self);
        self.base.handle_request(
            request,
            timeout,
            Box::new(move |result| {
                res_handler(result);
                inner.release();
            }),
        );
    }

    fn release(self: Arc<Self>) {
        let next = {
            let mut state = self.state.lock();
            let next = state.waiting.pop_front();
            if next.is_none() {
                state.busy = false;
            }
            next
        };
        if let Some(pending) = next {
            let inner = Arc::clone(&self);
            self.evloop.invoke_later(Box::new(move || {
                let timeout = pending.remaining_timeout();
                inner.dispatch(pending.request, timeout, pending.res_handler);
            }));
        }
    }
}

impl<Req, Res> RequestHandler<Req, Res> for NoConcurrentRequestHandler<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn handle_request(&self, request: Req, timeout: Duration, res_handler: ResultHandler<Res>) {
        {
            let mut state = self.inner.state.lock();
            if state.busy {
                state
                    .waiting
                    .push_back(PendingRequest::new(request, timeout, res_handler));
                return;
            }
            state.busy = true;
        }
        self.inner.dispatch(request, timeout, res_handler);
    }
}

pub fn make_noconcurrent_request_handler<Req, Res>(
    evloop: Arc<dyn EventLoop>,
    base: SharedRequestHandler<Req, Res>,
) -> SharedRequestHandler<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    Arc::new(NoConcurrentRequestHandler {
        inner: Arc::new(Inner {
            evloop,
            base,
            state: Mutex::new(State {
                busy: false,
                waiting: PendingQueue::new(),
            }),
        }),
    })
}
