use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{
    HandlerResult, PendingQueue, PendingRequest, RequestHandler, ResultHandler,
    SharedRequestHandler, invoke_result_handler_later,
};
use crate::event_loop::EventLoop;

/// 惰性初始化装饰器：首个请求触发 `init`，得到真正的处理器后转发所有请求。
///
/// # 契约说明（What）
/// - 初始化期间到达的请求排队，初始化完成后按到达顺序转发；
/// - 初始化失败时把同一错误交付给所有排队请求，并回到未初始化状态，下一个请求重新初始化；
/// - 首个请求的超时同时作为初始化请求的超时。
pub struct LazyInitRequestHandler<Req, Res> {
    inner: Arc<Inner<Req, Res>>,
}

struct Inner<Req, Res> {
    evloop: Arc<dyn EventLoop>,
    init: SharedRequestHandler<(), SharedRequestHandler<Req, Res>>,
    state: Mutex<State<Req, Res>>,
}

enum State<Req, Res> {
    Uninitialized,
    Initializing(PendingQueue<Req, Res>),
    Ready(SharedRequestHandler<Req, Res>),
}

impl<Req, Res> Inner<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn on_initialized(&self, result: HandlerResult<SharedRequestHandler<Req, Res>>) {
        let waiting = {
            let mut state = self.state.lock();
            let waiting = match mem::replace(&mut *state, State::Uninitialized) {
                State::Initializing(waiting) => waiting,
                other => {
                    *state = other;
                    PendingQueue::new()
                }
            };
            if let Ok(handler) = &result {
                *state = State::Ready(Arc::clone(handler));
            }
            waiting
        };

        match result {
            Ok(handler) => {
                for pending in waiting {
                    pending.forward_to(handler.as_ref());
                }
            }
            Err(error) => {
                for pending in waiting {
                    invoke_result_handler_later(
                        self.evloop.as_ref(),
                        pending.res_handler,
                        Err(error.clone()),
                    );
                }
            }
        }
    }
}

impl<Req, Res> RequestHandler<Req, Res> for LazyInitRequestHandler<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    fn handle_request(&self, request: Req, timeout: Duration, res_handler: ResultHandler<Res>) {
        let mut state = self.inner.state.lock();
        match &mut *state {
            State::Ready(handler) => {
                let handler = Arc::clone(handler);
                drop(state);
                handler.handle_request(request, timeout, res_handler);
            }
            State::Initializing(waiting) => {
                waiting.push_back(PendingRequest::new(request, timeout, res_handler));
            }
            State::Uninitialized => {
                let mut waiting = PendingQueue::new();
                waiting.push_back(PendingRequest::new(request, timeout, res_handler));
                *state = State::Initializing(waiting);
                drop(state);

                let inner = Arc::clone(&self.inner);
                self.inner.init.handle_request(
                    (),
                    timeout,
                    Box::new(move |result| inner.on_initialized(result)),
                );
            }
        }
    }
}

pub fn make_lazy_init_request_handler<Req, Res>(
    evloop: Arc<dyn EventLoop>,
    init: SharedRequestHandler<(), SharedRequestHandler<Req, Res>>,
) -> SharedRequestHandler<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    Arc::new(LazyInitRequestHandler {
        inner: Arc::new(Inner {
            evloop,
            init,
            state: Mutex::new(State::Uninitialized),
        }),
    })
}
