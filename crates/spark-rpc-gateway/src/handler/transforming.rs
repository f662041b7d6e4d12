use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use super::{
    HandlerResult, RequestHandler, ResultHandler, SharedRequestHandler, invoke_result_handler_later,
};
use crate::event_loop::EventLoop;

/// 请求变换装饰器：把外层请求映射为底层处理器的请求。
///
/// 变换失败时不触达底层处理器，错误经事件循环异步交付。
pub struct TransformingRequestHandler<Req, BaseReq, Res, F> {
    evloop: Arc<dyn EventLoop>,
    base: SharedRequestHandler<BaseReq, Res>,
    transform: F,
    _marker: PhantomData<fn(Req)>,
}

impl<Req, BaseReq, Res, F> RequestHandler<Req, Res>
    for TransformingRequestHandler<Req, BaseReq, Res, F>
where
    Res: Send + 'static,
    F: Fn(Req) -> HandlerResult<BaseReq> + Send + Sync,
{
    fn handle_request(&self, request: Req, timeout: Duration, res_handler: ResultHandler<Res>) {
        match (self.transform)(request) {
            Ok(base_request) => self.base.handle_request(base_request, timeout, res_handler),
            Err(error) => {
                invoke_result_handler_later(self.evloop.as_ref(), res_handler, Err(error))
            }
        }
    }
}

pub fn make_transforming_request_handler<Req, BaseReq, Res, F>(
    evloop: Arc<dyn EventLoop>,
    base: SharedRequestHandler<BaseReq, Res>,
    transform: F,
) -> SharedRequestHandler<Req, Res>
where
    Req: 'static,
    BaseReq: 'static,
    Res: Send + 'static,
    F: Fn(Req) -> HandlerResult<BaseReq> + Send + Sync + 'static,
{
    Arc::new(TransformingRequestHandler {
        evloop,
        base,
        transform,
        _marker: PhantomData,
    })
}
