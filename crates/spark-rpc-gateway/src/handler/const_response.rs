use std::sync::Arc;
use std::time::Duration;

use super::{
    HandlerResult, RequestHandler, ResultHandler, SharedRequestHandler, invoke_result_handler_later,
};
use crate::error::GatewayError;
use crate::event_loop::EventLoop;

/// 对任何请求都异步返回同一结果的处理器，请求本身被丢弃。
pub struct ConstResponseRequestHandler<Res> {
    evloop: Arc<dyn EventLoop>,
    respond: Box<dyn Fn() -> HandlerResult<Res> + Send + Sync>,
}

impl<Req, Res> RequestHandler<Req, Res> for ConstResponseRequestHandler<Res>
where
    Res: Send + 'static,
{
    fn handle_request(&self, _request: Req, _timeout: Duration, res_handler: ResultHandler<Res>) {
        invoke_result_handler_later(self.evloop.as_ref(), res_handler, (self.respond)());
    }
}

/// 常量结果处理器，结果按需克隆。
pub fn make_const_response_request_handler<Req, Res>(
    evloop: Arc<dyn EventLoop>,
    response: HandlerResult<Res>,
) -> SharedRequestHandler<Req, Res>
where
    Req: 'static,
    Res: Clone + Send + Sync + 'static,
{
    Arc::new(ConstResponseRequestHandler {
        evloop,
        respond: Box::new(move || response.clone()),
    })
}

/// 常量错误处理器，不要求响应类型可克隆。
pub fn make_const_error_request_handler<Req, Res>(
    evloop: Arc<dyn EventLoop>,
    error: GatewayError,
) -> SharedRequestHandler<Req, Res>
where
    Req: 'static,
    Res: Send + 'static,
{
    Arc::new(ConstResponseRequestHandler {
        evloop,
        respond: Box::new(move || Err(error.clone())),
    })
}
