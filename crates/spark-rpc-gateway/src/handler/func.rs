use std::sync::Arc;
use std::time::Duration;

use super::{RequestHandler, ResultHandler, SharedRequestHandler};

/// 以闭包实现的请求处理器。
///
/// 闭包自身负责遵守“不同步回调”的契约。
pub struct FuncRequestHandler<F> {
    func: F,
}

impl<Req, Res, F> RequestHandler<Req, Res> for FuncRequestHandler<F>
where
    F: Fn(Req, Duration, ResultHandler<Res>) + Send + Sync,
{
    fn handle_request(&self, request: Req, timeout: Duration, res_handler: ResultHandler<Res>) {
        (self.func)(request, timeout, res_handler);
    }
}

pub fn make_func_request_handler<Req, Res, F>(func: F) -> SharedRequestHandler<Req, Res>
where
    Req: 'static,
    Res: 'static,
    F: Fn(Req, Duration, ResultHandler<Res>) + Send + Sync + 'static,
{
    Arc::new(FuncRequestHandler { func })
}
