//! 服务端流适配器。
//!
//! # 契约说明（What）
//! - 打开流得到一个 `() -> Res` 的读取处理器，外层包裹单飞装饰器，同一时刻至多一次读取在途；
//! - 读取成功交付消息；自然结束时请求终态状态，OK 交付 `end-of-stream`，否则交付映射后的错误；
//! - 终态之后读取器进入已结束状态，后续每次读取都异步交付 `end-of-stream`；
//! - 任何阶段只要完成队列已关闭，一律交付 `queue-closed`，不再尝试请求终态。
//!
//! 读取不单独设置超时，整条流共享打开时生成的截止时间。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::contract::{Deadline, RpcContext};
use crate::dispatcher::QueueHandle;
use crate::error::{ErrorKind, GatewayError};
use crate::event_loop::EventLoop;
use crate::handler::{
    RequestHandler, ResultHandler, SharedRequestHandler, invoke_result_handler_later,
    make_noconcurrent_request_handler,
};
use crate::status::{Status, error_from_status};
use crate::tag::TagContinuation;
use crate::transport::{Channel, CompletionQueue, CompletionSlot, StreamMethod, StreamReader};

/// 一条流的在途状态：`reader == None` 即已结束。
struct ReaderContext<Res> {
    rpc: RpcContext,
    reader: Mutex<Option<Box<dyn StreamReader<Res>>>>,
}

impl<Res> ReaderContext<Res> {
    fn new(timeout: Duration) -> Self {
        Self {
            rpc: RpcContext::new(Deadline::from_timeout(timeout)),
            reader: Mutex::new(None),
        }
    }

    fn is_finished(&self) -> bool {
        self.reader.lock().is_none()
    }
}

/// 请求终态状态并把结论交给 `on_done`。
///
/// 终态完成后读取器被释放；状态 OK 对应 `end-of-stream`，终态缺失对应 `queue-closed`。
fn finish_stream_reading<Res, Q>(
    evloop: &Arc<dyn EventLoop>,
    queue: &QueueHandle<Q>,
    ctx: Arc<ReaderContext<Res>>,
    on_done: impl FnOnce(GatewayError) + Send + 'static,
) where
    Res: Send + 'static,
    Q: CompletionQueue,
{
    let status: CompletionSlot<Status> = CompletionSlot::new();
    let continuation = {
        let ctx = Arc::clone(&ctx);
        let status = status.clone();
        TagContinuation::completion(move |_ok| {
            ctx.reader.lock().take();
            let error = match status.take() {
                Some(status) if status.is_ok() => GatewayError::end_of_stream(),
                Some(status) => error_from_status(&status),
                None => GatewayError::queue_closed(),
            };
            on_done(error);
        })
    };
    queue.submit(evloop.as_ref(), continuation, |_queue, tag| {
        let mut reader = ctx.reader.lock();
        match reader.as_mut() {
            Some(reader) => reader.finish(status, tag),
            None => {
                // 读取器已释放，流早已结束
                status.fill(Status::ok());
                queue.withdraw(evloop.as_ref(), tag);
            }
        }
    });
}

/// 已打开流上的单次读取处理器。
struct StreamReadAdapter<Res, Q> {
    evloop: Arc<dyn EventLoop>,
    queue: Arc<QueueHandle<Q>>,
    ctx: Arc<ReaderContext<Res>>,
}

impl<Res, Q> RequestHandler<(), Res> for StreamReadAdapter<Res, Q>
where
    Res: Send + 'static,
    Q: CompletionQueue,
{
    fn handle_request(&self, _request: (), _timeout: Duration, res_handler: ResultHandler<Res>) {
        if self.queue.is_closed() {
            debug!("completion queue closed, stream read rejected");
            invoke_result_handler_later(
                self.evloop.as_ref(),
                res_handler,
                Err(GatewayError::queue_closed()),
            );
            return;
        }
        if self.ctx.is_finished() {
            invoke_result_handler_later(
                self.evloop.as_ref(),
                res_handler,
                Err(GatewayError::end_of_stream()),
            );
            return;
        }

        let message = CompletionSlot::new();
        let continuation = {
            let evloop = Arc::clone(&self.evloop);
            let queue = Arc::clone(&self.queue);
            let ctx = Arc::clone(&self.ctx);
            let message = message.clone();
            TagContinuation::completion(move |ok| {
                if ok {
                    let result = message.take().ok_or_else(|| {
                        GatewayError::new(
                            ErrorKind::Io,
                            "transport reported a read without a message",
                        )
                    });
                    res_handler(result);
                } else if queue.is_closed() {
                    res_handler(Err(GatewayError::queue_closed()));
                } else {
                    finish_stream_reading(&evloop, &queue, ctx, move |error| {
                        res_handler(Err(error))
                    });
                }
            })
        };
        self.queue
            .submit(self.evloop.as_ref(), continuation, |_queue, tag| {
                let mut reader = self.ctx.reader.lock();
                match reader.as_mut() {
                    Some(reader) => reader.read(message, tag),
                    None => self.queue.withdraw(self.evloop.as_ref(), tag),
                }
            });
    }
}

/// 把 [`StreamMethod`] 暴露为“打开流”处理器，成功时交付读取处理器。
pub(crate) struct OpenReadStreamHandler<C: Channel, M> {
    pub(crate) evloop: Arc<dyn EventLoop>,
    pub(crate) channel: Arc<C>,
    pub(crate) queue: Arc<QueueHandle<C::Queue>>,
    pub(crate) method: Arc<M>,
}

impl<C, M> RequestHandler<M::Request, SharedRequestHandler<(), M::Response>>
    for OpenReadStreamHandler<C, M>
where
    C: Channel,
    M: StreamMethod<C>,
{
    fn handle_request(
        &self,
        request: M::Request,
        timeout: Duration,
        res_handler: ResultHandler<SharedRequestHandler<(), M::Response>>,
    ) {
        if self.queue.is_closed() {
            debug!("completion queue closed, stream open rejected");
            invoke_result_handler_later(
                self.evloop.as_ref(),
                res_handler,
                Err(GatewayError::queue_closed()),
            );
            return;
        }

        let ctx = Arc::new(ReaderContext::new(timeout));
        let continuation = {
            let evloop = Arc::clone(&self.evloop);
            let queue = Arc::clone(&self.queue);
            let ctx = Arc::clone(&ctx);
            TagContinuation::completion(move |ok| {
                if ok {
                    let adapter: SharedRequestHandler<(), M::Response> =
                        Arc::new(StreamReadAdapter {
                            evloop: Arc::clone(&evloop),
                            queue,
                            ctx,
                        });
                    res_handler(Ok(make_noconcurrent_request_handler(evloop, adapter)));
                } else if queue.is_closed() {
                    res_handler(Err(GatewayError::queue_closed()));
                } else {
                    finish_stream_reading(&evloop, &queue, ctx, move |error| {
                        res_handler(Err(error))
                    });
                }
            })
        };
        self.queue
            .submit(self.evloop.as_ref(), continuation, |queue, tag| {
                // 持锁打开，续延读到的一定是已就位的读取器
                let method = &self.method;
                let mut reader = ctx.reader.lock();
                *reader = Some(method.open(&self.channel, &ctx.rpc, request, queue, tag));
            });
    }
}
