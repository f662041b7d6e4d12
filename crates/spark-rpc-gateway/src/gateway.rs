//! 网关：持有通道、完成队列与调度线程，按方法生成请求处理器。
//!
//! # 契约说明（What）
//! - 一个通道对应一个网关，网关拥有唯一的完成队列与调度线程；
//! - 生成的处理器只持有队列句柄，网关销毁后它们对每个新请求异步交付 `queue-closed`；
//! - 销毁网关会同步关停：清空队列槽位、关闭队列、排空并等待调度线程退出，
//!   所有在途续延都以失败形式恰好执行一次。
//!
//! # 使用示例
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use spark_rpc_gateway::test_stubs::memory::{MemoryChannel, ScriptedUnaryMethod};
//! use spark_rpc_gateway::{QueuedEventLoop, make_gateway};
//!
//! let evloop = QueuedEventLoop::new();
//! let gateway = make_gateway(Arc::new(evloop.clone()), evloop.executor(), MemoryChannel::new())
//!     .expect("gateway");
//! let echo = gateway.make_call_request_handler(ScriptedUnaryMethod::new(|n: u32| Ok(n + 1)));
//!
//! let reply = Arc::new(parking_lot::Mutex::new(None));
//! let sink = Arc::clone(&reply);
//! echo.handle_request(41, Duration::from_secs(5), Box::new(move |res| *sink.lock() = Some(res)));
//! assert!(evloop.run_until(Duration::from_secs(5), || reply.lock().is_some()));
//! assert_eq!(reply.lock().take(), Some(Ok(42)));
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use crate::config::GatewayConfig;
use crate::dispatcher::{DispatcherGuard, QueueHandle, spawn_dispatcher};
use crate::error::{BuildError, GatewayError};
use crate::event_loop::{EventLoop, ResultExecutor};
use crate::handler::{
    HandlerResult, SharedRequestHandler, make_const_error_request_handler,
    make_lazy_init_request_handler, make_transforming_request_handler,
};
use crate::stream::OpenReadStreamHandler;
use crate::tag::TagRegistry;
use crate::transport::{Channel, StreamMethod, UnaryMethod};
use crate::unary::UnaryCallHandler;

/// 完成队列网关。
///
/// 字段按声明顺序析构，调度线程先于通道退出。
pub struct Gateway<C: Channel> {
    _dispatcher: DispatcherGuard<C::Queue>,
    evloop: Arc<dyn EventLoop>,
    channel: Arc<C>,
    queue: Arc<QueueHandle<C::Queue>>,
}

/// 以默认配置构造网关。
///
/// `evloop` 承载所有异步快速失败路径；`executor` 由调度线程调用，负责执行完成续延。
pub fn make_gateway<C: Channel>(
    evloop: Arc<dyn EventLoop>,
    executor: ResultExecutor,
    channel: C,
) -> Result<Arc<Gateway<C>>, BuildError> {
    make_gateway_with_config(evloop, executor, channel, &GatewayConfig::default())
}

/// 以显式配置构造网关。
pub fn make_gateway_with_config<C: Channel>(
    evloop: Arc<dyn EventLoop>,
    executor: ResultExecutor,
    channel: C,
    config: &GatewayConfig,
) -> Result<Arc<Gateway<C>>, BuildError> {
    let completion_queue = Arc::new(channel.create_completion_queue());
    let tags = Arc::new(TagRegistry::new());
    let queue = Arc::new(QueueHandle::new(
        Arc::clone(&completion_queue),
        Arc::clone(&tags),
    ));
    let thread = spawn_dispatcher(config, completion_queue, tags, executor)?;
    Ok(Arc::new(Gateway {
        _dispatcher: DispatcherGuard::new(Arc::clone(&queue), thread),
        evloop,
        channel: Arc::new(channel),
        queue,
    }))
}

impl<C: Channel> Gateway<C> {
    /// 网关持有的通道。
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// 一元方法的请求处理器。
    pub fn make_call_request_handler<M>(
        &self,
        method: M,
    ) -> SharedRequestHandler<M::Request, M::Response>
    where
        M: UnaryMethod<C>,
    {
        Arc::new(UnaryCallHandler {
            evloop: Arc::clone(&self.evloop),
            channel: Arc::clone(&self.channel),
            queue: Arc::clone(&self.queue),
            method: Arc::new(method),
        })
    }

    /// 服务端流方法的“打开流”处理器，成功时交付单飞保护的读取处理器。
    pub fn make_open_read_stream_request_handler<M>(
        &self,
        method: M,
    ) -> SharedRequestHandler<M::Request, SharedRequestHandler<(), M::Response>>
    where
        M: StreamMethod<C>,
    {
        self.open_read_stream_handler(Arc::new(method))
    }

    fn open_read_stream_handler<M>(
        &self,
        method: Arc<M>,
    ) -> SharedRequestHandler<M::Request, SharedRequestHandler<(), M::Response>>
    where
        M: StreamMethod<C>,
    {
        Arc::new(OpenReadStreamHandler {
            evloop: Arc::clone(&self.evloop),
            channel: Arc::clone(&self.channel),
            queue: Arc::clone(&self.queue),
            method,
        })
    }
}

impl<C: Channel> fmt::Debug for Gateway<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("closed", &self.queue.is_closed())
            .finish_non_exhaustive()
    }
}

/// 读取流工厂：每个请求对应一个首次读取时才打开流的读取处理器。
///
/// # 契约说明（What）
/// - 工厂只持有网关的弱引用；调用工厂时网关已销毁，得到的处理器对每次读取交付 `gateway-destroyed`；
/// - 打开失败不会被缓存，下一次读取重新打开流；
/// - 打开成功后的读取沿用同一个读取处理器，直到 `end-of-stream`。
pub fn make_read_stream_factory<C, M>(
    evloop: Arc<dyn EventLoop>,
    gateway: &Arc<Gateway<C>>,
    method: M,
) -> impl Fn(M::Request) -> SharedRequestHandler<(), M::Response> + Send + Sync + 'static
where
    C: Channel,
    M: StreamMethod<C>,
    M::Request: Clone + Sync,
{
    let gateway: Weak<Gateway<C>> = Arc::downgrade(gateway);
    let method = Arc::new(method);
    move |request: M::Request| {
        let Some(gateway) = gateway.upgrade() else {
            return make_const_error_request_handler(
                Arc::clone(&evloop),
                GatewayError::gateway_destroyed(),
            );
        };
        let open = gateway.open_read_stream_handler(Arc::clone(&method));
        drop(gateway);

        let init = make_transforming_request_handler(
            Arc::clone(&evloop),
            open,
            move |()| -> HandlerResult<M::Request> { Ok(request.clone()) },
        );
        make_lazy_init_request_handler(Arc::clone(&evloop), init)
    }
}
