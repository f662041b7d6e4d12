//! 集成测试共用的网关夹具。
//!
//! 每个测试持有一个 [`QueuedEventLoop`]，调度线程把续延投递到同一队列，
//! 测试线程通过 `run_until` 驱动执行，结果收集在 [`Results`] 中。
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use spark_rpc_gateway::test_stubs::memory::MemoryChannel;
use spark_rpc_gateway::{
    EventLoop, Gateway, HandlerResult, QueuedEventLoop, RequestHandler, ResultHandler, make_gateway,
};

/// 等待异步结果的上限；正常路径远小于该值。
pub const WAIT: Duration = Duration::from_secs(5);

/// 按交付顺序收集的结果。
pub struct Results<T> {
    inner: Arc<Mutex<Vec<HandlerResult<T>>>>,
}

impl<T> Clone for Results<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Results<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handler(&self) -> ResultHandler<T> {
        let inner = Arc::clone(&self.inner);
        Box::new(move |result| inner.lock().push(result))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn take(&self) -> Vec<HandlerResult<T>> {
        std::mem::take(&mut *self.inner.lock())
    }
}

pub struct Harness {
    pub evloop: QueuedEventLoop,
    pub channel: MemoryChannel,
    pub gateway: Arc<Gateway<MemoryChannel>>,
}

impl Harness {
    pub fn new() -> Self {
        let evloop = QueuedEventLoop::new();
        let channel = MemoryChannel::new();
        let shared: Arc<dyn EventLoop> = Arc::new(evloop.clone());
        let gateway = make_gateway(shared, evloop.executor(), channel.clone()).expect("gateway");
        Self {
            evloop,
            channel,
            gateway,
        }
    }

    pub fn evloop(&self) -> Arc<dyn EventLoop> {
        Arc::new(self.evloop.clone())
    }

    /// 驱动事件循环直到收集到 `count` 个结果。
    pub fn wait_for<T: Send + 'static>(&self, results: &Results<T>, count: usize) -> bool {
        self.evloop.run_until(WAIT, || results.len() >= count)
    }

    /// 提交一次请求并同步等待唯一结果。
    pub fn call<Req, Res>(
        &self,
        handler: &dyn RequestHandler<Req, Res>,
        request: Req,
        timeout: Duration,
    ) -> HandlerResult<Res>
    where
        Res: Send + 'static,
    {
        let results = Results::new();
        handler.handle_request(request, timeout, results.handler());
        assert!(self.wait_for(&results, 1), "result not delivered in time");
        let mut delivered = results.take();
        assert_eq!(delivered.len(), 1);
        delivered.remove(0)
    }
}
