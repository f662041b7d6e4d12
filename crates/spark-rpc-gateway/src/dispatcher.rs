//! 完成队列调度线程与关停协调。
//!
//! # 逻辑解析（How）
//! - [`QueueHandle`] 是网关与各适配器共享的“双重间接”句柄：槽位里放着队列的 `Arc`。
//!   清空槽位即对所有提交方宣告“不再接受新操作”，而调度线程手里另有一份 `Arc`，
//!   可以继续排空直到队列报告关闭；
//! - 调度线程只做三件事：弹出事件、取回续延、把 `continuation(ok)` 交给执行器；
//! - 队列报告关闭后，调度线程关闭登记表，把仍未投递的续延以 `ok = false` 逐一交给执行器，
//!   因此每个续延都恰好执行一次；
//! - [`DispatcherGuard`] 析构时依次清空槽位、关闭队列、等待调度线程退出。

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use tracing::{debug, debug_span, error, trace, warn};

use crate::config::GatewayConfig;
use crate::error::BuildError;
use crate::event_loop::{EventLoop, ResultExecutor};
use crate::tag::{Tag, TagContinuation, TagRegistry};
use crate::transport::{CompletionQueue, QueueEvent};

/// 共享的队列槽位与续延登记表。
pub(crate) struct QueueHandle<Q> {
    slot: ArcSwapOption<Q>,
    tags: Arc<TagRegistry>,
}

impl<Q: CompletionQueue> QueueHandle<Q> {
    pub(crate) fn new(queue: Arc<Q>, tags: Arc<TagRegistry>) -> Self {
        Self {
            slot: ArcSwapOption::from(Some(queue)),
            tags,
        }
    }

    /// 槽位已清空即视为关闭，之后不得发起新的提交。
    pub(crate) fn is_closed(&self) -> bool {
        self.slot.load().is_none()
    }

    fn take(&self) -> Option<Arc<Q>> {
        self.slot.swap(None)
    }

    /// 登记续延并把标签交给 `op` 发起传输操作。
    ///
    /// 槽位已清空或登记表已关闭时不触达传输层，续延经事件循环以 `ok = false` 执行，
    /// 由续延自身把它解释为 `queue-closed`。
    pub(crate) fn submit(
        &self,
        evloop: &dyn EventLoop,
        continuation: TagContinuation,
        op: impl FnOnce(&Q, Tag),
    ) {
        let Some(queue) = self.slot.load_full() else {
            evloop.invoke_later(continuation.into_task(false));
            return;
        };
        match self.tags.register(continuation) {
            Ok(tag) => op(&queue, tag),
            Err(rejected) => evloop.invoke_later(rejected.into_task(false)),
        }
    }

    /// 撤回一个未交给传输层的登记，续延经事件循环以 `ok = false` 执行。
    pub(crate) fn withdraw(&self, evloop: &dyn EventLoop, tag: Tag) {
        if let Some(continuation) = self.tags.reclaim(tag) {
            evloop.invoke_later(continuation.into_task(false));
        }
    }
}

/// 启动调度线程。
pub(crate) fn spawn_dispatcher<Q: CompletionQueue>(
    config: &GatewayConfig,
    queue: Arc<Q>,
    tags: Arc<TagRegistry>,
    executor: ResultExecutor,
) -> Result<JoinHandle<()>, BuildError> {
    let mut builder = thread::Builder::new().name(config.dispatcher_thread_name.clone());
    if let Some(stack_size) = config.dispatcher_stack_size {
        builder = builder.stack_size(stack_size);
    }
    // 调度线程挂在创建者的 span 之下，日志可追溯到所属网关
    let span = debug_span!("cq_dispatcher", thread = %config.dispatcher_thread_name);
    builder
        .spawn(move || {
            let _entered = span.entered();
            drain(queue.as_ref(), tags.as_ref(), &executor);
        })
        .map_err(|source| BuildError::SpawnDispatcher {
            thread_name: config.dispatcher_thread_name.clone(),
            source,
        })
}

/// 调度循环本体：唯一的退出条件是队列报告关闭。
fn drain<Q: CompletionQueue>(queue: &Q, tags: &TagRegistry, executor: &ResultExecutor) {
    debug!("completion dispatcher started");
    let mut delivered: u64 = 0;
    loop {
        match queue.next() {
            QueueEvent::Shutdown => break,
            QueueEvent::Completion { tag: None, .. } => trace!("spurious completion queue wake-up"),
            QueueEvent::Completion { tag: Some(tag), ok } => match tags.reclaim(tag) {
                Some(continuation) => {
                    executor(continuation.into_task(ok));
                    delivered += 1;
                }
                None => warn!(%tag, ok, "completion for unknown tag ignored"),
            },
        }
    }

    let abandoned = tags.close();
    if !abandoned.is_empty() {
        debug!(
            count = abandoned.len(),
            "delivering abandoned continuations after queue shutdown"
        );
    }
    for continuation in abandoned {
        executor(continuation.into_task(false));
    }
    debug!(delivered, "completion dispatcher stopped");
}

/// 网关生命周期护栏，析构即同步关停。
pub(crate) struct DispatcherGuard<Q: CompletionQueue> {
    queue: Arc<QueueHandle<Q>>,
    thread: Option<JoinHandle<()>>,
}

impl<Q: CompletionQueue> DispatcherGuard<Q> {
    pub(crate) fn new(queue: Arc<QueueHandle<Q>>, thread: JoinHandle<()>) -> Self {
        Self {
            queue,
            thread: Some(thread),
        }
    }
}

impl<Q: CompletionQueue> Drop for DispatcherGuard<Q> {
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.shutdown();
        }
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            warn!(
                "gateway dropped on its own dispatcher thread, dispatcher left to exit on its own"
            );
            return;
        }
        if thread.join().is_err() {
            error!("completion dispatcher thread panicked");
        }
    }
}
