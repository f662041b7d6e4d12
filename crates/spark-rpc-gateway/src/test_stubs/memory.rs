//! 内存传输：按脚本完成操作的完成队列、通道与方法描述。
//!
//! # 逻辑解析（How）
//! - [`MemoryCompletionQueue`] 用条件变量实现阻塞弹出；被“挂起”的操作记为在途，
//!   [`CompletionQueue::shutdown`] 时以 `ok = false` 冲刷，随后报告关闭；
//! - [`MemoryChannel`] 统计每一次传输操作（发起、请求终态、打开、读取），
//!   用于断言“关闭后不再触达传输层”；
//! - [`ScriptedUnaryMethod`] 与 [`ScriptedStreamMethod`] 按脚本产生结果，截止时间已过的调用
//!   直接以 `DEADLINE_EXCEEDED` 结束。

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::SystemTime;

use parking_lot::{Condvar, Mutex};

use crate::contract::{Cancellation, Deadline, RpcContext};
use crate::status::{Status, StatusCode};
use crate::tag::Tag;
use crate::transport::{
    Channel, CompletionQueue, CompletionSlot, QueueEvent, StreamMethod, StreamReader, UnaryCall,
    UnaryMethod,
};

/// 内存完成队列，克隆体共享同一队列。
#[derive(Clone, Default)]
pub struct MemoryCompletionQueue {
    inner: Arc<QueueInner>,
}

#[derive(Default)]
struct QueueInner {
    state: Mutex<QueueState>,
    ready: Condvar,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<(Option<Tag>, bool)>,
    outstanding: BTreeSet<Tag>,
    shutdown: bool,
}

impl MemoryCompletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 投递一个完成事件。
    pub fn post(&self, tag: Tag, ok: bool) {
        let mut state = self.inner.state.lock();
        state.outstanding.remove(&tag);
        state.events.push_back((Some(tag), ok));
        self.inner.ready.notify_all();
    }

    /// 投递一次虚假唤醒。
    pub fn post_spurious(&self) {
        self.inner.state.lock().events.push_back((None, false));
        self.inner.ready.notify_all();
    }

    /// 挂起操作：只有关闭队列时才会以 `ok = false` 完成。
    pub fn hold(&self, tag: Tag) {
        let mut state = self.inner.state.lock();
        if state.shutdown {
            state.events.push_back((Some(tag), false));
            self.inner.ready.notify_all();
        } else {
            state.outstanding.insert(tag);
        }
    }

    /// 当前挂起的操作数。
    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.state.lock().shutdown
    }
}

impl CompletionQueue for MemoryCompletionQueue {
    fn next(&self) -> QueueEvent {
        let mut state = self.inner.state.lock();
        loop {
            if let Some((tag, ok)) = state.events.pop_front() {
                return QueueEvent::Completion { tag, ok };
            }
            if state.shutdown {
                return QueueEvent::Shutdown;
            }
            self.inner.ready.wait(&mut state);
        }
    }

    fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            let flushed = std::mem::take(&mut state.outstanding);
            state
                .events
                .extend(flushed.into_iter().map(|tag| (Some(tag), false)));
        }
        self.inner.ready.notify_all();
    }
}

impl fmt::Debug for MemoryCompletionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("MemoryCompletionQueue")
            .field("pending_events", &state.events.len())
            .field("outstanding", &state.outstanding.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

/// 内存通道，克隆体共享传输操作计数。
#[derive(Clone, Default, Debug)]
pub struct MemoryChannel {
    calls: Arc<AtomicUsize>,
    queues: Arc<Mutex<Vec<MemoryCompletionQueue>>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// 迄今为止触达传输层的操作数。
    pub fn transport_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 最近一次创建的完成队列。
    pub fn last_queue(&self) -> Option<MemoryCompletionQueue> {
        self.queues.lock().last().cloned()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Channel for MemoryChannel {
    type Queue = MemoryCompletionQueue;

    fn create_completion_queue(&self) -> MemoryCompletionQueue {
        let queue = MemoryCompletionQueue::new();
        self.queues.lock().push(queue.clone());
        queue
    }
}

/// 传输层看到的一次调用上下文快照。
#[derive(Clone, Debug)]
pub struct ObservedRpc {
    pub deadline: Deadline,
    pub cancellation: Cancellation,
}

/// 记录方法收到的每个 [`RpcContext`]。
#[derive(Clone, Default, Debug)]
pub struct RpcObserver {
    seen: Arc<Mutex<Vec<ObservedRpc>>>,
}

impl RpcObserver {
    fn record(&self, rpc: &RpcContext) {
        self.seen.lock().push(ObservedRpc {
            deadline: rpc.deadline(),
            cancellation: rpc.cancellation().child(),
        });
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn last(&self) -> Option<ObservedRpc> {
        self.seen.lock().last().cloned()
    }
}

fn deadline_exceeded() -> Status {
    Status::new(StatusCode::DeadlineExceeded, "deadline exceeded")
}

type Responder<Req, Res> = Arc<dyn Fn(Req) -> Result<Res, Status> + Send + Sync>;

/// 按闭包应答的一元方法；`stalled` 版本永不完成，直到队列关闭。
pub struct ScriptedUnaryMethod<Req, Res> {
    responder: Option<Responder<Req, Res>>,
    observer: RpcObserver,
}

impl<Req, Res> ScriptedUnaryMethod<Req, Res> {
    pub fn new(responder: impl Fn(Req) -> Result<Res, Status> + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Arc::new(responder)),
            observer: RpcObserver::default(),
        }
    }

    pub fn stalled() -> Self {
        Self {
            responder: None,
            observer: RpcObserver::default(),
        }
    }

    pub fn observer(&self) -> RpcObserver {
        self.observer.clone()
    }
}

impl<Req, Res> UnaryMethod<MemoryChannel> for ScriptedUnaryMethod<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    type Request = Req;
    type Response = Res;

    fn start(
        &self,
        channel: &MemoryChannel,
        rpc: &RpcContext,
        request: Req,
        queue: &MemoryCompletionQueue,
    ) -> Box<dyn UnaryCall<Res>> {
        channel.record_call();
        self.observer.record(rpc);
        let outcome = match &self.responder {
            None => None,
            Some(_) if rpc.deadline().is_expired(SystemTime::now()) => {
                Some(Err(deadline_exceeded()))
            }
            Some(responder) => Some(responder(request)),
        };
        Box::new(MemoryUnaryCall {
            channel: channel.clone(),
            queue: queue.clone(),
            outcome,
        })
    }
}

struct MemoryUnaryCall<Res> {
    channel: MemoryChannel,
    queue: MemoryCompletionQueue,
    outcome: Option<Result<Res, Status>>,
}

impl<Res: Send> UnaryCall<Res> for MemoryUnaryCall<Res> {
    fn finish(
        self: Box<Self>,
        response: CompletionSlot<Res>,
        status: CompletionSlot<Status>,
        tag: Tag,
    ) {
        self.channel.record_call();
        match self.outcome {
            None => self.queue.hold(tag),
            Some(Ok(value)) => {
                response.fill(value);
                status.fill(Status::ok());
                self.queue.post(tag, true);
            }
            Some(Err(terminal)) => {
                status.fill(terminal);
                self.queue.post(tag, true);
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OpenOutcome {
    Ready,
    Rejected,
    Stalled,
}

/// 单条流的脚本。
#[derive(Clone, Debug)]
pub struct StreamScript<Res> {
    open: OpenOutcome,
    messages: VecDeque<Res>,
    terminal: Status,
    stall_after_messages: bool,
    stall_finish: bool,
}

impl<Res> StreamScript<Res> {
    /// 依次交付 `messages`，随后自然结束，终态为 OK。
    pub fn messages(messages: impl IntoIterator<Item = Res>) -> Self {
        Self {
            open: OpenOutcome::Ready,
            messages: messages.into_iter().collect(),
            terminal: Status::ok(),
            stall_after_messages: false,
            stall_finish: false,
        }
    }

    /// 打开失败，终态为 `status`。
    pub fn rejected(status: Status) -> Self {
        Self {
            open: OpenOutcome::Rejected,
            messages: VecDeque::new(),
            terminal: status,
            stall_after_messages: false,
            stall_finish: false,
        }
    }

    /// 打开操作永不完成，直到队列关闭。
    pub fn stalled_open() -> Self {
        Self {
            open: OpenOutcome::Stalled,
            ..Self::messages([])
        }
    }

    pub fn with_terminal(mut self, status: Status) -> Self {
        self.terminal = status;
        self
    }

    /// 消息耗尽后的读取永不完成，直到队列关闭。
    pub fn stall_after_messages(mut self) -> Self {
        self.stall_after_messages = true;
        self
    }

    /// 请求终态的操作永不完成，直到队列关闭。
    pub fn stall_finish(mut self) -> Self {
        self.stall_finish = true;
        self
    }
}

type ScriptSource<Req, Res> = Arc<dyn Fn(&Req) -> StreamScript<Res> + Send + Sync>;

/// 按请求生成脚本的服务端流方法。
pub struct ScriptedStreamMethod<Req, Res> {
    script: ScriptSource<Req, Res>,
    observer: RpcObserver,
}

impl<Req, Res> ScriptedStreamMethod<Req, Res> {
    pub fn new(script: impl Fn(&Req) -> StreamScript<Res> + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            observer: RpcObserver::default(),
        }
    }

    /// 每次打开都使用同一脚本。
    pub fn fixed(script: StreamScript<Res>) -> Self
    where
        Res: Clone + Send + Sync + 'static,
    {
        Self::new(move |_| script.clone())
    }

    /// 每次打开流都会记录一次上下文。
    pub fn observer(&self) -> RpcObserver {
        self.observer.clone()
    }
}

impl<Req, Res> StreamMethod<MemoryChannel> for ScriptedStreamMethod<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    type Request = Req;
    type Response = Res;

    fn open(
        &self,
        channel: &MemoryChannel,
        rpc: &RpcContext,
        request: Req,
        queue: &MemoryCompletionQueue,
        tag: Tag,
    ) -> Box<dyn StreamReader<Res>> {
        channel.record_call();
        self.observer.record(rpc);
        let mut script = (self.script)(&request);
        if script.open == OpenOutcome::Ready && rpc.deadline().is_expired(SystemTime::now()) {
            script = StreamScript::rejected(deadline_exceeded());
        }
        match script.open {
            OpenOutcome::Ready => queue.post(tag, true),
            OpenOutcome::Rejected => queue.post(tag, false),
            OpenOutcome::Stalled => queue.hold(tag),
        }
        Box::new(MemoryStreamReader {
            channel: channel.clone(),
            queue: queue.clone(),
            messages: script.messages,
            terminal: script.terminal,
            stall_after_messages: script.stall_after_messages,
            stall_finish: script.stall_finish,
        })
    }
}

struct MemoryStreamReader<Res> {
    channel: MemoryChannel,
    queue: MemoryCompletionQueue,
    messages: VecDeque<Res>,
    terminal: Status,
    stall_after_messages: bool,
    stall_finish: bool,
}

impl<Res: Send> StreamReader<Res> for MemoryStreamReader<Res> {
    fn read(&mut self, message: CompletionSlot<Res>, tag: Tag) {
        self.channel.record_call();
        match self.messages.pop_front() {
            Some(next) => {
                message.fill(next);
                self.queue.post(tag, true);
            }
            None if self.stall_after_messages => self.queue.hold(tag),
            None => self.queue.post(tag, false),
        }
    }

    fn finish(&mut self, status: CompletionSlot<Status>, tag: Tag) {
        self.channel.record_call();
        if self.stall_finish {
            self.queue.hold(tag);
            return;
        }
        status.fill(self.terminal.clone());
        self.queue.post(tag, true);
    }
}
