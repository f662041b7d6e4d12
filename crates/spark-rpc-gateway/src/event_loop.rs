//! 协作式调度器契约。
//!
//! 网关从不在提交调用的栈帧里直接触发结果处理器：快速失败路径通过 [`EventLoop::invoke_later`]
//! 推迟执行，完成队列上的续延则交给 [`ResultExecutor`]。两者通常指向同一个单线程调度器。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// 零参数任务。
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// 调用方提供的续延执行器，由完成队列调度线程调用。
///
/// 实现不得阻塞到任务执行完毕；典型实现是把任务投入事件循环的队列。
pub type ResultExecutor = Arc<dyn Fn(Task) + Send + Sync + 'static>;

/// 单线程协作式调度器。
///
/// # 契约说明（What）
/// - `invoke_later` 可从任意线程调用，必须立即返回；
/// - 任务稍后在调度器自己的线程上执行，绝不在 `invoke_later` 内部同步执行。
pub trait EventLoop: Send + Sync + 'static {
    fn invoke_later(&self, task: Task);
}

/// 基于任务队列的 [`EventLoop`] 实现。
///
/// 任何线程都可以投递任务，只有调用 [`run_pending`](Self::run_pending) 或
/// [`run_until`](Self::run_until) 的线程执行任务。克隆体共享同一队列。
#[derive(Clone, Default)]
pub struct QueuedEventLoop {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    ready: Condvar,
}

impl Shared {
    fn push(&self, task: Task) {
        self.tasks.lock().push_back(task);
        self.ready.notify_all();
    }

    fn pop(&self) -> Option<Task> {
        self.tasks.lock().pop_front()
    }
}

impl QueuedEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回向同一队列投递任务的续延执行器。
    pub fn executor(&self) -> ResultExecutor {
        let shared = Arc::clone(&self.shared);
        Arc::new(move |task| shared.push(task))
    }

    /// 当前排队的任务数。
    pub fn pending(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    /// 执行队列中的任务直到队列为空（包括执行期间新投递的任务），返回执行数量。
    pub fn run_pending(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.shared.pop() {
            task();
            executed += 1;
        }
        executed
    }

    /// 持续执行任务直到 `done` 返回 `true` 或超时，返回最终的 `done()` 结果。
    ///
    /// 队列为空时在条件变量上等待，不会忙等。
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if done() {
                return true;
            }
            let task = {
                let ready = &self.shared.ready;
                let mut tasks = self.shared.tasks.lock();
                loop {
                    if let Some(task) = tasks.pop_front() {
                        break Some(task);
                    }
                    match deadline {
                        Some(deadline) => {
                            if ready.wait_until(&mut tasks, deadline).timed_out() {
                                break tasks.pop_front();
                            }
                        }
                        None => ready.wait(&mut tasks),
                    }
                }
            };
            match task {
                Some(task) => task(),
                None => return done(),
            }
        }
    }
}

impl EventLoop for QueuedEventLoop {
    fn invoke_later(&self, task: Task) {
        self.shared.push(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn invoke_later_never_runs_inline() {
        let evloop = QueuedEventLoop::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        evloop.invoke_later(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(evloop.pending(), 1);
        assert_eq!(evloop.run_pending(), 1);
        assert_eq!(evloop.pending(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_until_wakes_on_cross_thread_submission() {
        let evloop = QueuedEventLoop::new();
        let executor = evloop.executor();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            executor(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        });
        assert!(evloop.run_until(Duration::from_secs(5), || hits.load(Ordering::SeqCst) == 1));
        producer.join().expect("producer thread panicked");
    }

    #[test]
    fn run_until_reports_timeout() {
        let evloop = QueuedEventLoop::new();
        assert!(!evloop.run_until(Duration::from_millis(5), || false));
    }
}
