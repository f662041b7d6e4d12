//! 跨完成队列边界传递的不透明标签与一次性续延。
//!
//! # 逻辑解析（How）
//! - 提交操作前，续延登记到 [`TagRegistry`] 并换取一个 [`Tag`]；传输层只看见这个整数句柄；
//! - 调度线程弹出标签后调用 [`TagRegistry::reclaim`] 取回续延，登记项随之移除，因此同一续延
//!   至多被取回一次；
//! - [`TagRegistry::close`] 一次性取走剩余续延并拒绝后续登记，关停时借此保证续延不被遗漏。

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;

use parking_lot::Mutex;

use crate::event_loop::Task;

/// 不透明操作标签。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(NonZeroU64);

impl Tag {
    /// 转换为原始整数，供需要指针宽度令牌的传输层使用。
    pub fn into_raw(self) -> u64 {
        self.0.get()
    }

    /// 从原始整数恢复标签；`0` 代表空标签。
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag#{}", self.0)
    }
}

/// 单次使用的续延，两种形态：接收完成标志，或不接收参数。
pub enum TagContinuation {
    Completion(Box<dyn FnOnce(bool) + Send + 'static>),
    Notify(Box<dyn FnOnce() + Send + 'static>),
}

impl TagContinuation {
    pub fn completion(func: impl FnOnce(bool) + Send + 'static) -> Self {
        TagContinuation::Completion(Box::new(func))
    }

    pub fn notify(func: impl FnOnce() + Send + 'static) -> Self {
        TagContinuation::Notify(Box::new(func))
    }

    /// 以完成标志执行续延；`Notify` 形态忽略该标志。
    pub fn invoke(self, ok: bool) {
        match self {
            TagContinuation::Completion(func) => func(ok),
            TagContinuation::Notify(func) => func(),
        }
    }

    /// 打包为交给执行器的零参数任务。
    pub fn into_task(self, ok: bool) -> Task {
        Box::new(move || self.invoke(ok))
    }
}

impl fmt::Debug for TagContinuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagContinuation::Completion(_) => f.write_str("TagContinuation::Completion"),
            TagContinuation::Notify(_) => f.write_str("TagContinuation::Notify"),
        }
    }
}

/// 标签到续延的登记表。
#[derive(Default)]
pub struct TagRegistry {
    state: Mutex<RegistryState>,
}

struct RegistryState {
    next: NonZeroU64,
    live: HashMap<Tag, TagContinuation>,
    closed: bool,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            next: NonZeroU64::MIN,
            live: HashMap::new(),
            closed: false,
        }
    }
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记续延并分配标签；登记表已关闭时原样退回续延。
    pub fn register(&self, continuation: TagContinuation) -> Result<Tag, TagContinuation> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(continuation);
        }
        let tag = loop {
            let candidate = Tag(state.next);
            state.next = state.next.checked_add(1).unwrap_or(NonZeroU64::MIN);
            if !state.live.contains_key(&candidate) {
                break candidate;
            }
        };
        state.live.insert(tag, continuation);
        Ok(tag)
    }

    /// 取回标签对应的续延，每个标签至多成功一次。
    pub fn reclaim(&self, tag: Tag) -> Option<TagContinuation> {
        self.state.lock().live.remove(&tag)
    }

    /// 关闭登记表并按标签顺序取走全部未投递的续延。
    pub fn close(&self) -> Vec<TagContinuation> {
        let mut state = self.state.lock();
        state.closed = true;
        let mut abandoned: Vec<_> = state.live.drain().collect();
        abandoned.sort_unstable_by_key(|(tag, _)| *tag);
        abandoned
            .into_iter()
            .map(|(_, continuation)| continuation)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// 已登记且尚未取回的续延数量。
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TagRegistry")
            .field("live", &state.live.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn reclaim_succeeds_exactly_once() {
        let registry = TagRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let tag = registry
            .register(TagContinuation::completion(move |ok| {
                assert!(ok);
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("registry is open");

        registry.reclaim(tag).expect("first reclaim").invoke(true);
        assert!(registry.reclaim(tag).is_none(), "同一标签不能取回两次");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn notify_shape_ignores_completion_flag() {
        let registry = TagRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let tag = registry
            .register(TagContinuation::notify(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("registry is open");
        let task = registry.reclaim(tag).expect("registered").into_task(false);
        task();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_drains_in_tag_order_and_rejects_late_registrations() {
        let registry = TagRegistry::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for idx in 0..3 {
            let order = Arc::clone(&order);
            registry
                .register(TagContinuation::completion(move |ok| {
                    order.lock().push((idx, ok));
                }))
                .expect("registry is open");
        }

        for continuation in registry.close() {
            continuation.invoke(false);
        }
        assert_eq!(*order.lock(), vec![(0, false), (1, false), (2, false)]);
        assert!(registry.is_empty());

        let rejected = registry.register(TagContinuation::notify(|| {}));
        assert!(rejected.is_err(), "关闭后的登记必须被退回");
    }

    #[test]
    fn raw_round_trip_and_null_tag() {
        let registry = TagRegistry::new();
        let tag = registry
            .register(TagContinuation::notify(|| {}))
            .expect("registry is open");
        assert_eq!(Tag::from_raw(tag.into_raw()), Some(tag));
        assert_eq!(Tag::from_raw(0), None);
    }
}
