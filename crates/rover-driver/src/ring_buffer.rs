//! 限速环形缓冲区
//!
//! 固定容量的 FIFO 历史，溢出时淘汰最旧的样本。写入被节流：
//! 距离上次被接受的样本不足 `throttle` 的写入不进入历史，
//! 但仍会更新"最新瞬时值"，因此 [`ThrottledRing::latest`] 总是反映最近一次读数。
//!
//! 每个缓冲区有自己的锁，临界区只包含一次 push/拷贝。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 默认容量
pub const DEFAULT_CAPACITY: usize = 60;

/// 默认节流间隔
pub const DEFAULT_THROTTLE: Duration = Duration::from_millis(500);

/// 限速环形缓冲区
#[derive(Debug)]
pub struct ThrottledRing<T> {
    capacity: usize,
    throttle: Duration,
    inner: Mutex<RingState<T>>,
}

#[derive(Debug)]
struct RingState<T> {
    history: VecDeque<T>,
    last_accepted: Option<Instant>,
    latest: Option<T>,
}

impl<T: Clone> ThrottledRing<T> {
    /// 创建缓冲区
    ///
    /// `capacity` 为 0 时按 1 处理。
    pub fn new(capacity: usize, throttle: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            throttle,
            inner: Mutex::new(RingState {
                history: VecDeque::with_capacity(capacity),
                last_accepted: None,
                latest: None,
            }),
        }
    }

    /// 写入一个样本（使用当前时间）
    ///
    /// 返回样本是否进入历史。
    pub fn record(&self, value: T) -> bool {
        self.record_at(value, Instant::now())
    }

    /// 写入一个指定时刻的样本
    pub fn record_at(&self, value: T, now: Instant) -> bool {
        let mut state = self.inner.lock();

        let accept = match state.last_accepted {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.throttle,
        };

        if accept {
            if state.history.len() == self.capacity {
                state.history.pop_front();
            }
            state.history.push_back(value.clone());
            state.last_accepted = Some(now);
        }
        state.latest = Some(value);
        accept
    }

    /// 历史拷贝（最旧在前）
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// 最近一次写入的值（不受节流影响）
    pub fn latest(&self) -> Option<T> {
        self.inner.lock().latest.clone()
    }

    /// 历史中最新被接受的样本
    pub fn latest_accepted(&self) -> Option<T> {
        self.inner.lock().history.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// 清空历史与最新值，节流计时同时复位
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.history.clear();
        state.last_accepted = None;
        state.latest = None;
    }
}

impl<T: Clone> Default for ThrottledRing<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_THROTTLE)
    }
}
