//! 边沿触发数字输入
//!
//! 轮速编码器的每个脉冲通过 [`EdgeInput`] 注册的回调上报。
//! 去抖动由输入层负责，回调运行在不能被阻塞的上下文中（硬件中断/事件线程），
//! 因此回调实现必须只做原子自增之类的瞬时操作。

use crate::HalError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 边沿回调
pub type EdgeCallback = Arc<dyn Fn() + Send + Sync>;

/// 边沿触发数字输入原语
pub trait EdgeInput: Send {
    /// 引脚编号（仅用于日志）
    fn pin(&self) -> u8;

    /// 配置最小边沿间隔（去抖动窗口）
    fn set_debounce(&mut self, window: Duration);

    /// 注册上升沿回调（替换已有回调）
    fn on_edge(&mut self, callback: EdgeCallback) -> Result<(), HalError>;

    /// 释放输入（取消回调、unexport 引脚）
    fn close(&mut self) {}
}

/// 软件边沿输入
///
/// 由外部（事件线程、模拟器、测试）调用 [`SoftwareEdgeInput::trigger`] 注入边沿，
/// 在软件中完成去抖动：与上一次被接受的边沿间隔小于窗口的边沿被丢弃。
#[derive(Clone)]
pub struct SoftwareEdgeInput {
    pin: u8,
    inner: Arc<Mutex<EdgeState>>,
}

struct EdgeState {
    debounce: Duration,
    last_accepted: Option<Instant>,
    callback: Option<EdgeCallback>,
    closed: bool,
}

impl SoftwareEdgeInput {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            inner: Arc::new(Mutex::new(EdgeState {
                debounce: Duration::ZERO,
                last_accepted: None,
                callback: None,
                closed: false,
            })),
        }
    }

    /// 注入一个边沿（使用当前时间）
    ///
    /// 返回该边沿是否被接受。
    pub fn trigger(&self) -> bool {
        self.trigger_at(Instant::now())
    }

    /// 注入一个指定时刻的边沿
    pub fn trigger_at(&self, at: Instant) -> bool {
        let callback = {
            let mut state = self.inner.lock();
            if state.closed {
                return false;
            }
            if let Some(last) = state.last_accepted
                && at.saturating_duration_since(last) < state.debounce
            {
                return false;
            }
            state.last_accepted = Some(at);
            state.callback.clone()
        };

        // 回调在锁外执行
        if let Some(cb) = callback {
            cb();
        }
        true
    }
}

impl EdgeInput for SoftwareEdgeInput {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn set_debounce(&mut self, window: Duration) {
        self.inner.lock().debounce = window;
    }

    fn on_edge(&mut self, callback: EdgeCallback) -> Result<(), HalError> {
        let mut state = self.inner.lock();
        if state.closed {
            return Err(HalError::NotOpened);
        }
        state.callback = Some(callback);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.inner.lock();
        state.callback = None;
        state.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_input(debounce: Duration) -> (SoftwareEdgeInput, Arc<AtomicU64>) {
        let mut input = SoftwareEdgeInput::new(5);
        input.set_debounce(debounce);
        let count = Arc::new(AtomicU64::new(0));
        let c = count.clone();
        input
            .on_edge(Arc::new(move || {
                c.fetch_add(1, Ordering::Relaxed);
            }))
            .unwrap();
        (input, count)
    }

    #[test]
    fn test_debounce_rejects_fast_edges() {
        let (input, count) = counting_input(Duration::from_millis(1));
        let t0 = Instant::now();

        assert!(input.trigger_at(t0));
        assert!(!input.trigger_at(t0 + Duration::from_micros(300)));
        assert!(!input.trigger_at(t0 + Duration::from_micros(999)));
        assert!(input.trigger_at(t0 + Duration::from_millis(1)));
        assert!(input.trigger_at(t0 + Duration::from_millis(3)));

        assert_eq!(count.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_zero_debounce_accepts_everything() {
        let (input, count) = counting_input(Duration::ZERO);
        let t0 = Instant::now();
        for _ in 0..10 {
            input.trigger_at(t0);
        }
        assert_eq!(count.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_closed_input_ignores_edges() {
        let (mut input, count) = counting_input(Duration::ZERO);
        input.close();
        assert!(!input.trigger());
        assert_eq!(count.load(Ordering::Relaxed), 0);
        assert!(input.on_edge(Arc::new(|| {})).is_err());
    }
}
