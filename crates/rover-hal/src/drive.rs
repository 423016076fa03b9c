//! 驱动方向查询
//!
//! 执行器驱动（电机输出）是外部协作者，它对外只暴露最近一次下发的
//! 左右轮方向：`+1` 前进，`-1` 后退，`0` 停止。

use std::sync::atomic::{AtomicI8, Ordering};

/// 当前左右轮方向查询
pub trait DriveDirection: Send + Sync {
    /// 返回 (left, right)，取值为 -1 / 0 / +1
    fn current_directions(&self) -> (i8, i8);
}

/// 无执行器方向信号时的默认实现：两轮恒为前进
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardOnly;

impl DriveDirection for ForwardOnly {
    fn current_directions(&self) -> (i8, i8) {
        (1, 1)
    }
}

/// 由执行器驱动写入、由里程计读取的共享方向
///
/// 初始为停止（0, 0），与电机控制器上电后 `stop()` 的状态一致。
#[derive(Debug, Default)]
pub struct SharedDirection {
    left: AtomicI8,
    right: AtomicI8,
}

impl SharedDirection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入方向（会被钳制到 -1..=1）
    pub fn set(&self, left: i8, right: i8) {
        self.left.store(left.signum(), Ordering::Relaxed);
        self.right.store(right.signum(), Ordering::Relaxed);
    }

    pub fn forward(&self) {
        self.set(1, 1);
    }

    pub fn backward(&self) {
        self.set(-1, -1);
    }

    /// 原地右转：左轮前进，右轮后退
    pub fn turn_right(&self) {
        self.set(1, -1);
    }

    /// 原地左转：左轮后退，右轮前进
    pub fn turn_left(&self) {
        self.set(-1, 1);
    }

    pub fn stop(&self) {
        self.set(0, 0);
    }
}

impl DriveDirection for SharedDirection {
    fn current_directions(&self) -> (i8, i8) {
        (
            self.left.load(Ordering::Relaxed),
            self.right.load(Ordering::Relaxed),
        )
    }
}
