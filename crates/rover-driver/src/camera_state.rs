//! 摄像头状态（原子版本，用于线程间共享）
//!
//! 采集线程在设备消失时把状态切换为 `CameraKind::None`，
//! 请求处理线程据此返回"不可用"而不是无限等待。

use rover_hal::CameraKind;
use std::sync::atomic::{AtomicU8, Ordering};

/// 原子摄像头类别
///
/// # 示例
///
/// ```rust
/// use rover_driver::camera_state::AtomicCameraKind;
/// use rover_hal::CameraKind;
/// use std::sync::atomic::Ordering;
///
/// let kind = AtomicCameraKind::new(CameraKind::Primary);
/// assert_eq!(kind.get(Ordering::Relaxed), CameraKind::Primary);
///
/// kind.set(CameraKind::None, Ordering::Relaxed);
/// assert!(kind.is_terminal(Ordering::Relaxed));
/// ```
#[derive(Debug)]
pub struct AtomicCameraKind {
    inner: AtomicU8,
}

impl AtomicCameraKind {
    pub fn new(kind: CameraKind) -> Self {
        Self {
            inner: AtomicU8::new(kind.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> CameraKind {
        CameraKind::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, kind: CameraKind, ordering: Ordering) {
        self.inner.store(kind.as_u8(), ordering);
    }

    /// 是否处于终止状态（无摄像头）
    pub fn is_terminal(&self, ordering: Ordering) -> bool {
        self.get(ordering) == CameraKind::None
    }
}

impl Default for AtomicCameraKind {
    fn default() -> Self {
        Self::new(CameraKind::None)
    }
}
