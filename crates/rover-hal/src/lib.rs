//! # Rover HAL
//!
//! 硬件抽象层，为运行时核心提供统一的外设接口：
//!
//! - [`camera`]: 摄像头打开/读帧原语（按设备标识打开）
//! - [`gpio`]: 边沿触发数字输入（带去抖动配置和回调注册）
//! - [`drive`]: 执行器驱动暴露的"当前左右轮方向"查询
//! - [`host`]: 操作系统指标（CPU、内存、温度）
//! - [`range`]: 测距传感器
//!
//! `sim` 模块提供无需机器人硬件即可运行的实现（测试图案摄像头、模拟测距），
//! `mock` 模块（需启用 `mock` feature）提供脚本化的测试替身。

use thiserror::Error;

pub mod camera;
pub mod drive;
pub mod gpio;
pub mod host;
pub mod range;
pub mod sim;

#[cfg(feature = "mock")]
pub mod mock;

pub use camera::{CameraKind, CameraOpener, CameraSource, CameraSpec, RawFrame};
pub use drive::{DriveDirection, ForwardOnly, SharedDirection};
pub use gpio::{EdgeCallback, EdgeInput, SoftwareEdgeInput};
pub use host::{CpuInfo, MemoryInfo, MetricsProvider, SysinfoProvider};
pub use range::RangeSensor;

/// HAL 层统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Device not opened")]
    NotOpened,
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl HalError {
    /// 设备是否已经消失（拔出/断开）
    ///
    /// 采集循环据此区分"瞬时故障，继续下一轮"和"终止循环"。
    pub fn is_device_gone(&self) -> bool {
        match self {
            HalError::Device(e) => e.is_fatal(),
            HalError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    Busy,
    UnsupportedConfig,
    InvalidResponse,
    OutOfRange,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::NoDevice | DeviceErrorKind::AccessDenied | DeviceErrorKind::NotFound
        )
    }
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}
