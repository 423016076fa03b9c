//! 驱动层错误类型定义

use rover_hal::{CameraSpec, HalError};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// HAL 错误
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    /// 偏好列表中没有任何摄像头能打开（初始化致命错误）
    #[error("No camera available (tried: {})", format_tried(.tried))]
    NoCameraAvailable { tried: Vec<CameraSpec> },

    /// 图像编码失败
    #[error("Encode error: {0}")]
    Encode(String),

    /// 配置无效
    #[error("Invalid config: {0}")]
    Config(String),

    /// 后台线程创建失败
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// 组件不可用（未构建或已进入终止状态）
    #[error("Component unavailable: {0}")]
    Unavailable(&'static str),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn format_tried(tried: &[CameraSpec]) -> String {
    if tried.is_empty() {
        return "none".to_string();
    }
    tried
        .iter()
        .map(|spec| spec.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<image::ImageError> for DriverError {
    fn from(err: image::ImageError) -> Self {
        DriverError::Encode(err.to_string())
    }
}

impl From<toml::de::Error> for DriverError {
    fn from(err: toml::de::Error) -> Self {
        DriverError::Config(err.to_string())
    }
}
