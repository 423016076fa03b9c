//! 摄像头抽象
//!
//! 运行时核心只依赖两个原语：按设备标识打开摄像头（[`CameraOpener`]），
//! 以及从已打开的摄像头读取原始帧（[`CameraSource`]）。
//! 摄像头句柄在 `Drop` 时释放，由唯一持有它的采集线程负责。

use crate::HalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 摄像头类别
///
/// - `Primary`: 板载摄像头（首选）
/// - `Fallback`: 外接采集设备（按索引回退）
/// - `None`: 无可用摄像头，或设备已在运行中消失
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CameraKind {
    Primary = 0,
    Fallback = 1,
    #[default]
    None = 2,
}

impl CameraKind {
    /// 从 u8 转换
    ///
    /// 无效值视为 `None`。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Primary,
            1 => Self::Fallback,
            _ => Self::None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 摄像头设备标识（偏好列表中的一项）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "index", rename_all = "lowercase")]
pub enum CameraSpec {
    /// 板载摄像头
    Primary,
    /// 外接采集设备（按设备索引，如 `/dev/video0`）
    External(u32),
}

impl CameraSpec {
    /// 默认偏好顺序：板载 → 外接 0 → 外接 1
    pub fn default_preference() -> Vec<CameraSpec> {
        vec![
            CameraSpec::Primary,
            CameraSpec::External(0),
            CameraSpec::External(1),
        ]
    }

    pub fn kind(&self) -> CameraKind {
        match self {
            CameraSpec::Primary => CameraKind::Primary,
            CameraSpec::External(_) => CameraKind::Fallback,
        }
    }

    /// 显示名称（用于统计信息）
    pub fn display_name(&self) -> String {
        match self {
            CameraSpec::Primary => "Pi-Cam".to_string(),
            CameraSpec::External(index) => format!("USB-{}", index),
        }
    }
}

impl fmt::Display for CameraSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSpec::Primary => write!(f, "primary"),
            CameraSpec::External(index) => write!(f, "external#{}", index),
        }
    }
}

/// 原始帧（RGB8，行优先，无填充）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub const CHANNELS: usize = 3;

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, HalError> {
        let expected = width as usize * height as usize * Self::CHANNELS;
        if data.len() != expected {
            return Err(HalError::Device(crate::DeviceError::new(
                crate::DeviceErrorKind::InvalidResponse,
                format!(
                    "frame buffer size mismatch: expected {} bytes, got {}",
                    expected,
                    data.len()
                ),
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// 纯色帧（测试与占位用）
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * Self::CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self {
            width,
            height,
            data,
        }
    }
}

/// 已打开的摄像头
pub trait CameraSource {
    /// 读取一帧原始图像
    ///
    /// 返回 `Err(e)` 且 `e.is_device_gone()` 时，调用方应终止采集循环。
    fn read_frame(&mut self) -> Result<RawFrame, HalError>;

    /// 当前分辨率 (width, height)
    fn resolution(&self) -> (u32, u32);
}

/// 摄像头打开原语（按设备标识）
pub trait CameraOpener {
    fn open(&self, spec: &CameraSpec) -> Result<Box<dyn CameraSource + Send>, HalError>;
}
