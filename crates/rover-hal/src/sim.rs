//! 无硬件实现
//!
//! 在开发机或 CI 上运行完整的采集链路：测试图案摄像头和扫描式测距传感器。

use crate::camera::{CameraOpener, CameraSource, CameraSpec, RawFrame};
use crate::range::RangeSensor;
use crate::{DeviceError, DeviceErrorKind, HalError};
use rand::Rng;
use tracing::debug;

/// 测试图案摄像头的打开器
///
/// 只有列在 `available` 中的设备标识可以被打开，其余返回 `NotFound`，
/// 用于演练偏好列表的回退逻辑。
#[derive(Debug, Clone)]
pub struct SyntheticCameraOpener {
    available: Vec<CameraSpec>,
    width: u32,
    height: u32,
}

impl SyntheticCameraOpener {
    pub fn new(available: Vec<CameraSpec>, width: u32, height: u32) -> Self {
        Self {
            available,
            width,
            height,
        }
    }

    /// 所有设备都可以打开（640x480）
    pub fn any() -> Self {
        Self::new(CameraSpec::default_preference(), 640, 480)
    }
}

impl CameraOpener for SyntheticCameraOpener {
    fn open(&self, spec: &CameraSpec) -> Result<Box<dyn CameraSource + Send>, HalError> {
        if !self.available.contains(spec) {
            return Err(HalError::Device(DeviceError::new(
                DeviceErrorKind::NotFound,
                format!("no synthetic device for {}", spec),
            )));
        }
        Ok(Box::new(SyntheticCamera::new(self.width, self.height)))
    }
}

/// 测试图案摄像头：水平移动的彩色渐变
#[derive(Debug)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    tick: u32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

impl CameraSource for SyntheticCamera {
    fn read_frame(&mut self) -> Result<RawFrame, HalError> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(w * h * RawFrame::CHANNELS);
        let shift = self.tick as usize;
        for y in 0..h {
            for x in 0..w {
                let r = ((x + shift) * 255 / w.max(1)) as u8;
                let g = (y * 255 / h.max(1)) as u8;
                let b = (shift % 256) as u8;
                data.extend_from_slice(&[r, g, b]);
            }
        }
        self.tick = self.tick.wrapping_add(4);
        RawFrame::new(self.width, self.height, data)
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// 扫描式模拟测距传感器
///
/// 距离在 `[min, max]` 内来回扫描，叠加少量噪声；
/// `dropout` 为单次读取失败的概率，用于演练瞬时故障路径。
#[derive(Debug)]
pub struct SimulatedRangeSensor {
    name: String,
    range: (f32, f32),
    current: f32,
    step: f32,
    dropout: f64,
}

impl SimulatedRangeSensor {
    pub fn new(name: impl Into<String>, min_cm: f32, max_cm: f32) -> Self {
        Self {
            name: name.into(),
            range: (min_cm, max_cm),
            current: min_cm,
            step: (max_cm - min_cm) / 40.0,
            dropout: 0.0,
        }
    }

    pub fn with_dropout(mut self, probability: f64) -> Self {
        self.dropout = probability.clamp(0.0, 1.0);
        self
    }
}

impl RangeSensor for SimulatedRangeSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn valid_range_cm(&self) -> (f32, f32) {
        self.range
    }

    fn read_cm(&mut self) -> Result<f32, HalError> {
        let mut rng = rand::thread_rng();
        if self.dropout > 0.0 && rng.gen_bool(self.dropout) {
            debug!("Simulated range sensor {} dropped a reading", self.name);
            return Err(HalError::Timeout);
        }

        let (min, max) = self.range;
        self.current += self.step;
        if self.current > max || self.current < min {
            self.step = -self.step;
            self.current = self.current.clamp(min, max);
        }
        let noise: f32 = rng.gen_range(-0.5..0.5);
        Ok((self.current + noise).max(0.0))
    }
}
