//! 测距传感器抽象

use crate::HalError;

/// 测距传感器（超声波、激光雷达等）
///
/// 总线句柄由唯一的轮询线程持有，实现无需 `Sync`。
pub trait RangeSensor: Send {
    /// 传感器名称（如 "ultrasonic"、"lidar"）
    fn name(&self) -> &str;

    /// 有效量程（厘米，闭区间）
    fn valid_range_cm(&self) -> (f32, f32);

    /// 读取一次距离（厘米）
    ///
    /// 量程检查由调用方完成，这里返回传感器给出的原始值。
    fn read_cm(&mut self) -> Result<f32, HalError>;
}

impl<T: RangeSensor + ?Sized> RangeSensor for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn valid_range_cm(&self) -> (f32, f32) {
        (**self).valid_range_cm()
    }

    fn read_cm(&mut self) -> Result<f32, HalError> {
        (**self).read_cm()
    }
}
