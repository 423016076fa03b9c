//! 车轮模拟
//!
//! 按固定的驾驶脚本切换 [`SharedDirection`]，并在轮子转动时以固定频率
//! 向左右编码器输入注入边沿。

use rover_driver::{DriverError, Worker};
use rover_hal::{DriveDirection, SharedDirection, SoftwareEdgeInput};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// 驾驶脚本中的一段
#[derive(Debug, Clone, Copy)]
enum Maneuver {
    Forward,
    TurnRight,
    TurnLeft,
    Backward,
    Stop,
}

impl Maneuver {
    fn apply(self, direction: &SharedDirection) {
        match self {
            Maneuver::Forward => direction.forward(),
            Maneuver::TurnRight => direction.turn_right(),
            Maneuver::TurnLeft => direction.turn_left(),
            Maneuver::Backward => direction.backward(),
            Maneuver::Stop => direction.stop(),
        }
    }
}

/// 循环执行的驾驶脚本
const SCRIPT: &[(Maneuver, Duration)] = &[
    (Maneuver::Forward, Duration::from_secs(3)),
    (Maneuver::TurnRight, Duration::from_millis(800)),
    (Maneuver::Forward, Duration::from_secs(2)),
    (Maneuver::TurnLeft, Duration::from_millis(800)),
    (Maneuver::Backward, Duration::from_secs(1)),
    (Maneuver::Stop, Duration::from_secs(1)),
];

/// 车轮模拟线程；停止或 drop 时 [`SharedDirection`] 回到停止状态
pub struct WheelSimulator {
    worker: Worker,
}

impl WheelSimulator {
    pub fn spawn(
        direction: Arc<SharedDirection>,
        left: SoftwareEdgeInput,
        right: SoftwareEdgeInput,
        tick_rate: u32,
    ) -> Result<Self, DriverError> {
        let period = Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1)));

        let worker = Worker::spawn("wheel-sim", move |running| {
            let mut step = 0usize;
            let mut segment_end = Instant::now();
            while running.load(Ordering::Acquire) {
                if Instant::now() >= segment_end {
                    let (maneuver, length) = SCRIPT[step % SCRIPT.len()];
                    maneuver.apply(&direction);
                    debug!("Wheel simulator: {:?} for {:?}", maneuver, length);
                    segment_end = Instant::now() + length;
                    step += 1;
                }

                let (l, r) = direction.current_directions();
                if l != 0 {
                    left.trigger();
                }
                if r != 0 {
                    right.trigger();
                }
                thread::sleep(period);
            }
            direction.stop();
        })?;

        Ok(Self { worker })
    }

    /// 停止并等待线程退出（可重复调用）
    pub fn stop(&mut self) {
        self.worker.stop();
    }
}
