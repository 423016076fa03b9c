//! 测距传感器轮询线程
//!
//! 固定周期读取每个传感器：量程内的读数写入最新值并同步进同名的历史缓冲区；
//! 量程外记为 `OutOfRange`，读取失败记为 `Error`，二者都不写历史。

use crate::error::DriverError;
use crate::telemetry::{Distance, Metric, SensorReading, TelemetrySampler};
use crate::worker::{Worker, sleep_while_running};
use rover_hal::RangeSensor;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// 读取一次并分类
pub fn read_distance(sensor: &mut dyn RangeSensor) -> Distance {
    match sensor.read_cm() {
        Ok(cm) => {
            let distance = Distance::classify(cm, sensor.valid_range_cm());
            if distance == Distance::OutOfRange {
                debug!("{} reading {:.1} cm out of range", sensor.name(), cm);
            }
            distance
        },
        Err(e) => {
            warn!("Failed to read {}: {}", sensor.name(), e);
            Distance::Error
        },
    }
}

/// 轮询所有传感器一次
pub fn poll_once(sensors: &mut [Box<dyn RangeSensor>], telemetry: &TelemetrySampler) {
    for sensor in sensors.iter_mut() {
        let distance = read_distance(sensor.as_mut());
        let name = sensor.name();
        telemetry.record_sensor(name, SensorReading::now(distance));
        if let Distance::Valid(cm) = distance {
            telemetry.record(&Metric::sensor(name), cm);
        }
        trace!("{}: {:?}", name, distance);
    }
}

/// 启动传感器轮询线程
///
/// 传感器句柄由轮询线程独占，线程退出时释放。
pub fn spawn_sensor_poller(
    mut sensors: Vec<Box<dyn RangeSensor>>,
    telemetry: Arc<TelemetrySampler>,
    interval: Duration,
) -> Result<Worker, DriverError> {
    let names: Vec<String> = sensors.iter().map(|s| s.name().to_string()).collect();
    debug!("Polling range sensors {:?} every {:?}", names, interval);

    Worker::spawn("sensor-poller", move |running| {
        while running.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            poll_once(&mut sensors, &telemetry);
            sleep_while_running(&running, interval.saturating_sub(cycle_start.elapsed()));
        }
        trace!("Sensor poller loop exited");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::HalError;

    struct FixedSensor {
        name: &'static str,
        readings: Vec<Result<f32, ()>>,
    }

    impl RangeSensor for FixedSensor {
        fn name(&self) -> &str {
            self.name
        }

        fn valid_range_cm(&self) -> (f32, f32) {
            (2.0, 400.0)
        }

        fn read_cm(&mut self) -> Result<f32, HalError> {
            if self.readings.is_empty() {
                return Err(HalError::Timeout);
            }
            self.readings.remove(0).map_err(|_| HalError::Timeout)
        }
    }

    #[test]
    fn test_poll_once_classifies_and_mirrors() {
        let telemetry = TelemetrySampler::new(60, Duration::ZERO, 80.0);
        let mut sensors: Vec<Box<dyn RangeSensor>> = vec![Box::new(FixedSensor {
            name: "ultrasonic",
            readings: vec![Ok(55.0), Ok(500.0), Err(())],
        })];

        poll_once(&mut sensors, &telemetry);
        assert_eq!(
            telemetry.latest_sensor("ultrasonic").unwrap().distance,
            Distance::Valid(55.0)
        );

        poll_once(&mut sensors, &telemetry);
        assert_eq!(
            telemetry.latest_sensor("ultrasonic").unwrap().distance,
            Distance::OutOfRange
        );

        poll_once(&mut sensors, &telemetry);
        assert_eq!(
            telemetry.latest_sensor("ultrasonic").unwrap().distance,
            Distance::Error
        );

        // 只有有效读数进入历史
        assert_eq!(telemetry.snapshot(&Metric::sensor("ultrasonic")), vec![55.0]);
    }
}
