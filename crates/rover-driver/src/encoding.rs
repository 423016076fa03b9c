//! 编码阶段：方向归一化 + JPEG 编码
//!
//! 传输层负责最终的分帧方式；这里额外提供 [`mjpeg_part`]，
//! 生成 `multipart/x-mixed-replace` 流的单个分段。

use crate::error::DriverError;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage, imageops};
use rover_hal::RawFrame;

/// MJPEG 分段边界
pub const MJPEG_BOUNDARY: &str = "frame";

/// 把原始帧转换为可绘制的图像，按需水平镜像
pub fn prepare_image(raw: RawFrame, mirror: bool) -> Result<RgbImage, DriverError> {
    let RawFrame {
        width,
        height,
        data,
    } = raw;
    let mut image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
        DriverError::Encode(format!(
            "failed to convert {}x{} frame into image buffer",
            width, height
        ))
    })?;
    if mirror {
        imageops::flip_horizontal_in_place(&mut image);
    }
    Ok(image)
}

/// JPEG 编码（质量钳制到 1-100）
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, DriverError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DriverError::Encode("empty frame".into()));
    }
    // 经验值：JPEG 通常不超过原始大小的 1/4
    let mut out = Vec::with_capacity(image.as_raw().len() / 4);
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode(image.as_raw(), width, height, ExtendedColorType::Rgb8)?;
    Ok(out)
}

/// 单个 MJPEG 分段：`--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut part = Vec::with_capacity(HEADER.len() + jpeg.len() + 2);
    part.extend_from_slice(HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}
