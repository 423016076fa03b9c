//! 叠加层（Annotation）
//!
//! 采集线程在编码前对图像执行可插拔的叠加处理，由 `toggle_annotation()` 开关控制。
//!
//! # 性能要求
//!
//! 叠加在采集线程内同步执行，耗时直接计入帧周期；实现应只做像素绘制，
//! 需要模型推理等重计算时应在外部异步完成后只把结果交给叠加层绘制。

use image::{Rgb, RgbImage};

/// 叠加时可用的上下文
#[derive(Debug, Clone, Copy)]
pub struct AnnotationContext {
    /// 帧序号（从 0 开始）
    pub sequence: u64,
    /// 最近一个统计窗口的帧率
    pub fps: f64,
}

/// 叠加层 Trait
pub trait FrameAnnotator: Send {
    /// 在图像上绘制（原地修改）
    fn annotate(&mut self, image: &mut RgbImage, ctx: &AnnotationContext);
}

impl<F> FrameAnnotator for F
where
    F: FnMut(&mut RgbImage, &AnnotationContext) + Send,
{
    fn annotate(&mut self, image: &mut RgbImage, ctx: &AnnotationContext) {
        self(image, ctx)
    }
}

/// 内置叠加层：中心十字准星 + 顶部状态条
///
/// 状态条宽度随帧率变化（以 30 fps 为满宽），用于在画面上直观地看到采集节奏。
#[derive(Debug, Clone)]
pub struct CrosshairAnnotator {
    color: Rgb<u8>,
    arm: u32,
}

impl CrosshairAnnotator {
    pub fn new() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            arm: 12,
        }
    }

    pub fn with_color(mut self, rgb: [u8; 3]) -> Self {
        self.color = Rgb(rgb);
        self
    }
}

impl Default for CrosshairAnnotator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnnotator for CrosshairAnnotator {
    fn annotate(&mut self, image: &mut RgbImage, ctx: &AnnotationContext) {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return;
        }

        let (cx, cy) = (w / 2, h / 2);
        let x0 = cx.saturating_sub(self.arm);
        let x1 = (cx + self.arm).min(w - 1);
        let y0 = cy.saturating_sub(self.arm);
        let y1 = (cy + self.arm).min(h - 1);
        for x in x0..=x1 {
            image.put_pixel(x, cy, self.color);
        }
        for y in y0..=y1 {
            image.put_pixel(cx, y, self.color);
        }

        let bar_h = (h / 60).clamp(1, 4);
        let ratio = (ctx.fps / 30.0).clamp(0.0, 1.0);
        let bar_w = (w as f64 * ratio).round() as u32;
        for y in 0..bar_h {
            for x in 0..bar_w.min(w) {
                image.put_pixel(x, y, self.color);
            }
        }
    }
}
