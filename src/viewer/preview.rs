//! 预览降采样。
//!
//! 帧宽或高超过 `max_dimension` 时按比例缩小后再显示，优先使用
//! `fast_image_resize`，失败时回退到 `image::imageops::resize`。

use std::borrow::Cow;

use fast_image_resize as fr;
use image::GrayImage;
use image::imageops::FilterType;

use crate::config::PreviewConfig;
use crate::error::PlayError;

/// 计算预览尺寸；不需要缩小时返回 `None`。
pub(super) fn preview_size(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }

    let scale = (max_dimension as f64 / width as f64).min(max_dimension as f64 / height as f64);
    let target_width = ((width as f64 * scale).floor() as u32).max(1);
    let target_height = ((height as f64 * scale).floor() as u32).max(1);

    Some((target_width, target_height))
}

/// 返回适合在预览窗口中显示的帧。
pub(super) fn fit_for_preview<'a>(frame: &'a GrayImage, config: &PreviewConfig) -> Cow<'a, GrayImage> {
    let Some((target_width, target_height)) =
        preview_size(frame.width(), frame.height(), config.max_dimension)
    else {
        return Cow::Borrowed(frame);
    };

    match resize_with_fast_image_resize(frame, target_width, target_height, config.resize_filter) {
        Ok(resized) => Cow::Owned(resized),
        Err(err) => {
            log::warn!(
                "⚠️ fast_image_resize 降采样失败，回退 image::imageops::resize：{}",
                err
            );
            Cow::Owned(image::imageops::resize(
                frame,
                target_width,
                target_height,
                config.resize_filter,
            ))
        }
    }
}

fn resize_with_fast_image_resize(
    frame: &GrayImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<GrayImage, PlayError> {
    let src_image = fr::images::Image::from_vec_u8(
        frame.width(),
        frame.height(),
        frame.as_raw().clone(),
        fr::PixelType::U8,
    )
    .map_err(|e| PlayError::Display(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| PlayError::Display(format!("fast_image_resize 执行失败：{}", e)))?;

    GrayImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| PlayError::Display("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}
