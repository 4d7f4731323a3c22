use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use qrcode::{EcLevel, QrCode};
use tracing::{debug, warn};

use crate::config::ImageConfig;
use crate::error::DispatchError;

const DISPLAY_MARGIN_MODULES: u32 = 2;
const TRANSPORT_MARGIN_MODULES: u32 = 1;

/// Renders QR verification barcodes. Two variants share one rasterizer:
/// a display PNG for rich surfaces (email) and a size-capped JPEG for
/// MMS-class transports.
pub struct QrCodeEncoder {
    config: ImageConfig,
}

impl QrCodeEncoder {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// PNG at display size, error-correction level M, returned as a
    /// `data:` URI. No size cap on this path.
    pub fn encode_for_display(&self, payload: &str) -> Result<String, DispatchError> {
        debug!(payload_len = payload.len(), "Encoding display QR");

        let modules = Self::modules(payload, EcLevel::M)?;
        let image = Self::rasterize_gray(&modules, self.config.display_size, DISPLAY_MARGIN_MODULES);

        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(DispatchError::from)?;

        let bytes = buffer.into_inner();
        debug!(bytes = bytes.len(), "Display QR encoded");

        Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
    }

    /// JPEG variant for constrained transports, as a `data:` URI. See
    /// `encode_for_constrained_transport_bytes` for the size contract.
    pub fn encode_for_constrained_transport(&self, payload: &str) -> Result<String, DispatchError> {
        let bytes = self.encode_for_constrained_transport_bytes(payload)?;
        Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)))
    }

    /// Raw JPEG bytes at transport size, error-correction level L and
    /// minimal margin to keep the byte footprint down. Compresses at each
    /// quality in the ladder until the result fits the byte ceiling; if the
    /// ladder is exhausted the call fails rather than returning oversized
    /// output.
    pub fn encode_for_constrained_transport_bytes(
        &self,
        payload: &str,
    ) -> Result<Vec<u8>, DispatchError> {
        debug!(payload_len = payload.len(), "Encoding transport QR");

        let modules = Self::modules(payload, EcLevel::L)?;
        // JPEG carries no alpha channel; flatten onto an opaque white canvas.
        let image =
            Self::rasterize_rgb(&modules, self.config.transport_size, TRANSPORT_MARGIN_MODULES);

        let limit = self.config.max_transport_bytes;
        let mut last_len = 0;

        for (step, &quality) in self.config.quality_ladder.iter().enumerate() {
            let bytes = Self::compress_jpeg(&image, quality)?;
            last_len = bytes.len();

            if bytes.len() <= limit {
                debug!(bytes = bytes.len(), quality, "Transport QR encoded");
                return Ok(bytes);
            }

            warn!(
                bytes = bytes.len(),
                quality,
                step,
                limit,
                "QR image over byte ceiling, descending quality ladder"
            );
        }

        Err(DispatchError::SizeExceeded {
            limit,
            actual: last_len,
        })
    }

    fn modules(payload: &str, ec_level: EcLevel) -> Result<QrModules, DispatchError> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), ec_level)
            .map_err(|e| DispatchError::Encoding(e.to_string()))?;

        let width = code.width();
        let dark = code
            .to_colors()
            .iter()
            .map(|c| *c == qrcode::Color::Dark)
            .collect();

        Ok(QrModules { width, dark })
    }

    fn rasterize_gray(modules: &QrModules, target_size: u32, margin: u32) -> GrayImage {
        let geometry = Geometry::fit(modules.width as u32, target_size, margin);
        let mut image = GrayImage::from_pixel(geometry.dim, geometry.dim, Luma([255u8]));
        geometry.draw(modules, |x, y| image.put_pixel(x, y, Luma([0u8])));
        image
    }

    fn rasterize_rgb(modules: &QrModules, target_size: u32, margin: u32) -> RgbImage {
        let geometry = Geometry::fit(modules.width as u32, target_size, margin);
        let mut image = RgbImage::from_pixel(geometry.dim, geometry.dim, Rgb([255u8, 255, 255]));
        geometry.draw(modules, |x, y| image.put_pixel(x, y, Rgb([0u8, 0, 0])));
        image
    }

    fn compress_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, DispatchError> {
        let mut buffer = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder.encode_image(image).map_err(DispatchError::from)?;
        Ok(buffer.into_inner())
    }
}

struct QrModules {
    width: usize,
    dark: Vec<bool>,
}

/// Integer-scaled placement of a module matrix inside a square canvas of at
/// least `target` pixels, quiet zone included.
struct Geometry {
    dim: u32,
    scale: u32,
    offset: u32,
}

impl Geometry {
    fn fit(module_width: u32, target: u32, margin: u32) -> Self {
        let total = module_width + 2 * margin;
        let scale = (target / total).max(1);
        let dim = target.max(total * scale);
        let offset = (dim - module_width * scale) / 2;
        Self { dim, scale, offset }
    }

    fn draw(&self, modules: &QrModules, mut set_dark: impl FnMut(u32, u32)) {
        let width = modules.width as u32;
        for my in 0..width {
            for mx in 0..width {
                if !modules.dark[(my * width + mx) as usize] {
                    continue;
                }
                let px = self.offset + mx * self.scale;
                let py = self.offset + my * self.scale;
                for dy in 0..self.scale {
                    for dx in 0..self.scale {
                        set_dark(px + dx, py + dy);
                    }
                }
            }
        }
    }
}
