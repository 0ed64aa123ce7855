//! Verification QR codes. The code encodes `<origin>/verify/<id>`, the
//! public page where a printed certificate can be checked.

use std::io::Cursor;

use ::image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};

use crate::error::QrError;

/// Pixels per QR module.
const MODULE_PX: u32 = 8;

/// Light border around the symbol, in modules.
const QUIET_ZONE: u32 = 4;

/// Public verification URL for a certificate id.
pub fn verification_url(origin: &str, id: &str) -> String {
    format!("{}/verify/{}", origin.trim_end_matches('/'), id)
}

/// Render `data` as a black-on-white QR code PNG.
pub fn qr_png(data: &str) -> Result<Vec<u8>, QrError> {
    let code = QrCode::with_error_correction_level(data, EcLevel::M)
        .map_err(|e| QrError::Encode(e.to_string()))?;

    let modules = code.width() as u32;
    let side = (modules + 2 * QUIET_ZONE) * MODULE_PX;
    let mut img = GrayImage::from_pixel(side, side, Luma([255]));

    for (y, row) in code.to_colors().chunks(modules as usize).enumerate() {
        for (x, &module) in row.iter().enumerate() {
            if module != Color::Dark {
                continue;
            }
            let x0 = (QUIET_ZONE + x as u32) * MODULE_PX;
            let y0 = (QUIET_ZONE + y as u32) * MODULE_PX;
            for dy in 0..MODULE_PX {
                for dx in 0..MODULE_PX {
                    img.put_pixel(x0 + dx, y0 + dy, Luma([0]));
                }
            }
        }
    }

    let mut out = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| QrError::Image(e.to_string()))?;
    Ok(out)
}
