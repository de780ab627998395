use qrcode::{render::svg, EcLevel, QrCode};

use crate::error::{AppError, Result};

/// Renders a QR payload as a standalone SVG document.
pub fn render_svg(payload: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| AppError::Validation(format!("QR payload: {}", e)))?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}
