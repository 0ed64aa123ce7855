//! Certificate layout – where each field lands on the template.
//!
//! Coordinates are in template units (inches on the stock template),
//! measured from the bottom-left corner of the page, and converted to PDF
//! points with [`CertificateLayout::points_per_unit`]. The anchors belong to
//! one specific template: swap the template and every number here has to be
//! re-measured.

use serde::{Deserialize, Serialize};

use crate::fonts::FontRole;
use crate::record::TextField;

/// Points per template unit on the stock template (1 inch = 72 pt).
pub const POINTS_PER_INCH: f32 = 72.0;

/// Teal used for the holder's name.
pub const NAME_COLOR: [f32; 3] = [0.055, 0.447, 0.439];

/// Black for everything else.
pub const TEXT_COLOR: [f32; 3] = [0.0, 0.0, 0.0];

/// The complete set of placements for one template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateLayout {
    #[serde(default = "CertificateLayout::default_scale")]
    pub points_per_unit: f32,
    pub text: Vec<TextSlot>,
    pub images: Vec<ImageSlot>,
}

/// A right-aligned text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSlot {
    pub field: TextField,
    /// Right edge of the drawn text.
    pub anchor_x: f32,
    /// Baseline.
    pub anchor_y: f32,
    pub font: FontRole,
    /// Font size in points.
    pub size: f32,
    /// RGB, each component in 0.0..=1.0.
    pub color: [f32; 3],
}

/// Where an image slot gets its pixels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// `photo_url` on the record.
    Photo,
    /// `qr_code_url` on the record.
    QrCode,
    /// The issuing authority's logo (`thelogo`).
    AuthorityLogo,
    /// The fixed instructions panel.
    Instructions,
}

/// A fixed image rectangle; `x`/`y` is the bottom-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSlot {
    pub source: ImageSource,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CertificateLayout {
    fn default_scale() -> f32 {
        POINTS_PER_INCH
    }

    /// Convert template units to PDF points.
    pub fn to_pt(&self, units: f32) -> f32 {
        units * self.points_per_unit
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

impl Default for CertificateLayout {
    /// Geometry of the stock US-Letter health certificate template.
    fn default() -> Self {
        let body = |field, anchor_x, anchor_y| TextSlot {
            field,
            anchor_x,
            anchor_y,
            font: FontRole::Body,
            size: 11.0,
            color: TEXT_COLOR,
        };
        Self {
            points_per_unit: POINTS_PER_INCH,
            text: vec![
                TextSlot {
                    field: TextField::Name,
                    anchor_x: 8.35,
                    anchor_y: 9.56,
                    font: FontRole::Display,
                    size: 18.7,
                    color: NAME_COLOR,
                },
                body(TextField::IdNumber, 8.2, 8.76),
                body(TextField::CertificateNumber, 8.2, 8.0),
                body(TextField::IssueDate, 8.2, 7.24),
                body(TextField::ProgramType, 8.2, 6.48),
                body(TextField::Nationality, 5.0, 8.76),
                body(TextField::Profession, 5.0, 8.0),
                body(TextField::ExpiryDate, 5.0, 7.24),
                body(TextField::ProgramEndDate, 5.0, 6.48),
            ],
            images: vec![
                ImageSlot {
                    source: ImageSource::Photo,
                    x: 0.22,
                    y: 8.32,
                    width: 1.62,
                    height: 1.61,
                },
                ImageSlot {
                    source: ImageSource::QrCode,
                    x: 0.22,
                    y: 6.42,
                    width: 1.62,
                    height: 1.61,
                },
                ImageSlot {
                    source: ImageSource::AuthorityLogo,
                    x: 5.85,
                    y: 10.0,
                    width: 0.8,
                    height: 0.84,
                },
                ImageSlot {
                    source: ImageSource::Instructions,
                    x: 0.0,
                    y: 0.4,
                    width: 8.5,
                    height: 5.35,
                },
            ],
        }
    }
}
