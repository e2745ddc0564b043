//! Builders for inserted images, signatures and stamps
//!
//! Each builder validates the host's input and returns one ready-made
//! [`SceneObject`]; nothing touches a scene until the session adds it.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{EditorResult, RasterError, ToolInputError};
use crate::geometry::{Color, Point, Rect};
use crate::render::{encode_png, Rasterizer};
use crate::scene::{FontDescriptor, ImageData, SceneObject, Shape, StampBorder, Style};
use crate::shapes::{measure_text, smooth_stroke, STAMP_BORDER_WIDTH};

/// Handwriting families offered for typed signatures
pub const SIGNATURE_FONTS: [&str; 6] = [
    "Brush Script MT",
    "Lucida Handwriting",
    "Segoe Script",
    "Comic Sans MS",
    "Pacifico",
    "Dancing Script",
];

/// Rotation applied to every preset stamp, in degrees
pub const PRESET_STAMP_ROTATION: f32 = -12.0;

/// Display format of stamp dates, e.g. "Oct 15, 2026"
pub const STAMP_DATE_FORMAT: &str = "%b %-d, %Y";

/// Typed signatures are drawn at twice the requested size
const TYPED_SIGNATURE_OVERSAMPLE: f32 = 2.0;
const TYPED_SIGNATURE_PAD_X: f32 = 60.0;
const TYPED_SIGNATURE_PAD_Y: f32 = 40.0;

/// Size of `width` x `height` scaled down to fit `max` on both axes
///
/// Images smaller than `max` keep their natural size.
pub fn fit_size(width: f32, height: f32, max: f32) -> (f32, f32) {
    if width <= 0.0 || height <= 0.0 {
        return (width.max(0.0), height.max(0.0));
    }
    let scale = (max / width).min(max / height).min(1.0);
    (width * scale, height * scale)
}

fn decode(bytes: Vec<u8>) -> Result<ImageData, ToolInputError> {
    if bytes.is_empty() {
        return Err(ToolInputError::InvalidImage("no image data".to_string()));
    }
    ImageData::from_encoded(bytes).map_err(|e| ToolInputError::InvalidImage(e.to_string()))
}

fn image_object(image: ImageData, size: (f32, f32), center: Point, opacity: f32) -> SceneObject {
    let (width, height) = size;
    SceneObject::new(
        Shape::Image {
            rect: Rect::new(center.x - width / 2.0, center.y - height / 2.0, width, height),
            image,
        },
        Style::stroke(Color::TRANSPARENT, 0.0).with_opacity(opacity),
    )
}

/// Image object for encoded PNG/JPEG `bytes`, fitted into `max_dimension`
/// and centred on `center`
pub fn build_image(bytes: Vec<u8>, center: Point, max_dimension: f32) -> Result<SceneObject, ToolInputError> {
    let image = decode(bytes)?;
    let size = fit_size(image.pixel_width as f32, image.pixel_height as f32, max_dimension);
    log::debug!(
        "image {}x{} placed at {:.0}x{:.0}",
        image.pixel_width,
        image.pixel_height,
        size.0,
        size.1
    );
    Ok(image_object(image, size, center, 1.0))
}

/// One stroke on the signature pad, in pad pixels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureStroke {
    pub points: Vec<Point>,
    pub color: Color,
    pub width: f32,
}

/// Where a signature comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SignatureSource {
    /// Strokes drawn on a transparent pad of the given pixel size
    Drawn {
        width: u32,
        height: u32,
        strokes: Vec<SignatureStroke>,
    },
    /// Name set in a handwriting font
    Typed {
        text: String,
        family: String,
        color: Color,
        size: f32,
    },
    /// Encoded image supplied by the user
    Uploaded {
        #[serde(with = "serde_bytes_base64")]
        bytes: Vec<u8>,
    },
}

impl SignatureSource {
    /// Typed signature in the first handwriting family
    pub fn typed(text: impl Into<String>) -> Self {
        SignatureSource::Typed {
            text: text.into(),
            family: SIGNATURE_FONTS[0].to_string(),
            color: Color::BLACK,
            size: 36.0,
        }
    }

    /// Flatten the signature into a transparent PNG
    pub fn rasterize(&self, rasterizer: &Rasterizer) -> EditorResult<Vec<u8>> {
        match self {
            SignatureSource::Drawn {
                width,
                height,
                strokes,
            } => {
                let inked: Vec<SceneObject> = strokes
                    .iter()
                    .filter(|s| !s.points.is_empty() && s.width > 0.0)
                    .map(stroke_object)
                    .collect();
                if inked.is_empty() {
                    return Err(ToolInputError::EmptySignature.into());
                }
                let pixmap = rasterizer.render_transparent(*width, *height, 1.0, &inked)?;
                Ok(encode_png(&pixmap)?)
            }
            SignatureSource::Typed {
                text,
                family,
                color,
                size,
            } => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(ToolInputError::EmptySignatureText.into());
                }
                let font = FontDescriptor {
                    family: family.clone(),
                    size: size * TYPED_SIGNATURE_OVERSAMPLE,
                    ..FontDescriptor::default()
                };
                let (text_width, text_height) = measure_text(text, &font);
                let width = (text_width + TYPED_SIGNATURE_PAD_X).ceil() as u32;
                let height = (font.size + TYPED_SIGNATURE_PAD_Y).ceil() as u32;
                let origin = Point::new(
                    (width as f32 - text_width) / 2.0,
                    (height as f32 - text_height) / 2.0,
                );
                let object = SceneObject::new(
                    Shape::Text {
                        origin,
                        content: text.to_string(),
                        font,
                    },
                    Style::stroke(*color, 0.0).with_fill(Some(*color)),
                );
                let pixmap = rasterizer.render_transparent(width, height, 1.0, [&object])?;
                Ok(encode_png(&pixmap)?)
            }
            SignatureSource::Uploaded { bytes } => {
                if bytes.is_empty() {
                    return Err(ToolInputError::InvalidImage("no signature image".to_string()).into());
                }
                let decoded = image::load_from_memory(bytes)
                    .map_err(|e| ToolInputError::InvalidImage(e.to_string()))?
                    .to_rgba8();
                let mut png = Vec::new();
                decoded
                    .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
                    .map_err(|e| RasterError::Encode(e.to_string()))?;
                Ok(png)
            }
        }
    }
}

fn stroke_object(stroke: &SignatureStroke) -> SceneObject {
    match stroke.points.as_slice() {
        // a tap leaves a dot
        [dot] => SceneObject::new(
            Shape::Ellipse {
                center: *dot,
                rx: stroke.width / 2.0,
                ry: stroke.width / 2.0,
            },
            Style::stroke(stroke.color, 0.0).with_fill(Some(stroke.color)),
        ),
        points => SceneObject::new(
            Shape::Path {
                segments: smooth_stroke(points),
            },
            Style::stroke(stroke.color, stroke.width),
        ),
    }
}

/// Signature image object: at most `max_width` wide, centred on `center`
pub fn build_signature(
    source: &SignatureSource,
    rasterizer: &Rasterizer,
    center: Point,
    max_width: f32,
    opacity: f32,
) -> EditorResult<SceneObject> {
    let png = source.rasterize(rasterizer)?;
    let image = decode(png)?;
    let (width, height) = (image.pixel_width as f32, image.pixel_height as f32);
    let scale = (max_width / width).min(1.0);
    Ok(image_object(image, (width * scale, height * scale), center, opacity))
}

/// Built-in stamps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StampPreset {
    Approved,
    Rejected,
    Draft,
    Confidential,
    Date,
}

impl StampPreset {
    pub const ALL: [StampPreset; 5] = [
        StampPreset::Approved,
        StampPreset::Rejected,
        StampPreset::Draft,
        StampPreset::Confidential,
        StampPreset::Date,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StampPreset::Approved => "approved",
            StampPreset::Rejected => "rejected",
            StampPreset::Draft => "draft",
            StampPreset::Confidential => "confidential",
            StampPreset::Date => "date",
        }
    }

    pub fn color(&self) -> Color {
        match self {
            StampPreset::Approved => Color::rgb(0x22, 0xc5, 0x5e),
            StampPreset::Rejected => Color::rgb(0xef, 0x44, 0x44),
            StampPreset::Draft => Color::rgb(0xf5, 0x9e, 0x0b),
            StampPreset::Confidential => Color::rgb(0x8b, 0x5c, 0xf6),
            StampPreset::Date => Color::rgb(0x3b, 0x82, 0xf6),
        }
    }

    pub fn text(&self, today: NaiveDate) -> String {
        match self {
            StampPreset::Approved => "APPROVED".to_string(),
            StampPreset::Rejected => "REJECTED".to_string(),
            StampPreset::Draft => "DRAFT".to_string(),
            StampPreset::Confidential => "CONFIDENTIAL".to_string(),
            StampPreset::Date => format_stamp_date(today),
        }
    }
}

impl fmt::Display for StampPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stamp: {0}")]
pub struct UnknownStamp(pub String);

impl FromStr for StampPreset {
    type Err = UnknownStamp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StampPreset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStamp(s.to_string()))
    }
}

/// What the stamp panel confirmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stamp", rename_all = "snake_case")]
pub enum StampSpec {
    Preset { preset: StampPreset },
    Custom {
        text: String,
        color: Color,
        /// Degrees
        #[serde(default)]
        rotation: f32,
        #[serde(default)]
        add_date: bool,
        #[serde(default)]
        border: StampBorder,
    },
}

impl From<StampPreset> for StampSpec {
    fn from(preset: StampPreset) -> Self {
        StampSpec::Preset { preset }
    }
}

pub fn format_stamp_date(date: NaiveDate) -> String {
    date.format(STAMP_DATE_FORMAT).to_string()
}

/// Stamp object centred on `center`
///
/// Custom text is upper-cased; `add_date` appends `today` on a second
/// line. Blank custom text is rejected.
pub fn build_stamp(
    spec: &StampSpec,
    center: Point,
    opacity: f32,
    today: NaiveDate,
) -> Result<SceneObject, ToolInputError> {
    let (text, color, rotation, border) = match spec {
        StampSpec::Preset { preset } => (
            preset.text(today),
            preset.color(),
            PRESET_STAMP_ROTATION,
            StampBorder::Rounded,
        ),
        StampSpec::Custom {
            text,
            color,
            rotation,
            add_date,
            border,
        } => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(ToolInputError::EmptyStampText);
            }
            let mut text = trimmed.to_uppercase();
            if *add_date {
                text.push('\n');
                text.push_str(&format_stamp_date(today));
            }
            (text, *color, *rotation, *border)
        }
    };

    Ok(SceneObject::new(
        Shape::Stamp {
            center,
            text,
            color,
            border,
        },
        Style::stroke(color, STAMP_BORDER_WIDTH).with_opacity(opacity),
    )
    .with_rotation(rotation))
}

mod serde_bytes_base64 {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(text.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
