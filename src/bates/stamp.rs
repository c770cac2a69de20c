//! PDF stamping port and lopdf adapter.
//!
//! The stamper detects page rotation, computes a safe-area rectangle
//! inside a half-inch margin, and draws the label at a preset anchor,
//! optionally over a white backing rectangle for scan legibility.

use std::path::Path;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half inch in points.
const MARGIN: f32 = 36.0;
const FONT_SIZE: f32 = 10.0;
/// Mean Helvetica glyph width as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.6;
const FONT_KEY: &[u8] = b"RXBates";

#[derive(Debug, Error)]
pub enum StampError {
    #[error("pdf error: {0}")]
    Pdf(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Preset stamp anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    BottomRight,
    BottomCenter,
    TopRight,
}

/// Where one page's stamp landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageStamp {
    pub page: u32,
    pub label: String,
    /// [x, y, width, height] in PDF points.
    pub rect: [f32; 4],
    /// Detected page rotation in degrees.
    pub rotation: i32,
}

/// Stamping port; adapters own the PDF library.
pub trait StamperPort: Send + Sync {
    fn page_count(&self, input: &Path) -> Result<u32, StampError>;

    /// Stamp `labels[i]` onto page `i+1`, writing the result to `output`.
    fn stamp(
        &self,
        input: &Path,
        output: &Path,
        labels: &[String],
        anchor: Anchor,
        backing: bool,
    ) -> Result<Vec<PageStamp>, StampError>;
}

/// lopdf-backed stamper.
#[derive(Default)]
pub struct LopdfStamper;

impl StamperPort for LopdfStamper {
    fn page_count(&self, input: &Path) -> Result<u32, StampError> {
        let doc = Document::load(input).map_err(|e| StampError::Pdf(e.to_string()))?;
        Ok(doc.get_pages().len() as u32)
    }

    fn stamp(
        &self,
        input: &Path,
        output: &Path,
        labels: &[String],
        anchor: Anchor,
        backing: bool,
    ) -> Result<Vec<PageStamp>, StampError> {
        let mut doc = Document::load(input).map_err(|e| StampError::Pdf(e.to_string()))?;
        let pages = doc.get_pages();
        if pages.len() != labels.len() {
            return Err(StampError::Pdf(format!(
                "{} labels for {} pages",
                labels.len(),
                pages.len()
            )));
        }

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut results = Vec::with_capacity(labels.len());
        for ((page_num, page_id), label) in pages.into_iter().zip(labels.iter()) {
            let rotation = inherited_i64(&doc, page_id, b"Rotate").unwrap_or(0);
            let rotation = ((rotation % 360) + 360) % 360;
            let media = inherited_rect(&doc, page_id, b"MediaBox")
                .unwrap_or([0.0, 0.0, 612.0, 792.0]);
            let placement = place_label(label, anchor, rotation as i32, &media);

            let mut ops = String::new();
            if backing {
                let [bx, by, bw, bh] = placement.backing;
                ops.push_str(&format!(
                    "q 1 1 1 rg {:.2} {:.2} {:.2} {:.2} re f Q\n",
                    bx, by, bw, bh
                ));
            }
            let [a, b, c, d] = placement.text_matrix;
            ops.push_str(&format!(
                "q BT /{} {} Tf {} {} {} {} {:.2} {:.2} Tm ({}) Tj ET Q",
                String::from_utf8_lossy(FONT_KEY),
                FONT_SIZE,
                a,
                b,
                c,
                d,
                placement.origin.0,
                placement.origin.1,
                escape_pdf_string(label),
            ));

            append_content(&mut doc, page_id, ops.into_bytes())
                .map_err(|e| StampError::Pdf(e.to_string()))?;
            ensure_font(&mut doc, page_id, font_id).map_err(|e| StampError::Pdf(e.to_string()))?;

            results.push(PageStamp {
                page: page_num,
                label: label.clone(),
                rect: placement.backing,
                rotation: rotation as i32,
            });
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        doc.save(output).map_err(|e| StampError::Pdf(e.to_string()))?;
        Ok(results)
    }
}

struct Placement {
    /// Text origin in PDF space.
    origin: (f32, f32),
    /// Text matrix rotation components [a b c d].
    text_matrix: [f32; 4],
    /// Backing rectangle [x, y, w, h] in PDF space.
    backing: [f32; 4],
}

/// Compute where the label goes, honoring page rotation so the stamp
/// reads upright in the viewer.
fn place_label(label: &str, anchor: Anchor, rotation: i32, media: &[f32; 4]) -> Placement {
    let width = media[2] - media[0];
    let height = media[3] - media[1];
    // Visual (as-displayed) dimensions.
    let (vis_w, vis_h) = match rotation {
        90 | 270 => (height, width),
        _ => (width, height),
    };
    let text_w = label.len() as f32 * FONT_SIZE * GLYPH_WIDTH;

    // Anchor in visual coordinates, inside the safe margin.
    let (u, v) = match anchor {
        Anchor::BottomRight => (vis_w - MARGIN - text_w, MARGIN),
        Anchor::BottomCenter => ((vis_w - text_w) / 2.0, MARGIN),
        Anchor::TopRight => (vis_w - MARGIN - text_w, vis_h - MARGIN - FONT_SIZE),
    };

    // Map visual coordinates back into PDF space and rotate the text
    // matrix to counter the page rotation.
    let to_pdf = |u: f32, v: f32| -> (f32, f32) {
        match rotation {
            90 => (media[0] + width - v, media[1] + u),
            180 => (media[0] + width - u, media[1] + height - v),
            270 => (media[0] + v, media[1] + height - u),
            _ => (media[0] + u, media[1] + v),
        }
    };
    let text_matrix = match rotation {
        90 => [0.0, 1.0, -1.0, 0.0],
        180 => [-1.0, 0.0, 0.0, -1.0],
        270 => [0.0, -1.0, 1.0, 0.0],
        _ => [1.0, 0.0, 0.0, 1.0],
    };

    let origin = to_pdf(u, v);
    let pad = 2.0;
    let c1 = to_pdf(u - pad, v - pad);
    let c2 = to_pdf(u + text_w + pad, v + FONT_SIZE + pad);
    let backing = [
        c1.0.min(c2.0),
        c1.1.min(c2.1),
        (c2.0 - c1.0).abs(),
        (c2.1 - c1.1).abs(),
    ];

    Placement {
        origin,
        text_matrix,
        backing,
    }
}

/// Walk the page tree for an inherited attribute.
pub(crate) fn inherited_object(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..16 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => current = *parent,
            _ => return None,
        }
    }
    None
}

/// Walk the page tree for an inherited integer attribute.
fn inherited_i64(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<i64> {
    object_as_i64(&inherited_object(doc, page_id, key)?)
}

/// Walk the page tree for an inherited rectangle attribute.
pub(crate) fn inherited_rect(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<[f32; 4]> {
    let value = inherited_object(doc, page_id, key)?;
    let array = value.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }
    let mut rect = [0.0f32; 4];
    for (i, item) in array.iter().enumerate() {
        rect[i] = object_as_f32(item)?;
    }
    Some(rect)
}

fn object_as_i64(object: &Object) -> Option<i64> {
    match object {
        Object::Integer(i) => Some(*i),
        Object::Real(f) => Some(*f as i64),
        _ => None,
    }
}

fn object_as_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

/// Append a content stream to a page, preserving existing streams.
fn append_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> lopdf::Result<()> {
    let stream_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_dict = doc.get_dictionary(page_id)?.clone();
    let mut contents: Vec<Object> = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => vec![Object::Reference(*id)],
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    contents.push(Object::Reference(stream_id));
    let mut updated = page_dict;
    updated.set("Contents", Object::Array(contents));
    doc.objects.insert(page_id, Object::Dictionary(updated));
    Ok(())
}

/// Make the stamp font reachable from the page's resources.
fn ensure_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> lopdf::Result<()> {
    let page_dict = doc.get_dictionary(page_id)?.clone();
    let mut resources: Dictionary = match page_dict.get(b"Resources") {
        Ok(Object::Dictionary(d)) => d.clone(),
        Ok(Object::Reference(id)) => doc.get_dictionary(*id)?.clone(),
        _ => Dictionary::new(),
    };
    let mut fonts: Dictionary = match resources.get(b"Font") {
        Ok(Object::Dictionary(d)) => d.clone(),
        Ok(Object::Reference(id)) => doc.get_dictionary(*id)?.clone(),
        _ => Dictionary::new(),
    };
    fonts.set(FONT_KEY, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(fonts));
    let mut updated = page_dict;
    updated.set("Resources", Object::Dictionary(resources));
    doc.objects.insert(page_id, Object::Dictionary(updated));
    Ok(())
}

fn escape_pdf_string(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}
