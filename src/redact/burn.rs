//! PDF redaction burning.
//!
//! Removes text-show operators whose text position falls inside a
//! redaction rectangle, then paints an opaque black box over the region.
//! The original strings are gone from the output content stream; the box
//! is cosmetic, not the mechanism.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use super::RedactionRegion;
use crate::bates::StampError;

/// Burn `regions` (grouped by 1-based page number) into a copy of
/// `input` written at `output`.
pub fn burn_pdf(
    input: &Path,
    output: &Path,
    regions: &[RedactionRegion],
) -> Result<(), StampError> {
    let mut doc = Document::load(input).map_err(|e| StampError::Pdf(e.to_string()))?;
    let pages = doc.get_pages();

    for (page_num, page_id) in pages {
        let page_regions: Vec<&RedactionRegion> =
            regions.iter().filter(|r| r.page == page_num).collect();
        if page_regions.is_empty() {
            continue;
        }
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| StampError::Pdf(e.to_string()))?;
        let content =
            Content::decode(&data).map_err(|e| StampError::Pdf(e.to_string()))?;
        let mut kept = strip_text_in_regions(content.operations, &page_regions);

        for region in &page_regions {
            let [x, y, w, h] = region.rect;
            kept.push(Operation::new("q", vec![]));
            kept.push(Operation::new("rg", vec![0.into(), 0.into(), 0.into()]));
            kept.push(Operation::new(
                "re",
                vec![
                    Object::Real(x),
                    Object::Real(y),
                    Object::Real(w),
                    Object::Real(h),
                ],
            ));
            kept.push(Operation::new("f", vec![]));
            kept.push(Operation::new("Q", vec![]));
        }

        let encoded = Content { operations: kept }
            .encode()
            .map_err(|e| StampError::Pdf(e.to_string()))?;
        let stream_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_dict = doc
            .get_dictionary(page_id)
            .map_err(|e| StampError::Pdf(e.to_string()))?
            .clone();
        // Drop the original content objects so the redacted strings do
        // not survive as orphans in the output file.
        let old_streams: Vec<lopdf::ObjectId> = match page_dict.get(b"Contents") {
            Ok(Object::Reference(id)) => vec![*id],
            Ok(Object::Array(items)) => items
                .iter()
                .filter_map(|o| match o {
                    Object::Reference(id) => Some(*id),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        for id in old_streams {
            doc.objects.remove(&id);
        }
        let mut updated = page_dict;
        updated.set("Contents", Object::Reference(stream_id));
        doc.objects.insert(page_id, Object::Dictionary(updated));
    }

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    doc.save(output).map_err(|e| StampError::Pdf(e.to_string()))?;
    Ok(())
}

/// Drop text-showing operators positioned inside any region, tracking the
/// text line position through Tm/Td/TD/T*/TL.
fn strip_text_in_regions(
    operations: Vec<Operation>,
    regions: &[&RedactionRegion],
) -> Vec<Operation> {
    let mut kept = Vec::with_capacity(operations.len());
    let mut x = 0.0f32;
    let mut y = 0.0f32;
    let mut leading = 0.0f32;

    for op in operations {
        match op.operator.as_str() {
            "BT" => {
                x = 0.0;
                y = 0.0;
                kept.push(op);
            }
            "Tm" => {
                if op.operands.len() == 6 {
                    x = as_f32(&op.operands[4]).unwrap_or(x);
                    y = as_f32(&op.operands[5]).unwrap_or(y);
                }
                kept.push(op);
            }
            "Td" | "TD" => {
                if op.operands.len() == 2 {
                    let dx = as_f32(&op.operands[0]).unwrap_or(0.0);
                    let dy = as_f32(&op.operands[1]).unwrap_or(0.0);
                    x += dx;
                    y += dy;
                    if op.operator == "TD" {
                        leading = -dy;
                    }
                }
                kept.push(op);
            }
            "TL" => {
                leading = op.operands.first().and_then(as_f32).unwrap_or(leading);
                kept.push(op);
            }
            "T*" => {
                y -= leading;
                kept.push(op);
            }
            "Tj" | "TJ" | "'" | "\"" => {
                if op.operator == "'" || op.operator == "\"" {
                    y -= leading;
                }
                let inside = regions.iter().any(|r| {
                    let [rx, ry, rw, rh] = r.rect;
                    x >= rx && x <= rx + rw && y >= ry && y <= ry + rh
                });
                if !inside {
                    kept.push(op);
                }
            }
            _ => kept.push(op),
        }
    }
    kept
}

fn as_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}
