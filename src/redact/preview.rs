//! Side-by-side comparison rendering for redaction previews.
//!
//! Each comparison page places the original page on the left and the
//! redacted page on the right, so reviewers can check every burn before
//! a final apply. Source pages are imported as Form XObjects, which keeps
//! their fonts and graphics intact.

use std::path::Path;

use lopdf::{dictionary, Document, Object, Stream};

use crate::bates::StampError;

/// Render a comparison PDF at `output` from an original and its redacted
/// counterpart. Neither input is modified.
pub fn compose_side_by_side(
    original: &Path,
    redacted: &Path,
    output: &Path,
) -> Result<(), StampError> {
    let mut left = Document::load(original).map_err(|e| StampError::Pdf(e.to_string()))?;
    let mut right = Document::load(redacted).map_err(|e| StampError::Pdf(e.to_string()))?;

    let mut out = Document::with_version("1.5");
    let left_panels = import_as_forms(&mut out, &mut left)?;
    let right_panels = import_as_forms(&mut out, &mut right)?;

    let pages_id = out.new_object_id();
    let mut kids: Vec<Object> = Vec::new();
    let sheet_count = left_panels.len().max(right_panels.len());
    for i in 0..sheet_count {
        let left_panel = left_panels.get(i);
        let right_panel = right_panels.get(i);
        // A missing side (page-count mismatch) leaves its half blank.
        let left_width = left_panel.map(|p| p.width).unwrap_or(612.0);
        let right_width = right_panel.map(|p| p.width).unwrap_or(left_width);
        let height = left_panel
            .map(|p| p.height)
            .unwrap_or(0.0)
            .max(right_panel.map(|p| p.height).unwrap_or(0.0))
            .max(1.0);

        let mut ops = String::new();
        let mut xobjects = lopdf::Dictionary::new();
        if let Some(panel) = left_panel {
            xobjects.set("L", Object::Reference(panel.form_id));
            ops.push_str(&format!(
                "q 1 0 0 1 {:.2} {:.2} cm /L Do Q\n",
                -panel.origin.0, -panel.origin.1
            ));
        }
        if let Some(panel) = right_panel {
            xobjects.set("R", Object::Reference(panel.form_id));
            ops.push_str(&format!(
                "q 1 0 0 1 {:.2} {:.2} cm /R Do Q\n",
                left_width - panel.origin.0,
                -panel.origin.1
            ));
        }
        let content_id = out.add_object(Stream::new(dictionary! {}, ops.into_bytes()));
        let page_id = out.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(left_width + right_width),
                Object::Real(height),
            ],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    out.save(output).map_err(|e| StampError::Pdf(e.to_string()))?;
    Ok(())
}

struct Panel {
    form_id: lopdf::ObjectId,
    width: f32,
    height: f32,
    origin: (f32, f32),
}

/// Import every page of `src` into `out` as a Form XObject, carrying the
/// page's resources along. The source's object graph is renumbered past
/// `out`'s current ids so references stay valid.
fn import_as_forms(out: &mut Document, src: &mut Document) -> Result<Vec<Panel>, StampError> {
    src.renumber_objects_with(out.max_id + 1);
    out.max_id = src.max_id;

    let mut panels = Vec::new();
    for (_, page_id) in src.get_pages() {
        let content = src
            .get_page_content(page_id)
            .map_err(|e| StampError::Pdf(e.to_string()))?;
        let media = crate::bates::stamp::inherited_rect(src, page_id, b"MediaBox")
            .unwrap_or([0.0, 0.0, 612.0, 792.0]);
        let resources =
            crate::bates::stamp::inherited_object(src, page_id, b"Resources")
                .unwrap_or_else(|| Object::Dictionary(lopdf::Dictionary::new()));

        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![
                    Object::Real(media[0]),
                    Object::Real(media[1]),
                    Object::Real(media[2]),
                    Object::Real(media[3]),
                ],
                "Resources" => resources,
            },
            content,
        );
        panels.push(Panel {
            form_id: out.add_object(form),
            width: media[2] - media[0],
            height: media[3] - media[1],
            origin: (media[0], media[1]),
        });
    }

    // Bring the renumbered object graph across so resource references
    // resolve in the output document.
    out.objects.extend(src.objects.clone());
    Ok(panels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::StringFormat;

    fn write_pdf(path: &Path, pages: usize, line: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            line.as_bytes().to_vec(),
                            StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page", "Parent" => pages_id, "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog", "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_comparison_has_double_width_pages() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("orig.pdf");
        let redacted = dir.path().join("red.pdf");
        let output = dir.path().join("compare.pdf");
        write_pdf(&original, 2, "original text");
        write_pdf(&redacted, 2, "redacted text");

        compose_side_by_side(&original, &redacted, &output).unwrap();

        let doc = Document::load(&output).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        let (_, page_id) = pages.into_iter().next().unwrap();
        let media =
            crate::bates::stamp::inherited_rect(&doc, page_id, b"MediaBox").unwrap();
        assert!((media[2] - media[0] - 1224.0).abs() < 0.01);
        assert!((media[3] - media[1] - 792.0).abs() < 0.01);

        // Both panels' text survives in the comparison artifact.
        let bytes = std::fs::read(&output).unwrap();
        let has = |needle: &[u8]| bytes.windows(needle.len()).any(|w| w == needle);
        assert!(has(b"original text"));
        assert!(has(b"redacted text"));
    }

    #[test]
    fn test_page_count_mismatch_leaves_blank_half() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("orig.pdf");
        let redacted = dir.path().join("red.pdf");
        let output = dir.path().join("compare.pdf");
        write_pdf(&original, 3, "original");
        write_pdf(&redacted, 2, "redacted");

        compose_side_by_side(&original, &redacted, &output).unwrap();
        let doc = Document::load(&output).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
    }

    #[test]
    fn test_inputs_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("orig.pdf");
        let redacted = dir.path().join("red.pdf");
        write_pdf(&original, 1, "original");
        write_pdf(&redacted, 1, "redacted");
        let before = std::fs::read(&original).unwrap();

        compose_side_by_side(&original, &redacted, &dir.path().join("compare.pdf")).unwrap();
        assert_eq!(std::fs::read(&original).unwrap(), before);
    }
}
