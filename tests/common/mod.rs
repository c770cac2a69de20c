//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;

use lopdf::{dictionary, Document, Object, Stream};
use rexlit::config::Settings;

/// Settings rooted in a scratch home with all directories created.
pub fn scratch_settings(dir: &Path) -> Settings {
    let settings = Settings::with_home(dir.join("home"));
    settings.ensure_directories().unwrap();
    settings
}

/// Write a minimal n-page PDF with one text line per page.
pub fn write_pdf(path: &Path, n_pages: usize, line: &str) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let mut kids: Vec<Object> = Vec::new();
    for i in 0..n_pages {
        let content = format!(
            "BT /F1 12 Tf 72 720 Td ({} page {}) Tj ET",
            line.replace('(', "[").replace(')', "]"),
            i + 1
        );
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
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
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
