//! Page resource and content stream editing with lopdf
//!
//! Drawing onto an existing page never rewrites its original content streams.
//! The original content is isolated in a `q`/`Q` pair (once per page) and new
//! streams are appended after it, so anything the original content does to the
//! graphics state cannot leak into what we draw.

use std::collections::HashSet;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use crate::error::Result;

/// Page attributes a page may inherit from its ancestors in the page tree
pub const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Look up a page attribute, walking up the `Parent` chain when the page lacks it
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);
    let mut visited = HashSet::new();

    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

/// Resolve a page's effective Resources dictionary (dereferenced, possibly inherited)
fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited_attribute(doc, page_id, b"Resources") {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(res_id)) => doc
            .get_dictionary(res_id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    }
}

/// Add an XObject reference to a page's Resources under `name`
///
/// The page gets its own direct copy of the Resources dictionary so that
/// shared or inherited resources of other pages are left untouched.
pub fn add_xobject_to_page_resources(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    xobject_id: ObjectId,
) -> Result<()> {
    let mut resources = effective_resources(doc, page_id);

    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(xo)) => xo.clone(),
        Ok(Object::Reference(xo_id)) => doc
            .get_dictionary(*xo_id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    xobjects.set(name, Object::Reference(xobject_id));
    resources.set("XObject", Object::Dictionary(xobjects));

    let page_dict = doc.get_dictionary_mut(page_id)?;
    page_dict.set("Resources", Object::Dictionary(resources));

    Ok(())
}

/// Names already used in a page's XObject resources
fn xobject_names(doc: &Document, page_id: ObjectId) -> HashSet<Vec<u8>> {
    let resources = effective_resources(doc, page_id);
    let xobjects = match resources.get(b"XObject") {
        Ok(Object::Dictionary(xo)) => xo.clone(),
        Ok(Object::Reference(xo_id)) => doc
            .get_dictionary(*xo_id)
            .cloned()
            .unwrap_or_else(|_| Dictionary::new()),
        _ => Dictionary::new(),
    };
    xobjects.iter().map(|(name, _)| name.clone()).collect()
}

/// The page's content streams as a flat list of objects
///
/// `Contents` may be a single stream reference, an array, or a reference to an array.
fn content_entries(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>> {
    let page_dict = doc.get_dictionary(page_id)?;

    let entries = match page_dict.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(arr)) => arr.clone(),
        _ => vec![],
    };

    Ok(entries)
}

/// Prepend a content stream to a page's Contents
pub fn prepend_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let mut contents = content_entries(doc, page_id)?;
    contents.insert(0, Object::Reference(new_content_id));

    let page_dict = doc.get_dictionary_mut(page_id)?;
    page_dict.set("Contents", Object::Array(contents));

    Ok(())
}

/// Append a content stream to a page's Contents
///
/// Appended content is drawn on top of the page's existing content.
pub fn append_content_to_page(doc: &mut Document, page_id: ObjectId, new_content_id: ObjectId) -> Result<()> {
    let mut contents = content_entries(doc, page_id)?;
    contents.push(Object::Reference(new_content_id));

    let page_dict = doc.get_dictionary_mut(page_id)?;
    page_dict.set("Contents", Object::Array(contents));

    Ok(())
}

/// A 2D affine transformation `[a b c d e f]` as used by the `cm` operator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Matrix {
    /// Scale by `(sx, sy)` then translate by `(tx, ty)`
    pub fn scale_translate(sx: f32, sy: f32, tx: f32, ty: f32) -> Self {
        Self { a: sx, b: 0.0, c: 0.0, d: sy, e: tx, f: ty }
    }

    fn to_operator(self) -> String {
        format!(
            "{} {} {} {} {} {} cm",
            format_number(self.a),
            format_number(self.b),
            format_number(self.c),
            format_number(self.d),
            format_number(self.e),
            format_number(self.f),
        )
    }
}

/// Format a number for a content stream without exponent or trailing zeros
pub fn format_number(value: f32) -> String {
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Draws XObjects on top of existing pages
///
/// Tracks which pages already had their original content isolated so the
/// `q`/`Q` wrapping happens once per page no matter how much is drawn.
#[derive(Debug, Default)]
pub struct PageCanvas {
    isolated: HashSet<ObjectId>,
    counter: usize,
}

impl PageCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paint `xobject_id` on `page_id` with the given transformation
    pub fn draw_xobject(
        &mut self,
        doc: &mut Document,
        page_id: ObjectId,
        xobject_id: ObjectId,
        matrix: Matrix,
    ) -> Result<()> {
        self.isolate_page_content(doc, page_id)?;

        let used = xobject_names(doc, page_id);
        let name = loop {
            self.counter += 1;
            let candidate = format!("Stamp{}", self.counter);
            if !used.contains(candidate.as_bytes()) {
                break candidate;
            }
        };
        add_xobject_to_page_resources(doc, page_id, &name, xobject_id)?;

        let invoke_content = format!("q\n{}\n/{} Do\nQ\n", matrix.to_operator(), name);
        let content_stream_id = doc.add_object(Stream::new(
            Dictionary::new(),
            invoke_content.into_bytes(),
        ));
        append_content_to_page(doc, page_id, content_stream_id)
    }

    fn isolate_page_content(&mut self, doc: &mut Document, page_id: ObjectId) -> Result<()> {
        if self.isolated.contains(&page_id) {
            return Ok(());
        }

        if !content_entries(doc, page_id)?.is_empty() {
            let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
            prepend_content_to_page(doc, page_id, save_id)?;
            append_content_to_page(doc, page_id, restore_id)?;
        }

        self.isolated.insert(page_id);
        Ok(())
    }
}

/// Use Helvetica (one of the standard 14 PDF fonts, nothing to embed)
pub fn use_helvetica_font(doc: &mut Document) -> ObjectId {
    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));

    doc.add_object(Object::Dictionary(font))
}

/// Encode text as the body of a PDF literal string for a WinAnsi font
///
/// Characters outside Latin-1 become `?`. Delimiters and backslashes are escaped.
pub fn encode_pdf_literal(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let byte = u8::try_from(u32::from(ch)).unwrap_or(b'?');
        match byte {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\n' => out.extend_from_slice(b"\\n"),
            _ => out.push(byte),
        }
    }
    out
}

/// Estimate text width for Helvetica
fn average_char_width(font_size: f32) -> f32 {
    // Roughly 0.5 em per character across mixed-case Latin text
    font_size * 0.5
}

/// Estimate the rendered width of `text` at `font_size`
pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * average_char_width(font_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_page_doc(content: &[u8]) -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut resources = Dictionary::new();
        resources.set("ProcSet", Object::Array(vec![Object::Name(b"PDF".to_vec())]));

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Resources", Object::Dictionary(resources));
        pages.set("MediaBox", Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ]));

        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        let page_id = doc.add_object(Object::Dictionary(page));

        pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages.set("Count", Object::Integer(1));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(Object::Dictionary(catalog));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        (doc, page_id)
    }

    #[test]
    fn test_inherited_attribute_walks_parents() {
        let (doc, page_id) = single_page_doc(b"");
        let media_box = inherited_attribute(&doc, page_id, b"MediaBox").unwrap();
        assert_eq!(media_box.as_array().unwrap().len(), 4);
        assert!(inherited_attribute(&doc, page_id, b"Rotate").is_none());
    }

    #[test]
    fn test_draw_isolates_original_content_once() {
        let (mut doc, page_id) = single_page_doc(b"2 0 0 2 0 0 cm");
        let xobject_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));

        let mut canvas = PageCanvas::new();
        let matrix = Matrix::scale_translate(10.0, 20.0, 30.0, 40.0);
        canvas.draw_xobject(&mut doc, page_id, xobject_id, matrix).unwrap();
        canvas.draw_xobject(&mut doc, page_id, xobject_id, matrix).unwrap();

        let contents = content_entries(&doc, page_id).unwrap();
        // q, original, Q, first draw, second draw
        assert_eq!(contents.len(), 5);

        let first = contents[0].as_reference().unwrap();
        let first_stream = doc.get_object(first).unwrap().as_stream().unwrap();
        assert_eq!(first_stream.content, b"q\n");

        let last = contents[4].as_reference().unwrap();
        let last_stream = doc.get_object(last).unwrap().as_stream().unwrap();
        let text = String::from_utf8_lossy(&last_stream.content);
        assert!(text.contains("10 0 0 20 30 40 cm"));
        assert!(text.contains("/Stamp2 Do"));
    }

    #[test]
    fn test_xobject_resources_keep_inherited_entries() {
        let (mut doc, page_id) = single_page_doc(b"");
        let xobject_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        add_xobject_to_page_resources(&mut doc, page_id, "Img", xobject_id).unwrap();

        let page = doc.get_dictionary(page_id).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.has(b"ProcSet"));
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert_eq!(xobjects.get(b"Img").unwrap().as_reference().unwrap(), xobject_id);
    }

    #[test]
    fn test_encode_pdf_literal() {
        assert_eq!(encode_pdf_literal("a(b)c\\"), b"a\\(b\\)c\\\\".to_vec());
        assert_eq!(encode_pdf_literal("caf\u{e9}"), vec![b'c', b'a', b'f', 0xe9]);
        assert_eq!(encode_pdf_literal("\u{4e2d}"), b"?".to_vec());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(612.25), "612.25");
    }
}
