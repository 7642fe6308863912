//! Integration tests for the PDF utilities library

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdf_utils::pdf::{
    count_pages, merge, merge_pdfs, merge_with, read_metadata, stamp_pdf, AcroForm, MergeInput,
    MergeOptions, OutputOptions, Source, StampOptions, Stamper,
};
use pdf_utils::Error;
use std::io::Cursor;
use tempfile::TempDir;

/// Output options that keep streams readable in assertions
fn plain_output() -> OutputOptions {
    OutputOptions {
        compress: false,
        ..OutputOptions::default()
    }
}

/// Build a PDF whose pages each show "`label` page N"
fn numbered_pdf(label: &str, pages: u32) -> Vec<u8> {
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

    let mut kids = Vec::new();
    for number in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("{} page {}", label, number))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    // MediaBox and Resources are inherited from the page tree
    doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    }));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Build a one-page form with a text field "name" and an image field "photo"
fn form_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.6");
    let pages_id = doc.new_object_id();
    let page_id = doc.new_object_id();

    let name_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Tx",
        "T" => Object::string_literal("name"),
        "Rect" => vec![72.into(), 700.into(), 300.into(), 720.into()],
        "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
        "P" => page_id,
    });
    let photo_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Widget",
        "FT" => "Btn",
        "Ff" => 65536,
        "T" => Object::string_literal("photo"),
        "Rect" => vec![100.into(), 100.into(), 300.into(), 200.into()],
        "P" => page_id,
    });

    let content_id = doc.add_object(Stream::new(dictionary! {}, b"0 0 1 rg 50 50 10 10 re f".to_vec()));
    doc.objects.insert(page_id, Object::Dictionary(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
        "Annots" => vec![name_id.into(), photo_id.into()],
    }));
    doc.objects.insert(pages_id, Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    }));

    let helv_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => dictionary! {
            "Fields" => vec![name_id.into(), photo_id.into()],
            "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
            "DR" => dictionary! { "Font" => dictionary! { "Helv" => helv_id } },
        },
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A solid square PNG
fn square_png(side: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(side, side, image::Rgb([200, 30, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

fn page_text(doc: &Document, page_id: ObjectId) -> String {
    String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
}

/// Concatenated content of every stream in the document
fn all_stream_text(doc: &Document) -> String {
    let mut text = String::new();
    for object in doc.objects.values() {
        if let Object::Stream(stream) = object {
            let content = stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone());
            text.push_str(&String::from_utf8_lossy(&content));
        }
    }
    text
}

#[test]
fn test_merge_without_ranges_keeps_every_page() {
    let a = numbered_pdf("alpha", 2);
    let b = numbered_pdf("beta", 3);

    let merged = merge_with(
        vec![Source::from_bytes("a", &a), Source::from_bytes("b", &b)],
        &plain_output(),
    )
    .expect("Failed to merge");
    let doc = Document::load_mem(&merged).unwrap();

    let pages = page_ids(&doc);
    assert_eq!(pages.len(), 5);

    let expected = ["alpha page 1", "alpha page 2", "beta page 1", "beta page 2", "beta page 3"];
    for (page_id, marker) in pages.iter().zip(expected) {
        assert!(page_text(&doc, *page_id).contains(marker), "missing {}", marker);
    }
}

#[test]
fn test_merged_pages_match_source_content() {
    let source = numbered_pdf("gamma", 3);
    let source_doc = Document::load_mem(&source).unwrap();

    let merged = merge(vec![Source::from_bytes("gamma", &source)]).unwrap();
    let doc = Document::load_mem(&merged).unwrap();

    for (original, copied) in page_ids(&source_doc).into_iter().zip(page_ids(&doc)) {
        assert_eq!(
            source_doc.get_page_content(original).unwrap(),
            doc.get_page_content(copied).unwrap()
        );
    }
}

#[test]
fn test_merge_materializes_inherited_attributes() {
    let source = numbered_pdf("delta", 1);
    let merged = merge(vec![Source::from_bytes("delta", &source)]).unwrap();
    let doc = Document::load_mem(&merged).unwrap();

    let page = doc.get_dictionary(page_ids(&doc)[0]).unwrap();
    assert!(page.has(b"MediaBox"));
    assert!(page.has(b"Resources"));
}

#[test]
fn test_merge_page_range_order() {
    let source = numbered_pdf("doc", 6);
    let merged = merge_with(
        vec![Source::from_bytes("doc", &source).with_page_range("2,4-5")],
        &plain_output(),
    )
    .unwrap();
    let doc = Document::load_mem(&merged).unwrap();

    let texts: Vec<String> = page_ids(&doc).into_iter().map(|id| page_text(&doc, id)).collect();
    assert_eq!(texts.len(), 3);
    assert!(texts[0].contains("doc page 2"));
    assert!(texts[1].contains("doc page 4"));
    assert!(texts[2].contains("doc page 5"));
}

#[test]
fn test_merge_duplicate_pages() {
    let source = numbered_pdf("dup", 2);
    let merged = merge_with(
        vec![Source::from_bytes("dup", &source).with_page_range("2,1,2")],
        &plain_output(),
    )
    .unwrap();
    let doc = Document::load_mem(&merged).unwrap();

    let pages = page_ids(&doc);
    assert_eq!(pages.len(), 3);
    assert_ne!(pages[0], pages[2]);
    assert!(page_text(&doc, pages[0]).contains("dup page 2"));
    assert!(page_text(&doc, pages[2]).contains("dup page 2"));
}

/// The first annotation reference on a page, and the page its `/P` names
fn first_annotation(doc: &Document, page_id: ObjectId) -> (ObjectId, ObjectId) {
    let page = doc.get_dictionary(page_id).unwrap();
    let annots = page.get(b"Annots").unwrap().as_array().unwrap();
    let annot_id = annots[0].as_reference().unwrap();
    let owner = doc
        .get_dictionary(annot_id)
        .unwrap()
        .get(b"P")
        .unwrap()
        .as_reference()
        .unwrap();
    (annot_id, owner)
}

#[test]
fn test_merge_duplicate_page_gets_own_annotations() {
    let mut doc = Document::load_mem(&numbered_pdf("linked", 1)).unwrap();
    let page_id = page_ids(&doc)[0];
    let link_id = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Link",
        "Rect" => vec![72.into(), 700.into(), 200.into(), 730.into()],
        "P" => page_id,
    });
    doc.get_dictionary_mut(page_id)
        .unwrap()
        .set("Annots", Object::Array(vec![Object::Reference(link_id)]));
    let mut source = Vec::new();
    doc.save_to(&mut source).unwrap();

    let merged = merge(vec![Source::from_bytes("linked", &source).with_page_range("1,1")]).unwrap();
    let doc = Document::load_mem(&merged).unwrap();
    let pages = page_ids(&doc);
    assert_eq!(pages.len(), 2);

    let (first_annot, first_owner) = first_annotation(&doc, pages[0]);
    let (second_annot, second_owner) = first_annotation(&doc, pages[1]);
    assert_ne!(first_annot, second_annot);
    assert_eq!(first_owner, pages[0]);
    assert_eq!(second_owner, pages[1]);
}

#[test]
fn test_merge_range_out_of_bounds() {
    let source = numbered_pdf("short", 3);
    let err = merge(vec![Source::from_bytes("short", &source).with_page_range("1-10")]).unwrap_err();

    assert!(err.is_page_range_error(), "unexpected error: {:?}", err);
    assert!(matches!(err, Error::PageOutOfBounds { page: 10, total: 3, .. }));
}

#[test]
fn test_merge_malformed_range() {
    let source = numbered_pdf("bad", 3);
    let err = merge(vec![Source::from_bytes("bad", &source).with_page_range("3-1")]).unwrap_err();
    assert!(matches!(err, Error::InvalidPageRange { .. }));
}

#[test]
fn test_merge_no_sources() {
    let merged = merge(Vec::new()).expect("Empty merge should succeed");
    let doc = Document::load_mem(&merged).unwrap();
    assert_eq!(doc.get_pages().len(), 0);
}

#[test]
fn test_stamp_missing_field_is_noop() {
    let form = form_pdf();
    let mut stamper = Stamper::open(form.as_slice()).unwrap();
    stamper.set_text_field("nonexistent", "x").unwrap();
    assert!(stamper.stamp().is_ok());
}

#[test]
fn test_stamp_image_fits_widget() {
    let form = form_pdf();
    let mut stamper = Stamper::open_with(form.as_slice(), plain_output()).unwrap();
    stamper.set_image_field("photo", &square_png(10)).unwrap();
    let stamped = stamper.stamp().unwrap();

    let doc = Document::load_mem(stamped.as_bytes()).unwrap();
    let page_id = page_ids(&doc)[0];
    let content = page_text(&doc, page_id);

    assert!(content.contains("100 0 0 100 100 100 cm"), "content was: {}", content);
    // The original drawing survives, isolated from the stamp
    assert!(content.contains("50 50 10 10 re"));
}

#[test]
fn test_stamp_text_is_flattened() {
    let form = form_pdf();
    let mut stamper = Stamper::open_with(form.as_slice(), plain_output()).unwrap();
    stamper.set_text_field("name", "Ada Lovelace").unwrap();
    let stamped = stamper.stamp().unwrap();

    let doc = Document::load_mem(stamped.as_bytes()).unwrap();
    assert!(all_stream_text(&doc).contains("(Ada Lovelace) Tj"));
}

#[test]
fn test_stamp_removes_form() {
    let form = form_pdf();
    let mut stamper = Stamper::open(form.as_slice()).unwrap();
    assert_eq!(stamper.form().unwrap().len(), 2);

    stamper.set_text_field("name", "Ada").unwrap();
    let stamped = stamper.stamp().unwrap();

    let doc = Document::load_mem(stamped.as_bytes()).unwrap();
    assert!(AcroForm::load(&doc).unwrap().is_empty());
    assert!(!doc.catalog().unwrap().has(b"AcroForm"));

    let page = doc.get_dictionary(page_ids(&doc)[0]).unwrap();
    let annots = page.get(b"Annots").ok().and_then(|a| a.as_array().ok().cloned());
    assert!(annots.map_or(true, |a| a.is_empty()));
}

#[test]
fn test_session_closed_after_stamp() {
    let form = form_pdf();
    let mut stamper = Stamper::open(form.as_slice()).unwrap();
    stamper.stamp().unwrap();

    let err = stamper.set_text_field("name", "late").err().unwrap();
    assert!(matches!(err, Error::SessionClosed { .. }));

    stamper.dispose();
    stamper.dispose();
    assert!(!stamper.is_open());
}

#[test]
fn test_stamp_rejects_bad_image() {
    let form = form_pdf();
    let mut stamper = Stamper::open(form.as_slice()).unwrap();
    let err = stamper.set_image_field("photo", b"definitely not an image").err().unwrap();
    assert!(matches!(err, Error::ImageDecode(_)));

    // The session stays usable after a failed setter
    assert!(stamper.is_open());
    stamper.dispose();
}

#[test]
fn test_stamped_output_merges() {
    let form = form_pdf();
    let appendix = numbered_pdf("appendix", 2);

    let mut stamper = Stamper::open(form.as_slice()).unwrap();
    stamper.set_text_field("name", "Ada").unwrap();
    let stamped = stamper.stamp().unwrap();

    let merged = merge(vec![
        Source::new("form", stamped.reader()),
        Source::from_bytes("appendix", &appendix).with_page_range("2"),
    ])
    .unwrap();
    let doc = Document::load_mem(&merged).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
}

#[test]
fn test_merge_pdfs_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let first = temp_dir.path().join("first.pdf");
    let second = temp_dir.path().join("second.pdf");
    std::fs::write(&first, numbered_pdf("first", 4)).unwrap();
    std::fs::write(&second, numbered_pdf("second", 2)).unwrap();

    let output_path = temp_dir.path().join("merged.pdf");
    let options = MergeOptions {
        inputs: vec![
            MergeInput {
                path: first,
                page_range: Some("1-2".to_string()),
            },
            MergeInput::new(second),
        ],
        output_path: output_path.clone(),
        output: OutputOptions::default(),
    };

    merge_pdfs(&options).expect("Failed to merge PDFs");

    assert!(output_path.exists(), "Merged PDF was not created");
    assert_eq!(count_pages(&output_path).unwrap(), 4);
}

#[test]
fn test_merge_pdfs_nonexistent_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let output_path = temp_dir.path().join("output.pdf");

    let options = MergeOptions {
        inputs: vec![MergeInput::new("nonexistent.pdf")],
        output_path: output_path.clone(),
        output: OutputOptions::default(),
    };

    let err = merge_pdfs(&options).unwrap_err();
    assert!(matches!(err, Error::FileNotFound(_)));
    assert!(!output_path.exists());
}

#[test]
fn test_merge_pdfs_bad_range_writes_nothing() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input = temp_dir.path().join("input.pdf");
    std::fs::write(&input, numbered_pdf("input", 3)).unwrap();

    let output_path = temp_dir.path().join("output.pdf");
    let options = MergeOptions {
        inputs: vec![MergeInput {
            path: input,
            page_range: Some("1-10".to_string()),
        }],
        output_path: output_path.clone(),
        output: OutputOptions::default(),
    };

    assert!(merge_pdfs(&options).unwrap_err().is_page_range_error());
    assert!(!output_path.exists());
}

#[test]
fn test_stamp_pdf_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input_path = temp_dir.path().join("form.pdf");
    let photo_path = temp_dir.path().join("photo.png");
    let output_path = temp_dir.path().join("filled.pdf");
    std::fs::write(&input_path, form_pdf()).unwrap();
    std::fs::write(&photo_path, square_png(4)).unwrap();

    let before = read_metadata(&input_path).unwrap();
    assert_eq!(before.field_count, 2);

    let options = StampOptions {
        input_path,
        output_path: output_path.clone(),
        text_fields: vec![("name".to_string(), "Ada".to_string())],
        image_fields: vec![("photo".to_string(), photo_path)],
        output: OutputOptions::default(),
    };
    let size = stamp_pdf(&options).expect("Failed to stamp PDF");

    assert_eq!(size, std::fs::metadata(&output_path).unwrap().len());
    let after = read_metadata(&output_path).unwrap();
    assert_eq!(after.page_count, 1);
    assert_eq!(after.field_count, 0);
}

#[test]
fn test_stamp_pdf_missing_image_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let input_path = temp_dir.path().join("form.pdf");
    std::fs::write(&input_path, form_pdf()).unwrap();

    let options = StampOptions {
        input_path,
        output_path: temp_dir.path().join("filled.pdf"),
        image_fields: vec![("photo".to_string(), temp_dir.path().join("missing.png"))],
        ..StampOptions::default()
    };

    assert!(matches!(stamp_pdf(&options).unwrap_err(), Error::FileNotFound(_)));
}
