//! PDF merging functionality using lopdf

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, info};
use crate::error::{Error, Result};
use super::content::{inherited_attribute, INHERITABLE_PAGE_KEYS};
use super::output::{write_document, OutputOptions};
use super::page_range::select_pages;

/// One input of a merge: a readable PDF and an optional page range
///
/// The reader is consumed by the merge and dropped as soon as its pages
/// have been copied.
pub struct Source<'a> {
    key: String,
    page_range: Option<String>,
    reader: Box<dyn Read + 'a>,
}

impl<'a> Source<'a> {
    /// A source copying every page of `reader`
    pub fn new(key: impl Into<String>, reader: impl Read + 'a) -> Self {
        Self {
            key: key.into(),
            page_range: None,
            reader: Box::new(reader),
        }
    }

    /// A source reading from an in-memory PDF
    pub fn from_bytes(key: impl Into<String>, bytes: &'a [u8]) -> Self {
        Self::new(key, bytes)
    }

    /// Restrict the source to a page range such as `"1-3,5"`
    ///
    /// A blank range selects every page.
    pub fn with_page_range(mut self, range: impl Into<String>) -> Self {
        self.page_range = Some(range.into());
        self
    }

    /// Identifier used in logs and error messages
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn page_range(&self) -> Option<&str> {
        self.page_range.as_deref()
    }
}

impl Source<'static> {
    /// A source reading a PDF file, keyed by its path
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        Ok(Self::new(path.display().to_string(), BufReader::new(file)))
    }
}

impl fmt::Debug for Source<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("key", &self.key)
            .field("page_range", &self.page_range)
            .finish_non_exhaustive()
    }
}

/// Merge sources into one PDF with default output options
///
/// # Example
///
/// ```no_run
/// use pdf_utils::pdf::{merge, Source};
///
/// let cover = std::fs::read("cover.pdf")?;
/// let report = std::fs::read("report.pdf")?;
///
/// let merged = merge(vec![
///     Source::from_bytes("cover", &cover),
///     Source::from_bytes("report", &report).with_page_range("2-4,7"),
/// ])?;
/// std::fs::write("merged.pdf", merged)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn merge<'a, I>(sources: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Source<'a>>,
{
    merge_with(sources, &OutputOptions::default())
}

/// Merge sources into one PDF
///
/// Sources are read strictly one after another. Each source's selected pages
/// are appended in the order its page range lists them (all pages in order
/// without a range). An empty source list produces a valid document without
/// pages. Any unreadable source or bad page range aborts the whole merge.
pub fn merge_with<'a, I>(sources: I, options: &OutputOptions) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Source<'a>>,
{
    // Define a starting max_id for merged document
    let mut max_id = 1;
    let mut version = MINIMUM_VERSION;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut source_count = 0;

    for source in sources {
        let Source { key, page_range, reader } = source;
        let mut doc = load_source(&key, reader)?;

        // Renumber objects in this document to avoid conflicts
        doc.renumber_objects_with(max_id);

        let pages = doc.get_pages();
        let selection = select_pages(page_range.as_deref(), pages.len() as u32)?;
        debug!(source = %key, pages = pages.len(), selected = selection.len(), "copying pages");

        let mut copied = HashSet::new();
        for number in selection {
            let page_id = *pages
                .get(&number)
                .ok_or_else(|| Error::General(format!("Page {} missing from page tree of '{}'", number, key)))?;
            let mut page = detach_page(&doc, page_id)?;

            // A page selected twice becomes two independent page objects
            let target_id = if copied.insert(page_id) {
                page_id
            } else {
                let copy_id = doc.new_object_id();
                clone_annotations(&mut doc, &mut page, copy_id);
                copy_id
            };
            doc.objects.insert(target_id, Object::Dictionary(page));
            page_ids.push(target_id);
        }

        // Update max_id for next document
        max_id = doc.max_id + 1;
        version = version.max(document_version(&doc));

        // Collect all objects from this document; the source is released here
        objects.extend(doc.objects);
        source_count += 1;
    }

    let mut merged_doc = Document::with_version(format!("{}.{}", version.0, version.1));

    // Add all collected objects FIRST
    merged_doc.objects.extend(objects);

    // Keep new_object_id() above every object we just added
    merged_doc.max_id = max_id - 1;

    let pages_id = merged_doc.new_object_id();

    let kids: Vec<Object> = page_ids
        .iter()
        .map(|&id| Object::Reference(id))
        .collect();

    let mut pages_object = Dictionary::new();
    pages_object.set("Type", Object::Name(b"Pages".to_vec()));
    pages_object.set("Count", Object::Integer(page_ids.len() as i64));
    pages_object.set("Kids", Object::Array(kids));

    let catalog_id = merged_doc.new_object_id();
    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));

    merged_doc.objects.insert(catalog_id, Object::Dictionary(catalog));
    merged_doc.objects.insert(pages_id, Object::Dictionary(pages_object));
    merged_doc.trailer.set("Root", Object::Reference(catalog_id));

    for &page_id in &page_ids {
        let page = merged_doc.get_dictionary_mut(page_id)?;
        page.set("Parent", Object::Reference(pages_id));
    }

    let bytes = write_document(merged_doc, options)?;
    info!(sources = source_count, pages = page_ids.len(), bytes = bytes.len(), "merged PDF");

    Ok(bytes)
}

/// Read a source to the end and parse it, releasing the reader either way
fn load_source(key: &str, mut reader: Box<dyn Read + '_>) -> Result<Document> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| Error::input_stream(key, e))?;
    drop(reader);

    Document::load_mem(&bytes).map_err(|e| Error::input_stream(key, e))
}

/// Copy a page dictionary with its inherited attributes made explicit
///
/// Merged pages hang directly under the output's single Pages node, so
/// anything they used to inherit from their old ancestors must move onto
/// the page itself.
fn detach_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary> {
    let mut page = doc.get_dictionary(page_id)?.clone();

    for key in INHERITABLE_PAGE_KEYS {
        if !page.has(key) {
            if let Some(value) = inherited_attribute(doc, page_id, key) {
                page.set(key.to_vec(), value);
            }
        }
    }
    page.remove(b"Parent");

    Ok(page)
}

/// Lowest version written for a merged document
const MINIMUM_VERSION: (u32, u32) = (1, 5);

/// Parse a `major.minor` PDF version
fn parse_version(text: &str) -> Option<(u32, u32)> {
    let (major, minor) = text.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// The version a document declares: its header, raised by a catalog `/Version`
fn document_version(doc: &Document) -> (u32, u32) {
    let header = parse_version(&doc.version);
    let catalog = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"Version").and_then(Object::as_name).ok())
        .and_then(|name| std::str::from_utf8(name).ok())
        .and_then(parse_version);

    header.max(catalog).unwrap_or(MINIMUM_VERSION)
}

/// Give a repeated page its own copies of its annotations
///
/// An annotation dictionary belongs to exactly one page, so each one is
/// duplicated and its `/P` pointed at the new page.
fn clone_annotations(doc: &mut Document, page: &mut Dictionary, page_id: ObjectId) {
    let annots = match page.get(b"Annots").and_then(|annots| doc.dereference(annots)) {
        Ok((_, Object::Array(items))) => items.clone(),
        _ => return,
    };

    let retarget = |mut annot: Dictionary| {
        if annot.has(b"P") {
            annot.set("P", Object::Reference(page_id));
        }
        annot
    };

    let mut copies = Vec::with_capacity(annots.len());
    for annot in annots {
        let copy = match annot {
            Object::Reference(id) => match doc.get_dictionary(id) {
                Ok(dict) => {
                    let dict = retarget(dict.clone());
                    Object::Reference(doc.add_object(Object::Dictionary(dict)))
                }
                Err(_) => Object::Reference(id),
            },
            Object::Dictionary(dict) => Object::Dictionary(retarget(dict)),
            other => other,
        };
        copies.push(copy);
    }

    page.set("Annots", Object::Array(copies));
}

/// One input file of a file-based merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInput {
    pub path: PathBuf,
    /// Optional page range such as `"1-3,5"`
    pub page_range: Option<String>,
}

impl MergeInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            page_range: None,
        }
    }
}

/// Options for merging PDF files
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Input PDF files in the order they should be merged
    pub inputs: Vec<MergeInput>,
    /// Output PDF file path
    pub output_path: PathBuf,
    pub output: OutputOptions,
}

/// Merge PDF files into a single PDF file
///
/// Every input must exist before anything is read. The output file is only
/// written when the whole merge succeeded.
pub fn merge_pdfs(options: &MergeOptions) -> Result<()> {
    for input in &options.inputs {
        if !input.path.exists() {
            return Err(Error::FileNotFound(input.path.clone()));
        }
    }

    let mut sources = Vec::with_capacity(options.inputs.len());
    for input in &options.inputs {
        let source = Source::open(&input.path)?;
        sources.push(match &input.page_range {
            Some(range) => source.with_page_range(range.clone()),
            None => source,
        });
    }

    let bytes = merge_with(sources, &options.output)?;
    std::fs::write(&options.output_path, bytes)?;

    Ok(())
}
