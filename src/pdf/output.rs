//! Writing finished documents to memory

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, StringFormat};
use tracing::debug;
use crate::error::Result;

/// Options applied when a merged or stamped document is written
#[derive(Debug, Clone)]
pub struct OutputOptions {
    /// Deflate streams before writing
    pub compress: bool,
    /// Value for the document info `Producer` entry, left untouched when `None`
    pub producer: Option<String>,
    /// Set the document info `ModDate` entry to the current time
    pub update_modification_date: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            compress: true,
            producer: Some(format!("pdf-utils {}", env!("CARGO_PKG_VERSION"))),
            update_modification_date: true,
        }
    }
}

/// Format a timestamp as a PDF date string
pub fn pdf_date(time: DateTime<Utc>) -> String {
    time.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

/// Update the document information dictionary according to `options`
fn update_document_info(doc: &mut Document, options: &OutputOptions) -> Result<()> {
    if options.producer.is_none() && !options.update_modification_date {
        return Ok(());
    }

    let info_id = match doc.trailer.get(b"Info").and_then(Object::as_reference) {
        Ok(id) if doc.get_dictionary(id).is_ok() => id,
        _ => {
            let info = match doc.trailer.get(b"Info") {
                Ok(Object::Dictionary(dict)) => dict.clone(),
                _ => Dictionary::new(),
            };
            let id = doc.add_object(Object::Dictionary(info));
            doc.trailer.set("Info", Object::Reference(id));
            id
        }
    };

    let info = doc.get_dictionary_mut(info_id)?;
    if let Some(producer) = &options.producer {
        info.set(
            "Producer",
            Object::String(producer.as_bytes().to_vec(), StringFormat::Literal),
        );
    }
    if options.update_modification_date {
        info.set(
            "ModDate",
            Object::String(pdf_date(Utc::now()).into_bytes(), StringFormat::Literal),
        );
    }

    Ok(())
}

/// Finalize `doc` and serialize it
///
/// Unreachable objects (replaced pages, removed form fields, the page trees
/// of merged sources) are pruned before writing.
pub fn write_document(mut doc: Document, options: &OutputOptions) -> Result<Vec<u8>> {
    update_document_info(&mut doc, options)?;

    let pruned = doc.prune_objects();
    debug!(pruned = pruned.len(), "pruned unreachable objects");

    if options.compress {
        doc.compress();
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
