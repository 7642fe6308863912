//! PDF manipulation module

pub mod content;
pub mod form;
pub mod merge;
pub mod metadata;
pub mod output;
pub mod page_range;
pub mod raster;
pub mod stamp;

// Re-export commonly used items
pub use form::{AcroForm, FieldKind, FormField, Rect, Widget};
pub use merge::{merge, merge_pdfs, merge_with, MergeInput, MergeOptions, Source};
pub use metadata::{count_pages, extract_metadata, read_metadata, PdfMetadata};
pub use output::OutputOptions;
pub use page_range::{select_pages, PageRange, PageSpan};
pub use stamp::{stamp_pdf, StampOptions, StampedPdf, Stamper};
