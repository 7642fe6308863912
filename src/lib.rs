//! PDF Utilities Library
//!
//! Two operations over PDF documents, built on lopdf:
//! - Merge several PDFs into one, each optionally limited to a page range
//! - Stamp a PDF form: fill text and image fields, then flatten the form
//!   into static page content
//!
//! # Example
//!
//! ```no_run
//! use pdf_utils::pdf::{merge, Source, Stamper};
//!
//! let form = std::fs::read("application.pdf")?;
//! let annex = std::fs::read("annex.pdf")?;
//!
//! let mut stamper = Stamper::open(form.as_slice())?;
//! stamper.set_text_field("applicant.name", "Ada Lovelace")?;
//! let stamped = stamper.stamp()?;
//!
//! let packet = merge(vec![
//!     Source::from_bytes("application", stamped.as_bytes()),
//!     Source::from_bytes("annex", &annex).with_page_range("1-2"),
//! ])?;
//! std::fs::write("packet.pdf", packet)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod pdf;

// Re-export commonly used items
pub use error::{Error, Result};
