//! Filling and flattening AcroForm fields

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use lopdf::Document;
use tracing::{debug, info};
use crate::error::{Error, Result};
use super::content::{Matrix, PageCanvas};
use super::form::AcroForm;
use super::output::{write_document, OutputOptions};
use super::raster::{scale_to_fit, ImageXObject};

/// The bytes of a stamped PDF
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampedPdf {
    bytes: Vec<u8>,
}

impl StampedPdf {
    /// Size of the stamped PDF in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read the stamped PDF as a stream
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.bytes.as_slice())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// An open document and everything needed to edit it
struct OpenDocument {
    doc: Document,
    form: AcroForm,
    canvas: PageCanvas,
}

enum SessionState {
    Open(Box<OpenDocument>),
    Stamped,
    Disposed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Open(_) => "open",
            SessionState::Stamped => "stamped",
            SessionState::Disposed => "disposed",
        }
    }
}

/// A form-filling session over one PDF
///
/// Open a document, set any number of fields, then either [`stamp`](Stamper::stamp)
/// it (flatten and write) or [`dispose`](Stamper::dispose) of it. Once stamped
/// or disposed the session cannot be used again. Setting a field the document
/// does not have is a no-op, so one set of values can be applied to several
/// templates.
///
/// # Example
///
/// ```no_run
/// use pdf_utils::pdf::Stamper;
/// use std::fs::File;
///
/// let photo = std::fs::read("photo.png")?;
/// let mut stamper = Stamper::open(File::open("template.pdf")?)?;
/// stamper
///     .set_text_field("name", "Ada Lovelace")?
///     .set_image_field("photo", &photo)?;
/// let stamped = stamper.stamp()?;
/// std::fs::write("filled.pdf", stamped.as_bytes())?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Stamper {
    state: SessionState,
    options: OutputOptions,
}

impl Stamper {
    /// Open a session with default output options
    pub fn open<R: Read>(source: R) -> Result<Self> {
        Self::open_with(source, OutputOptions::default())
    }

    /// Open a session over the PDF read from `source`
    pub fn open_with<R: Read>(mut source: R, options: OutputOptions) -> Result<Self> {
        let mut bytes = Vec::new();
        source
            .read_to_end(&mut bytes)
            .map_err(|e| Error::input_stream("stamp source", e))?;

        let doc = Document::load_mem(&bytes).map_err(|e| Error::input_stream("stamp source", e))?;
        let form = AcroForm::load(&doc)?;
        debug!(fields = form.len(), "opened stamp session");

        Ok(Self {
            state: SessionState::Open(Box::new(OpenDocument {
                doc,
                form,
                canvas: PageCanvas::new(),
            })),
            options,
        })
    }

    /// True until the session is stamped or disposed
    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// The form of the open document
    pub fn form(&self) -> Result<&AcroForm> {
        Ok(&self.session_ref()?.form)
    }

    fn session_ref(&self) -> Result<&OpenDocument> {
        match &self.state {
            SessionState::Open(session) => Ok(&**session),
            closed => Err(Error::SessionClosed { state: closed.name() }),
        }
    }

    fn session(&mut self) -> Result<&mut OpenDocument> {
        match &mut self.state {
            SessionState::Open(session) => Ok(&mut **session),
            closed => Err(Error::SessionClosed { state: closed.name() }),
        }
    }

    /// Set a text value on the field named `key`
    ///
    /// Does nothing when the document has no such field.
    pub fn set_text_field(&mut self, key: &str, text: &str) -> Result<&mut Self> {
        let session = self.session()?;

        match session.form.field(key).cloned() {
            Some(field) => {
                debug!(field = key, "setting text field");
                session.form.set_value(&mut session.doc, &field, text)?;
            }
            None => debug!(field = key, "no such field, ignoring text value"),
        }

        Ok(self)
    }

    /// Draw an image over the first widget of the field named `key`
    ///
    /// The image is scaled to fit the widget rectangle without changing its
    /// aspect ratio and anchored at the rectangle's lower-left corner. Does
    /// nothing (and decodes nothing) when the document has no such field.
    pub fn set_image_field(&mut self, key: &str, image: &[u8]) -> Result<&mut Self> {
        let session = self.session()?;

        let Some(field) = session.form.field(key) else {
            debug!(field = key, "no such field, ignoring image");
            return Ok(self);
        };
        let Some(widget) = field.widgets.first().cloned() else {
            debug!(field = key, "field has no widget, ignoring image");
            return Ok(self);
        };

        let page_id = match widget.page {
            Some(page_id) => page_id,
            None => match session.doc.get_pages().get(&1) {
                Some(&page_id) => page_id,
                None => return Err(Error::General(format!("Field '{}' has no page to draw on", key))),
            },
        };

        let rect = widget.rect;
        let xobject = ImageXObject::decode(image)?;
        let (width, height) = scale_to_fit(
            xobject.width as f32,
            xobject.height as f32,
            rect.width(),
            rect.height(),
        );
        if width <= 0.0 || height <= 0.0 {
            debug!(field = key, "widget has no area, ignoring image");
            return Ok(self);
        }

        debug!(field = key, width, height, x = rect.x1, y = rect.y1, "placing image");
        let xobject_id = xobject.add_to(&mut session.doc);
        let matrix = Matrix::scale_translate(width, height, rect.x1, rect.y1);
        session.canvas.draw_xobject(&mut session.doc, page_id, xobject_id, matrix)?;

        Ok(self)
    }

    /// Flatten the form, write the document and close the session
    ///
    /// On failure the session is closed as well and nothing is returned.
    pub fn stamp(&mut self) -> Result<StampedPdf> {
        self.session()?;

        let session = match self.close(SessionState::Stamped) {
            Some(session) => session,
            None => return Err(Error::SessionClosed { state: self.state.name() }),
        };

        let OpenDocument { mut doc, form, mut canvas } = *session;
        let result = form
            .flatten(&mut doc, &mut canvas)
            .and_then(|painted| {
                debug!(painted, "flattened fields");
                write_document(doc, &self.options)
            });

        match result {
            Ok(bytes) => {
                info!(bytes = bytes.len(), "stamped PDF");
                Ok(StampedPdf { bytes })
            }
            Err(e) => {
                self.state = SessionState::Disposed;
                Err(e)
            }
        }
    }

    /// Abandon the session without producing output
    ///
    /// Safe to call any number of times, including after [`stamp`](Stamper::stamp).
    pub fn dispose(&mut self) {
        if self.close(SessionState::Disposed).is_some() {
            debug!("disposed stamp session");
        }
    }

    /// Release the open document exactly once
    ///
    /// Moves an open session into `next` and hands back the document; a
    /// session that is already closed keeps its state and yields `None`.
    fn close(&mut self, next: SessionState) -> Option<Box<OpenDocument>> {
        if !self.is_open() {
            return None;
        }
        match std::mem::replace(&mut self.state, next) {
            SessionState::Open(session) => Some(session),
            _ => None,
        }
    }
}

/// Options for stamping a PDF file
#[derive(Debug, Clone, Default)]
pub struct StampOptions {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// `(field, text)` pairs, applied in order
    pub text_fields: Vec<(String, String)>,
    /// `(field, image file)` pairs, applied in order
    pub image_fields: Vec<(String, PathBuf)>,
    pub output: OutputOptions,
}

/// Fill and flatten a PDF file, writing the result to `output_path`
pub fn stamp_pdf(options: &StampOptions) -> Result<u64> {
    let input = open_existing(&options.input_path)?;
    let mut stamper = Stamper::open_with(input, options.output.clone())?;

    for (key, text) in &options.text_fields {
        stamper.set_text_field(key, text)?;
    }
    for (key, path) in &options.image_fields {
        let image = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(path.clone()),
            _ => Error::Io(e),
        })?;
        stamper.set_image_field(key, &image)?;
    }

    let stamped = stamper.stamp()?;
    std::fs::write(&options.output_path, stamped.as_bytes())?;

    Ok(stamped.size())
}

fn open_existing(path: &Path) -> Result<std::io::BufReader<std::fs::File>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(std::io::BufReader::new(std::fs::File::open(path)?))
}
