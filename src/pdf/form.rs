//! AcroForm fields: discovery, value setting, appearances and flattening
//!
//! Fields are addressed by their fully qualified name (partial names joined
//! with `.`). When a document carries the same name more than once only the
//! first field in document order is returned by [`AcroForm::field`].

use std::collections::{HashMap, HashSet};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;
use crate::error::Result;
use super::content::{encode_pdf_literal, estimate_text_width, format_number, use_helvetica_font, Matrix, PageCanvas};

/// Field flag: text field may contain multiple lines
const FLAG_MULTILINE: i64 = 1 << 12;
/// Field flag: text field is a password field
const FLAG_PASSWORD: i64 = 1 << 13;
/// Field flag: button is a radio button
const FLAG_RADIO: i64 = 1 << 15;
/// Field flag: button is a push button
const FLAG_PUSHBUTTON: i64 = 1 << 16;

/// Annotation flags that keep a widget from being painted
const ANNOT_HIDDEN: i64 = 1 << 1;
const ANNOT_NO_VIEW: i64 = 1 << 5;

const DEFAULT_APPEARANCE: &str = "/Helv 0 Tf 0 g";
const PADDING: f32 = 2.0;
const LEADING: f32 = 1.15;
const MAX_AUTO_FONT_SIZE: f32 = 12.0;
const MIN_AUTO_FONT_SIZE: f32 = 4.0;

/// Field type from the `/FT` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Button,
    Choice,
    Signature,
    Unknown,
}

impl FieldKind {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"Tx" => FieldKind::Text,
            b"Btn" => FieldKind::Button,
            b"Ch" => FieldKind::Choice,
            b"Sig" => FieldKind::Signature,
            _ => FieldKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Button => "button",
            FieldKind::Choice => "choice",
            FieldKind::Signature => "signature",
            FieldKind::Unknown => "unknown",
        }
    }
}

/// A normalized rectangle in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    /// Build from two corners in any order
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Read a `[x1 y1 x2 y2]` array
    pub fn from_object(doc: &Document, object: &Object) -> Option<Self> {
        let (_, object) = doc.dereference(object).ok()?;
        let values: Vec<f32> = object
            .as_array()
            .ok()?
            .iter()
            .map(|value| value.as_float().ok())
            .collect::<Option<_>>()?;

        match values.as_slice() {
            [x1, y1, x2, y2] => Some(Self::new(*x1, *y1, *x2, *y2)),
            _ => None,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// The visual, positioned part of a field on a page
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    /// Widget annotation object
    pub id: ObjectId,
    /// Page carrying the widget, when it can be determined
    pub page: Option<ObjectId>,
    pub rect: Rect,
}

/// A terminal form field
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    /// Fully qualified field name
    pub name: String,
    /// Field dictionary object
    pub id: ObjectId,
    pub kind: FieldKind,
    /// Field flags (`/Ff`), inherited when absent
    pub flags: i64,
    /// Default appearance string (`/DA`), inherited when absent
    pub default_appearance: Option<String>,
    /// Quadding (`/Q`): 0 left, 1 centered, 2 right; the form default applies when absent
    pub quadding: Option<i64>,
    pub widgets: Vec<Widget>,
}

impl FormField {
    pub fn is_multiline(&self) -> bool {
        self.kind == FieldKind::Text && self.flags & FLAG_MULTILINE != 0
    }

    pub fn is_password(&self) -> bool {
        self.kind == FieldKind::Text && self.flags & FLAG_PASSWORD != 0
    }

    /// Check boxes and radio buttons carry their value as an appearance state
    pub fn is_toggle(&self) -> bool {
        self.kind == FieldKind::Button && self.flags & FLAG_PUSHBUTTON == 0
    }

    pub fn is_radio(&self) -> bool {
        self.is_toggle() && self.flags & FLAG_RADIO != 0
    }

    /// The field's current `/V` value rendered as text
    pub fn value(&self, doc: &Document) -> Option<String> {
        let dict = doc.get_dictionary(self.id).ok()?;
        let (_, value) = doc.dereference(dict.get(b"V").ok()?).ok()?;
        match value {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            Object::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| item.as_str().ok().map(decode_text_string))
                    .collect();
                Some(parts.join(", "))
            }
            _ => None,
        }
    }
}

/// Values inherited down the field hierarchy
#[derive(Debug, Clone, Default)]
struct Inherited {
    name: Option<String>,
    kind: Option<FieldKind>,
    flags: Option<i64>,
    default_appearance: Option<String>,
    quadding: Option<i64>,
}

/// The form fields of one document
#[derive(Debug, Clone, Default)]
pub struct AcroForm {
    fields: Vec<FormField>,
    default_appearance: Option<String>,
    default_quadding: i64,
    fallback_font: Option<ObjectId>,
}

impl AcroForm {
    /// Discover every terminal field reachable from the catalog's `/AcroForm`
    ///
    /// A document without a form yields an empty field set.
    pub fn load(doc: &Document) -> Result<Self> {
        let Some(acroform) = acroform_dictionary(doc) else {
            return Ok(Self::default());
        };

        let widget_pages = widget_pages(doc);
        let default_appearance = acroform
            .get(b"DA")
            .ok()
            .and_then(|da| da.as_str().ok())
            .map(|da| String::from_utf8_lossy(da).into_owned());
        let default_quadding = acroform.get(b"Q").and_then(Object::as_i64).unwrap_or(0);

        let mut fields = Vec::new();
        let mut visited = HashSet::new();
        for root in reference_list(doc, acroform.get(b"Fields").ok()) {
            collect_field(
                doc,
                root,
                &Inherited::default(),
                &widget_pages,
                &mut visited,
                &mut fields,
            );
        }

        debug!(fields = fields.len(), "loaded form fields");

        Ok(Self {
            fields,
            default_appearance,
            default_quadding,
            fallback_font: None,
        })
    }

    pub fn fields(&self) -> &[FormField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Look up a field by fully qualified name; the first match wins
    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Replace a field's value
    ///
    /// Text and choice fields get a freshly generated appearance for every
    /// widget. Toggle buttons switch each widget to the state named `value`,
    /// or `Off` when the widget has no such state. No max length or format
    /// checks are made.
    pub fn set_value(&mut self, doc: &mut Document, field: &FormField, value: &str) -> Result<()> {
        if field.is_toggle() {
            return set_toggle_state(doc, field, value);
        }

        doc.get_dictionary_mut(field.id)?
            .set("V", encode_text_string(value));

        if matches!(field.kind, FieldKind::Text | FieldKind::Choice) {
            for widget in &field.widgets {
                self.write_text_appearance(doc, field, widget, value)?;
            }
        }

        Ok(())
    }

    /// Paint every visible widget into its page and remove the form
    ///
    /// Widget annotations are dropped from the pages and `/AcroForm` is removed
    /// from the catalog, leaving no interactive fields. Returns the number of
    /// widgets painted.
    pub fn flatten(mut self, doc: &mut Document, canvas: &mut PageCanvas) -> Result<usize> {
        let fields = std::mem::take(&mut self.fields);
        let mut removed = HashSet::new();
        let mut painted = 0;

        for field in &fields {
            for widget in &field.widgets {
                removed.insert(widget.id);

                if !is_visible(doc, widget.id) {
                    debug!(field = %field.name, "skipping hidden widget");
                    continue;
                }

                if matches!(field.kind, FieldKind::Text | FieldKind::Choice)
                    && !has_normal_appearance(doc, widget.id)
                {
                    if let Some(value) = field.value(doc) {
                        self.write_text_appearance(doc, field, widget, &value)?;
                    }
                }

                let Some(page_id) = widget.page else {
                    debug!(field = %field.name, "widget is not on any page");
                    continue;
                };
                let Some(appearance_id) = normal_appearance(doc, widget.id) else {
                    continue;
                };
                let Some(matrix) = appearance_matrix(doc, appearance_id, &widget.rect) else {
                    continue;
                };

                canvas.draw_xobject(doc, page_id, appearance_id, matrix)?;
                painted += 1;
            }
        }

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in page_ids {
            remove_annotations(doc, page_id, &removed)?;
        }

        if let Ok(catalog) = doc.catalog_mut() {
            catalog.remove(b"AcroForm");
        }

        debug!(fields = fields.len(), painted, "flattened form");
        Ok(painted)
    }

    fn write_text_appearance(
        &mut self,
        doc: &mut Document,
        field: &FormField,
        widget: &Widget,
        value: &str,
    ) -> Result<()> {
        let da = field
            .default_appearance
            .clone()
            .or_else(|| self.default_appearance.clone())
            .unwrap_or_else(|| DEFAULT_APPEARANCE.to_string());
        let appearance = DefaultAppearance::parse(&da);

        let font = self.font_resource(doc, &appearance.font);
        let quadding = field.quadding.unwrap_or(self.default_quadding);

        let lines: Vec<String> = if field.is_password() {
            Vec::new()
        } else if field.is_multiline() {
            value.split('\n').map(|line| line.trim_end_matches('\r').to_string()).collect()
        } else {
            vec![value.replace(['\r', '\n'], " ")]
        };

        let content = text_appearance_content(&appearance, &widget.rect, quadding, field.is_multiline(), &lines);

        let mut fonts = Dictionary::new();
        fonts.set(appearance.font.as_bytes().to_vec(), font);
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Form".to_vec()));
        dict.set("BBox", Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Real(widget.rect.width()),
            Object::Real(widget.rect.height()),
        ]));
        dict.set("Resources", Object::Dictionary(resources));

        let appearance_id = doc.add_object(Stream::new(dict, content));

        let mut ap = Dictionary::new();
        ap.set("N", Object::Reference(appearance_id));
        doc.get_dictionary_mut(widget.id)?
            .set("AP", Object::Dictionary(ap));

        Ok(())
    }

    /// The form's font resource for `name`, or a shared Helvetica when the form has none
    fn font_resource(&mut self, doc: &mut Document, name: &str) -> Object {
        if let Some(font) = form_font(doc, name.as_bytes()) {
            return font;
        }

        let font_id = *self
            .fallback_font
            .get_or_insert_with(|| use_helvetica_font(doc));
        Object::Reference(font_id)
    }
}

/// A parsed default appearance string such as `/Helv 12 Tf 0 g`
#[derive(Debug, Clone, PartialEq)]
struct DefaultAppearance {
    font: String,
    size: f32,
    /// Operators other than `Tf`, kept verbatim (colour, mostly)
    rest: String,
}

impl DefaultAppearance {
    fn parse(da: &str) -> Self {
        let tokens: Vec<&str> = da.split_whitespace().collect();

        match tokens.iter().position(|&token| token == "Tf") {
            Some(i) if i >= 2 => {
                let font = tokens[i - 2].trim_start_matches('/').to_string();
                let size = tokens[i - 1].parse::<f32>().unwrap_or(0.0);
                let rest: Vec<&str> = tokens[..i - 2]
                    .iter()
                    .chain(tokens[i + 1..].iter())
                    .copied()
                    .collect();
                Self { font, size, rest: rest.join(" ") }
            }
            _ => Self {
                font: "Helv".to_string(),
                size: 0.0,
                rest: da.to_string(),
            },
        }
    }

    /// The explicit size, or an automatic one (`Tf 0`) that fits the box
    ///
    /// Automatic single-line text shrinks to fit both the height and the
    /// width of the widget, down to a minimum size.
    fn font_size_for(&self, rect: &Rect, multiline: bool, lines: &[String]) -> f32 {
        if self.size > 0.0 {
            return self.size;
        }
        if multiline {
            return MAX_AUTO_FONT_SIZE;
        }

        let mut size = (rect.height() - 2.0 * PADDING) / LEADING;
        let unit_width = lines
            .iter()
            .map(|line| estimate_text_width(line, 1.0))
            .fold(0.0, f32::max);
        if unit_width > 0.0 {
            size = size.min((rect.width() - 2.0 * PADDING) / unit_width);
        }
        size.clamp(MIN_AUTO_FONT_SIZE, MAX_AUTO_FONT_SIZE)
    }
}

fn text_appearance_content(
    appearance: &DefaultAppearance,
    rect: &Rect,
    quadding: i64,
    multiline: bool,
    lines: &[String],
) -> Vec<u8> {
    let width = rect.width();
    let height = rect.height();
    let size = appearance.font_size_for(rect, multiline, lines);

    let mut content = Vec::new();
    content.extend_from_slice(b"/Tx BMC\nq\n");
    content.extend_from_slice(
        format!(
            "{} {} {} {} re W n\n",
            format_number(PADDING / 2.0),
            format_number(PADDING / 2.0),
            format_number((width - PADDING).max(0.0)),
            format_number((height - PADDING).max(0.0)),
        )
        .as_bytes(),
    );
    content.extend_from_slice(b"BT\n");
    content.extend_from_slice(format!("/{} {} Tf\n", appearance.font, format_number(size)).as_bytes());
    if !appearance.rest.is_empty() {
        content.extend_from_slice(appearance.rest.as_bytes());
        content.push(b'\n');
    }

    for (i, line) in lines.iter().enumerate() {
        let text_width = estimate_text_width(line, size);
        let x = match quadding {
            1 => (width - text_width) / 2.0,
            2 => width - PADDING - text_width,
            _ => PADDING,
        }
        .max(PADDING);
        let y = if multiline {
            height - PADDING - size - i as f32 * size * LEADING
        } else {
            (height - size) / 2.0 + size * 0.22
        };

        content.extend_from_slice(
            format!("1 0 0 1 {} {} Tm\n(", format_number(x), format_number(y)).as_bytes(),
        );
        content.extend_from_slice(&encode_pdf_literal(line));
        content.extend_from_slice(b") Tj\n");
    }

    content.extend_from_slice(b"ET\nQ\nEMC\n");
    content
}

fn set_toggle_state(doc: &mut Document, field: &FormField, value: &str) -> Result<()> {
    let state = value.as_bytes().to_vec();
    doc.get_dictionary_mut(field.id)?
        .set("V", Object::Name(state.clone()));

    for widget in &field.widgets {
        let has_state = appearance_states(doc, widget.id).contains(&state);
        let appearance_state = if has_state { state.clone() } else { b"Off".to_vec() };
        doc.get_dictionary_mut(widget.id)?
            .set("AS", Object::Name(appearance_state));
    }

    Ok(())
}

fn acroform_dictionary(doc: &Document) -> Option<Dictionary> {
    let catalog = doc.catalog().ok()?;
    let (_, acroform) = doc.dereference(catalog.get(b"AcroForm").ok()?).ok()?;
    acroform.as_dict().ok().cloned()
}

/// Look up a font in the form's default resources (`/DR /Font`)
fn form_font(doc: &Document, name: &[u8]) -> Option<Object> {
    let acroform = acroform_dictionary(doc)?;
    let (_, resources) = doc.dereference(acroform.get(b"DR").ok()?).ok()?;
    let (_, fonts) = doc.dereference(resources.as_dict().ok()?.get(b"Font").ok()?).ok()?;
    fonts.as_dict().ok()?.get(name).ok().cloned()
}

/// Object references held by an array (or a reference to an array)
fn reference_list(doc: &Document, object: Option<&Object>) -> Vec<ObjectId> {
    let Some(object) = object else {
        return Vec::new();
    };
    let Ok((_, array)) = doc.dereference(object) else {
        return Vec::new();
    };

    array
        .as_array()
        .map(|items| items.iter().filter_map(|item| item.as_reference().ok()).collect())
        .unwrap_or_default()
}

/// Map every annotation on every page to that page
fn widget_pages(doc: &Document) -> HashMap<ObjectId, ObjectId> {
    let mut pages = HashMap::new();

    for page_id in doc.get_pages().into_values() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            continue;
        };
        for annot_id in reference_list(doc, page.get(b"Annots").ok()) {
            pages.entry(annot_id).or_insert(page_id);
        }
    }

    pages
}

fn collect_field(
    doc: &Document,
    id: ObjectId,
    inherited: &Inherited,
    widget_pages: &HashMap<ObjectId, ObjectId>,
    visited: &mut HashSet<ObjectId>,
    out: &mut Vec<FormField>,
) {
    if !visited.insert(id) {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };

    let partial = dict
        .get(b"T")
        .ok()
        .and_then(|t| t.as_str().ok())
        .map(decode_text_string);
    let name = match (&inherited.name, partial) {
        (Some(parent), Some(partial)) => Some(format!("{}.{}", parent, partial)),
        (None, Some(partial)) => Some(partial),
        (parent, None) => parent.clone(),
    };

    let scope = Inherited {
        name,
        kind: dict
            .get(b"FT")
            .and_then(Object::as_name)
            .ok()
            .map(FieldKind::from_name)
            .or(inherited.kind),
        flags: dict.get(b"Ff").and_then(Object::as_i64).ok().or(inherited.flags),
        default_appearance: dict
            .get(b"DA")
            .ok()
            .and_then(|da| da.as_str().ok())
            .map(|da| String::from_utf8_lossy(da).into_owned())
            .or_else(|| inherited.default_appearance.clone()),
        quadding: dict.get(b"Q").and_then(Object::as_i64).ok().or(inherited.quadding),
    };

    let (child_fields, widget_kids): (Vec<ObjectId>, Vec<ObjectId>) =
        reference_list(doc, dict.get(b"Kids").ok())
            .into_iter()
            .partition(|kid| {
                doc.get_dictionary(*kid)
                    .map(|kid| kid.has(b"T"))
                    .unwrap_or(false)
            });

    for child in &child_fields {
        collect_field(doc, *child, &scope, widget_pages, visited, out);
    }
    if !child_fields.is_empty() && widget_kids.is_empty() {
        return;
    }

    let Some(name) = scope.name else {
        return;
    };

    let widget_ids = if !widget_kids.is_empty() {
        widget_kids
    } else if dict.has(b"Rect") {
        vec![id]
    } else {
        Vec::new()
    };

    let widgets = widget_ids
        .into_iter()
        .filter_map(|widget_id| build_widget(doc, widget_id, widget_pages))
        .collect();

    out.push(FormField {
        name,
        id,
        kind: scope.kind.unwrap_or(FieldKind::Unknown),
        flags: scope.flags.unwrap_or(0),
        default_appearance: scope.default_appearance,
        quadding: scope.quadding,
        widgets,
    });
}

fn build_widget(doc: &Document, id: ObjectId, widget_pages: &HashMap<ObjectId, ObjectId>) -> Option<Widget> {
    let dict = doc.get_dictionary(id).ok()?;
    let rect = Rect::from_object(doc, dict.get(b"Rect").ok()?)?;

    let page = dict
        .get(b"P")
        .and_then(Object::as_reference)
        .ok()
        .filter(|page_id| doc.get_dictionary(*page_id).is_ok())
        .or_else(|| widget_pages.get(&id).copied());

    Some(Widget { id, page, rect })
}

fn is_visible(doc: &Document, widget_id: ObjectId) -> bool {
    let flags = doc
        .get_dictionary(widget_id)
        .and_then(|dict| dict.get(b"F"))
        .and_then(Object::as_i64)
        .unwrap_or(0);
    flags & (ANNOT_HIDDEN | ANNOT_NO_VIEW) == 0
}

/// The widget's `/AP /N` entry, dereferenced
fn normal_appearance_entry(doc: &Document, widget_id: ObjectId) -> Option<(Option<ObjectId>, Object)> {
    let widget = doc.get_dictionary(widget_id).ok()?;
    let (_, ap) = doc.dereference(widget.get(b"AP").ok()?).ok()?;
    let (id, normal) = doc.dereference(ap.as_dict().ok()?.get(b"N").ok()?).ok()?;
    Some((id, normal.clone()))
}

fn has_normal_appearance(doc: &Document, widget_id: ObjectId) -> bool {
    normal_appearance_entry(doc, widget_id).is_some()
}

/// State names available in a widget's normal appearance dictionary
fn appearance_states(doc: &Document, widget_id: ObjectId) -> Vec<Vec<u8>> {
    match normal_appearance_entry(doc, widget_id) {
        Some((_, Object::Dictionary(states))) => states.iter().map(|(name, _)| name.clone()).collect(),
        _ => Vec::new(),
    }
}

/// The appearance stream a widget currently shows, as an object in `doc`
///
/// Appearance state dictionaries are resolved through `/AS`. Returns `None`
/// when the widget has nothing to show (no appearance, or the `Off` state
/// without an `Off` appearance).
fn normal_appearance(doc: &mut Document, widget_id: ObjectId) -> Option<ObjectId> {
    let (id, normal) = normal_appearance_entry(doc, widget_id)?;

    match normal {
        Object::Stream(stream) => match id {
            Some(id) => Some(id),
            None => Some(doc.add_object(Object::Stream(stream))),
        },
        Object::Dictionary(states) => {
            let widget = doc.get_dictionary(widget_id).ok()?;
            let state = widget.get(b"AS").and_then(Object::as_name).ok()?.to_vec();
            let (id, selected) = doc.dereference(states.get(&state).ok()?).ok()?;
            let selected = selected.as_stream().ok()?.clone();
            match id {
                Some(id) => Some(id),
                None => Some(doc.add_object(Object::Stream(selected))),
            }
        }
        _ => None,
    }
}

/// Map an appearance stream's bounding box onto the widget rectangle
///
/// Also makes sure the stream is typed as a Form XObject so it can be painted with `Do`.
fn appearance_matrix(doc: &mut Document, appearance_id: ObjectId, rect: &Rect) -> Option<Matrix> {
    let bbox = {
        let stream = doc.get_object(appearance_id).ok()?.as_stream().ok()?;
        match stream.dict.get(b"BBox") {
            Ok(bbox) => Rect::from_object(doc, bbox)?,
            Err(_) => Rect::new(0.0, 0.0, rect.width(), rect.height()),
        }
    };

    if bbox.width() <= 0.0 || bbox.height() <= 0.0 || rect.width() <= 0.0 || rect.height() <= 0.0 {
        return None;
    }

    if let Ok(Object::Stream(stream)) = doc.get_object_mut(appearance_id) {
        stream.dict.set("Type", Object::Name(b"XObject".to_vec()));
        stream.dict.set("Subtype", Object::Name(b"Form".to_vec()));
        if !stream.dict.has(b"BBox") {
            stream.dict.set("BBox", Object::Array(vec![
                Object::Real(bbox.x1),
                Object::Real(bbox.y1),
                Object::Real(bbox.x2),
                Object::Real(bbox.y2),
            ]));
        }
    }

    let sx = rect.width() / bbox.width();
    let sy = rect.height() / bbox.height();
    Some(Matrix::scale_translate(sx, sy, rect.x1 - bbox.x1 * sx, rect.y1 - bbox.y1 * sy))
}

/// Drop the given annotations from a page's `/Annots`
fn remove_annotations(doc: &mut Document, page_id: ObjectId, removed: &HashSet<ObjectId>) -> Result<()> {
    let keep = |items: &Vec<Object>| -> Vec<Object> {
        items
            .iter()
            .filter(|item| !matches!(item, Object::Reference(id) if removed.contains(id)))
            .cloned()
            .collect()
    };

    let annots = match doc.get_dictionary(page_id)?.get(b"Annots") {
        Ok(annots) => annots.clone(),
        Err(_) => return Ok(()),
    };

    let remaining = match &annots {
        Object::Array(items) => keep(items),
        Object::Reference(array_id) => match doc.get_object(*array_id) {
            Ok(Object::Array(items)) => keep(items),
            _ => return Ok(()),
        },
        _ => return Ok(()),
    };

    let page = doc.get_dictionary_mut(page_id)?;
    if remaining.is_empty() {
        page.remove(b"Annots");
    } else {
        page.set("Annots", Object::Array(remaining));
    }

    Ok(())
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise single-byte)
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Encode text as a PDF text string object
///
/// ASCII stays a literal string; anything else becomes UTF-16BE with a byte order mark.
pub fn encode_text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::String(text.as_bytes().to_vec(), StringFormat::Literal);
    }

    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}
