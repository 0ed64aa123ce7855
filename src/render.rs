//! PDF compositor – draws a certificate record onto the template's first page
//! using `lopdf`.
//!
//! The template is loaded as-is and only ever appended to: its original
//! content stream is wrapped in `q … Q` and our overlay stream follows it.
//! Fonts are embedded as Type0/CIDFontType2 with Identity-H encoding, so the
//! shaped glyph ids go straight into the content stream.
//!
//! Coordinates follow PDF conventions: origin at the bottom-left of the page,
//! y grows upward, 1 unit = 1 point.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::assets::FetchedAsset;
use crate::error::{ImageDecodeError, RenderError};
use crate::fonts::{FontData, FontPrograms, FontRole, FontSet, GlyphUsage, ShapedText};
use crate::layout_config::{CertificateLayout, ImageSlot, ImageSource};
use crate::normalize::{normalize, EmbedFormat, EmbeddableImage, JpegColor};
use crate::record::{CertificateRecord, TextField};

/// US Letter, used when the template has no readable MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Limit when walking the page tree for inherited attributes.
const MAX_INHERIT_DEPTH: usize = 10;

/// A text field with its computed position.
#[derive(Debug, Clone)]
pub struct PlacedText {
    pub field: TextField,
    pub text: String,
    pub font: FontRole,
    pub size: f32,
    pub color: [f32; 3],
    /// Left edge of the drawn text, in points.
    pub x: f32,
    /// Baseline, in points.
    pub y: f32,
    /// Measured width, in points.
    pub width: f32,
    pub shaped: ShapedText,
}

impl PlacedText {
    pub fn right_edge(&self) -> f32 {
        self.x + self.width
    }
}

/// Compute where each text slot is drawn.
///
/// The trimmed value is shaped and measured with the slot's font, then placed
/// so that its right edge sits on the anchor: `x = anchor_x - width`. Empty
/// values are placed with zero width and are not drawn.
pub fn plan_text(
    record: &CertificateRecord,
    layout: &CertificateLayout,
    fonts: &FontSet,
) -> Vec<PlacedText> {
    layout
        .text
        .iter()
        .map(|slot| {
            let text = record.text(slot.field).trim().to_string();
            let shaped = fonts.get(slot.font).shape(&text);
            let width = shaped.width(slot.size);
            let anchor_x = layout.to_pt(slot.anchor_x);
            PlacedText {
                field: slot.field,
                text,
                font: slot.font,
                size: slot.size,
                color: slot.color,
                x: anchor_x - width,
                y: layout.to_pt(slot.anchor_y),
                width,
                shaped,
            }
        })
        .collect()
}

/// An image that was left out of the document.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub source: ImageSource,
    pub reason: String,
}

/// What ended up on the page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub text_drawn: Vec<TextField>,
    pub images_drawn: Vec<ImageSource>,
    pub skipped: Vec<SkippedImage>,
}

/// A font embedded in the output document. The descendant font and the
/// ToUnicode map are written in [`CertificateCanvas::finish`] once every
/// used glyph is known.
struct EmbeddedFont {
    resource: String,
    base_font: String,
    descriptor_id: ObjectId,
    cid_font_id: ObjectId,
    to_unicode_id: ObjectId,
    type0_id: ObjectId,
    usage: GlyphUsage,
    /// gid -> advance in 1/1000 em.
    widths: BTreeMap<u16, f32>,
}

/// The template page being drawn on.
pub struct CertificateCanvas {
    doc: Document,
    page_id: ObjectId,
    media_box: [f32; 4],
    fonts: HashMap<FontRole, EmbeddedFont>,
    images: Vec<(String, ObjectId)>,
    ops: Vec<Operation>,
    report: RenderReport,
}

impl CertificateCanvas {
    /// Parse the template and keep only its first page.
    pub fn load_template(bytes: &[u8]) -> Result<Self, RenderError> {
        let mut doc = Document::load_mem(bytes)
            .map_err(|e| RenderError::TemplateLoad(format!("not a PDF document: {e}")))?;

        if doc.is_encrypted() {
            return Err(RenderError::TemplateLoad("template PDF is encrypted".to_string()));
        }

        let page_id = doc
            .get_pages()
            .values()
            .next()
            .copied()
            .ok_or_else(|| RenderError::TemplateLoad("template has no pages".to_string()))?;

        let media_box = get_media_box(&doc, page_id);
        let resources = effective_resources(&doc, page_id);

        // Pin inherited attributes on the page before it is re-parented.
        {
            let page = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| RenderError::TemplateLoad(format!("bad page object: {e}")))?;
            page.set(
                "MediaBox",
                Object::Array(media_box.iter().map(|v| Object::Real(*v)).collect()),
            );
            page.set("Resources", Object::Dictionary(resources));
        }

        if doc.get_pages().len() > 1 {
            log::debug!("template has several pages; keeping the first");
        }
        keep_single_page(&mut doc, page_id)?;

        Ok(Self {
            doc,
            page_id,
            media_box,
            fonts: HashMap::new(),
            images: Vec::new(),
            ops: Vec::new(),
            report: RenderReport::default(),
        })
    }

    pub fn page_size(&self) -> (f32, f32) {
        (
            self.media_box[2] - self.media_box[0],
            self.media_box[3] - self.media_box[1],
        )
    }

    /// Embed both font programs. Required before any text is drawn.
    pub fn embed_fonts(&mut self, fonts: &FontSet) {
        for font in [&fonts.display, &fonts.body] {
            let embedded = self.embed_font(font);
            self.fonts.insert(font.role, embedded);
        }
    }

    fn embed_font(&mut self, font: &FontData) -> EmbeddedFont {
        let scale = 1000.0 / font.units_per_em;
        let to_pdf = |v: f32| Object::Integer((v * scale).round() as i64);

        let mut file = Stream::new(
            dictionary! { "Length1" => Object::Integer(font.bytes.len() as i64) },
            font.bytes.clone(),
        );
        let _ = file.compress();
        let file_id = self.doc.add_object(file);

        let mut flags = 32;
        if font.is_monospaced {
            flags |= 1;
        }
        if font.is_italic {
            flags |= 64;
        }
        let descriptor = dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(font.postscript_name.as_bytes().to_vec()),
            "Flags" => Object::Integer(flags),
            "FontBBox" => Object::Array(font.bbox.iter().map(|v| to_pdf(f32::from(*v))).collect()),
            "ItalicAngle" => Object::Integer(0),
            "Ascent" => to_pdf(font.ascender),
            "Descent" => to_pdf(font.descender),
            "CapHeight" => to_pdf(font.cap_height),
            "StemV" => Object::Integer(80),
            "FontFile2" => Object::Reference(file_id),
        };
        let descriptor_id = self.doc.add_object(descriptor);

        let resource = match font.role {
            FontRole::Display => "CFDisplay",
            FontRole::Body => "CFBody",
        };

        EmbeddedFont {
            resource: resource.to_string(),
            base_font: font.postscript_name.clone(),
            descriptor_id,
            cid_font_id: self.doc.new_object_id(),
            to_unicode_id: self.doc.new_object_id(),
            type0_id: self.doc.new_object_id(),
            usage: GlyphUsage::default(),
            widths: BTreeMap::new(),
        }
    }

    /// Draw the planned text. Empty values are skipped.
    pub fn draw_text(&mut self, placed: &[PlacedText], fonts: &FontSet) -> Result<(), RenderError> {
        for item in placed {
            if item.text.is_empty() {
                continue;
            }
            let font_data = fonts.get(item.font);
            let embedded = self.fonts.get_mut(&item.font).ok_or(RenderError::FontLoad {
                role: item.font,
                reason: "font was not embedded before drawing".to_string(),
            })?;

            embedded.usage.record(&item.shaped);
            let tj = tj_array(&item.shaped, font_data, &mut embedded.widths);

            let [r, g, b] = item.color;
            self.ops.push(Operation::new("BT", vec![]));
            self.ops.push(Operation::new(
                "Tf",
                vec![
                    Object::Name(embedded.resource.as_bytes().to_vec()),
                    Object::Real(item.size),
                ],
            ));
            self.ops.push(Operation::new(
                "rg",
                vec![Object::Real(r), Object::Real(g), Object::Real(b)],
            ));
            self.ops.push(Operation::new("Td", vec![Object::Real(item.x), Object::Real(item.y)]));
            self.ops.push(Operation::new("TJ", vec![Object::Array(tj)]));
            self.ops.push(Operation::new("ET", vec![]));

            self.report.text_drawn.push(item.field);
        }
        Ok(())
    }

    /// Place an image in its fixed rectangle.
    pub fn draw_image(
        &mut self,
        slot: &ImageSlot,
        image: &EmbeddableImage,
        layout: &CertificateLayout,
    ) -> Result<(), ImageDecodeError> {
        let xobject_id = add_image_xobject(&mut self.doc, image)?;
        let name = format!("CFImg{}", self.images.len() + 1);
        self.images.push((name.clone(), xobject_id));

        let (x, y) = (layout.to_pt(slot.x), layout.to_pt(slot.y));
        let (w, h) = (layout.to_pt(slot.width), layout.to_pt(slot.height));
        self.ops.push(Operation::new("q", vec![]));
        self.ops.push(Operation::new(
            "cm",
            vec![
                Object::Real(w),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(h),
                Object::Real(x),
                Object::Real(y),
            ],
        ));
        self.ops.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
        self.ops.push(Operation::new("Q", vec![]));

        self.report.images_drawn.push(slot.source);
        Ok(())
    }

    /// Note an image that could not be placed.
    pub fn skip_image(&mut self, source: ImageSource, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("skipping {source:?} image: {reason}");
        self.report.skipped.push(SkippedImage { source, reason });
    }

    pub fn report(&self) -> &RenderReport {
        &self.report
    }

    /// Finish the fonts, attach resources and content, and serialise.
    pub fn finish(mut self) -> Result<(Vec<u8>, RenderReport), RenderError> {
        let mut font_resources = Dictionary::new();
        let mut roles: Vec<FontRole> = self.fonts.keys().copied().collect();
        roles.sort();
        for role in roles {
            if let Some(font) = self.fonts.remove(&role) {
                font_resources.set(font.resource.as_bytes().to_vec(), Object::Reference(font.type0_id));
                write_font_objects(&mut self.doc, font);
            }
        }

        let page_id = self.page_id;
        let mut resources = self
            .doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .ok()
            .and_then(|page| page.get(b"Resources").ok())
            .and_then(|r| r.as_dict().ok())
            .cloned()
            .unwrap_or_default();

        if !font_resources.is_empty() {
            let mut fonts = sub_dictionary(&self.doc, &resources, b"Font");
            for (k, v) in font_resources.iter() {
                fonts.set(k.clone(), v.clone());
            }
            resources.set("Font", Object::Dictionary(fonts));
        }
        if !self.images.is_empty() {
            let mut xobjects = sub_dictionary(&self.doc, &resources, b"XObject");
            for (name, id) in &self.images {
                xobjects.set(name.as_bytes().to_vec(), Object::Reference(*id));
            }
            resources.set("XObject", Object::Dictionary(xobjects));
        }

        {
            let page = self
                .doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(|e| RenderError::Serialize(format!("page vanished: {e}")))?;
            page.set("Resources", Object::Dictionary(resources));
        }

        let mut ops = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
        ops.append(&mut self.ops);
        ops.push(Operation::new("Q", vec![]));
        let overlay = Content { operations: ops }
            .encode()
            .map_err(|e| RenderError::Serialize(format!("content encode: {e}")))?;
        wrap_page_contents(&mut self.doc, page_id, overlay)?;

        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| RenderError::Serialize(e.to_string()))?;
        Ok((output, self.report))
    }
}

/// Render a record in one call, with every image already in memory.
///
/// `images` maps each slot to the bytes that should fill it; slots with no
/// entry are left empty. Images that fail to normalise are skipped.
pub fn render(
    template: &[u8],
    fonts: FontPrograms,
    record: &CertificateRecord,
    images: &HashMap<ImageSource, FetchedAsset>,
    layout: &CertificateLayout,
) -> Result<(Vec<u8>, RenderReport), RenderError> {
    let mut canvas = CertificateCanvas::load_template(template)?;
    let fonts = FontSet::load(fonts)?;
    canvas.embed_fonts(&fonts);
    canvas.draw_text(&plan_text(record, layout, &fonts), &fonts)?;

    for slot in &layout.images {
        let Some(asset) = images.get(&slot.source) else {
            continue;
        };
        match normalize(&asset.bytes, asset.content_type.as_deref()) {
            Ok(image) => {
                if let Err(e) = canvas.draw_image(slot, &image, layout) {
                    canvas.skip_image(slot.source, e.to_string());
                }
            }
            Err(e) => canvas.skip_image(slot.source, e.to_string()),
        }
    }

    canvas.finish()
}

/// Build the `TJ` operand: glyph ids as 2-byte hex strings, with a
/// positioning adjustment wherever the shaped advance differs from the
/// advance in the font's `/W` entry.
fn tj_array(shaped: &ShapedText, font: &FontData, widths: &mut BTreeMap<u16, f32>) -> Vec<Object> {
    let mut out = Vec::new();
    let mut run: Vec<u8> = Vec::new();
    let scale = 1000.0 / font.units_per_em;

    for glyph in &shaped.glyphs {
        let nominal = *widths
            .entry(glyph.gid)
            .or_insert_with(|| font.glyph_width_pdf(glyph.gid));
        run.extend_from_slice(&glyph.gid.to_be_bytes());

        let shaped_adv = glyph.x_advance as f32 * scale;
        let adjust = nominal - shaped_adv;
        if adjust.abs() > 0.01 {
            out.push(Object::String(std::mem::take(&mut run), StringFormat::Hexadecimal));
            out.push(Object::Real(adjust));
        }
    }
    if !run.is_empty() {
        out.push(Object::String(run, StringFormat::Hexadecimal));
    }
    out
}

fn write_font_objects(doc: &mut Document, font: EmbeddedFont) {
    let mut w = Vec::new();
    for (gid, width) in &font.widths {
        w.push(Object::Integer(i64::from(*gid)));
        w.push(Object::Array(vec![Object::Integer(width.round() as i64)]));
    }

    let mut cid_font = dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => Object::Name(font.base_font.as_bytes().to_vec()),
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => Object::Integer(0),
        },
        "FontDescriptor" => Object::Reference(font.descriptor_id),
        "CIDToGIDMap" => "Identity",
    };
    if !w.is_empty() {
        cid_font.set("W", Object::Array(w));
    }
    doc.objects.insert(font.cid_font_id, Object::Dictionary(cid_font));

    let mut to_unicode = Stream::new(Dictionary::new(), to_unicode_cmap(&font.usage.glyphs).into_bytes());
    let _ = to_unicode.compress();
    doc.objects.insert(font.to_unicode_id, Object::Stream(to_unicode));

    let type0 = dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => Object::Name(font.base_font.as_bytes().to_vec()),
        "Encoding" => "Identity-H",
        "DescendantFonts" => Object::Array(vec![Object::Reference(font.cid_font_id)]),
        "ToUnicode" => Object::Reference(font.to_unicode_id),
    };
    doc.objects.insert(font.type0_id, Object::Dictionary(type0));
}

/// ToUnicode CMap mapping each glyph id back to the text it renders.
fn to_unicode_cmap(glyphs: &BTreeMap<u16, String>) -> String {
    let entries: Vec<(&u16, &String)> = glyphs.iter().collect();

    let mut out = String::new();
    out.push_str("/CIDInit /ProcSet findresource begin\n");
    out.push_str("12 dict begin\n");
    out.push_str("begincmap\n");
    out.push_str("/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    out.push_str("/CMapName /Adobe-Identity-UCS def\n");
    out.push_str("/CMapType 2 def\n");
    out.push_str("1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n");

    for chunk in entries.chunks(100) {
        let _ = writeln!(out, "{} beginbfchar", chunk.len());
        for (gid, text) in chunk {
            let mut utf16 = String::new();
            for unit in text.encode_utf16() {
                let _ = write!(utf16, "{unit:04X}");
            }
            let _ = writeln!(out, "<{gid:04X}> <{utf16}>");
        }
        out.push_str("endbfchar\n");
    }

    out.push_str("endcmap\n");
    out.push_str("CMapName currentdict /CMap defineresource pop\n");
    out.push_str("end\nend\n");
    out
}

/// Add an image XObject (plus soft mask for PNGs with alpha).
fn add_image_xobject(doc: &mut Document, image: &EmbeddableImage) -> Result<ObjectId, ImageDecodeError> {
    match image.format {
        EmbedFormat::Jpeg { color } => {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(image.width)),
                "Height" => Object::Integer(i64::from(image.height)),
                "ColorSpace" => color.color_space(),
                "BitsPerComponent" => Object::Integer(8),
                "Filter" => "DCTDecode",
            };
            // CMYK JPEGs are written inverted by the usual encoders.
            if color == JpegColor::Cmyk {
                let decode = [1, 0, 1, 0, 1, 0, 1, 0].map(Object::Integer).to_vec();
                dict.set("Decode", Object::Array(decode));
            }
            let stream = Stream::new(dict, image.bytes.clone()).with_compression(false);
            Ok(doc.add_object(stream))
        }
        EmbedFormat::Png => {
            let decoded = ::image::load_from_memory_with_format(&image.bytes, ::image::ImageFormat::Png)
                .map_err(|e| ImageDecodeError(format!("PNG decode: {e}")))?;
            let (width, height) = (decoded.width(), decoded.height());
            let color = decoded.color();

            let smask_id = if color.has_alpha() {
                let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
                let mut mask = Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => Object::Integer(i64::from(width)),
                        "Height" => Object::Integer(i64::from(height)),
                        "ColorSpace" => "DeviceGray",
                        "BitsPerComponent" => Object::Integer(8),
                    },
                    alpha,
                );
                let _ = mask.compress();
                Some(doc.add_object(mask))
            } else {
                None
            };

            // 16-bit sources keep their depth; samples are big-endian.
            let deep = color.bytes_per_pixel() > color.channel_count();
            let (color_space, samples) = match (color.has_color(), deep) {
                (true, false) => ("DeviceRGB", decoded.to_rgb8().into_raw()),
                (false, false) => ("DeviceGray", decoded.to_luma8().into_raw()),
                (true, true) => ("DeviceRGB", be_samples(&decoded.to_rgb16().into_raw())),
                (false, true) => ("DeviceGray", be_samples(&decoded.to_luma16().into_raw())),
            };
            let bits = if deep { 16 } else { 8 };

            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => Object::Integer(i64::from(width)),
                "Height" => Object::Integer(i64::from(height)),
                "ColorSpace" => color_space,
                "BitsPerComponent" => Object::Integer(bits),
            };
            if let Some(id) = smask_id {
                dict.set("SMask", Object::Reference(id));
            }
            let mut stream = Stream::new(dict, samples);
            let _ = stream.compress();
            Ok(doc.add_object(stream))
        }
    }
}

fn be_samples(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Look up an attribute on the page or the nearest ancestor that has it.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_object(page_id).and_then(Object::as_dict).ok()?;
    for _ in 0..MAX_INHERIT_DEPTH {
        if let Ok(value) = current.get(key) {
            return match value {
                Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_object(parent).and_then(Object::as_dict).ok()?;
    }
    None
}

fn get_media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(Object::Array(arr)) = inherited(doc, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let values: Vec<f32> = arr
        .iter()
        .filter_map(|o| match o {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r),
            _ => None,
        })
        .collect();
    match values.as_slice() {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => DEFAULT_MEDIA_BOX,
    }
}

fn effective_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    match inherited(doc, page_id, b"Resources") {
        Some(Object::Dictionary(d)) => d.clone(),
        _ => Dictionary::new(),
    }
}

/// Clone a sub-dictionary of `resources` (`/Font`, `/XObject`), resolving an
/// indirect reference if needed.
fn sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    match resources.get(key) {
        Ok(Object::Dictionary(d)) => d.clone(),
        Ok(Object::Reference(id)) => doc
            .get_object(*id)
            .and_then(Object::as_dict)
            .cloned()
            .unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

/// Point the page tree at a single page.
fn keep_single_page(doc: &mut Document, page_id: ObjectId) -> Result<(), RenderError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| RenderError::TemplateLoad(format!("no document catalog: {e}")))?;
    let pages_id = doc
        .get_object(catalog_id)
        .and_then(Object::as_dict)
        .and_then(|c| c.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| RenderError::TemplateLoad(format!("catalog has no page tree: {e}")))?;

    if let Ok(pages) = doc.get_object_mut(pages_id).and_then(Object::as_dict_mut) {
        pages.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
        pages.set("Count", Object::Integer(1));
    }
    if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
        page.set("Parent", Object::Reference(pages_id));
    }
    Ok(())
}

/// Wrap the existing page content in `q` and append the overlay.
///
/// The overlay starts with the `Q` that closes the template's `q`, so the
/// template cannot leak graphics state (CTM, colours) into our drawing.
fn wrap_page_contents(doc: &mut Document, page_id: ObjectId, overlay: Vec<u8>) -> Result<(), RenderError> {
    let existing = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .ok()
        .and_then(|page| page.get(b"Contents").ok())
        .cloned();

    let mut parts: Vec<Object> = match existing {
        Some(Object::Reference(id)) => match doc.get_object(id) {
            Ok(Object::Array(arr)) => arr.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(arr)) => arr,
        _ => Vec::new(),
    };

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));
    parts.insert(0, Object::Reference(open_id));
    parts.push(Object::Reference(overlay_id));

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| RenderError::Serialize(format!("page vanished: {e}")))?;
    page.set("Contents", Object::Array(parts));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth_font::synth_font;
    use crate::templates::blank_template;

    fn font_set() -> FontSet {
        FontSet::load(FontPrograms {
            display: synth_font(),
            body: synth_font(),
        })
        .unwrap()
    }

    #[test]
    fn plan_right_aligns_on_anchor() {
        let fonts = font_set();
        let layout = CertificateLayout::default();
        let mut record = CertificateRecord::default();
        record.id_number = "1234567890".into();
        record.certificate_number = "C1".into();

        let plan = plan_text(&record, &layout, &fonts);
        let id = plan.iter().find(|p| p.field == TextField::IdNumber).unwrap();
        let cert = plan
            .iter()
            .find(|p| p.field == TextField::CertificateNumber)
            .unwrap();
        assert!((id.right_edge() - 8.2 * 72.0).abs() < 0.001);
        assert!((cert.right_edge() - 8.2 * 72.0).abs() < 0.001);
        assert!(cert.x > id.x);
    }

    #[test]
    fn plan_trims_values() {
        let fonts = font_set();
        let layout = CertificateLayout::default();
        let mut record = CertificateRecord::default();
        record.profession = "  Chef  ".into();
        let plan = plan_text(&record, &layout, &fonts);
        let p = plan.iter().find(|p| p.field == TextField::Profession).unwrap();
        assert_eq!(p.text, "Chef");
        assert!((p.width - fonts.body.measure_text_width("Chef", 11.0)).abs() < 0.001);
    }

    #[test]
    fn garbage_template_is_a_template_error() {
        let err = CertificateCanvas::load_template(b"%PDF-garbage").err().unwrap();
        assert!(matches!(err, RenderError::TemplateLoad(_)));
    }

    #[test]
    fn blank_template_loads_with_letter_size() {
        let canvas = CertificateCanvas::load_template(&blank_template(612.0, 792.0)).unwrap();
        let (w, h) = canvas.page_size();
        assert!((w - 612.0).abs() < 0.5);
        assert!((h - 792.0).abs() < 0.5);
    }

    #[test]
    fn to_unicode_maps_glyphs() {
        let mut glyphs = BTreeMap::new();
        glyphs.insert(3u16, "A".to_string());
        glyphs.insert(4u16, "\u{1F600}".to_string());
        let cmap = to_unicode_cmap(&glyphs);
        assert!(cmap.contains("<0003> <0041>"));
        assert!(cmap.contains("<0004> <D83DDE00>"));
    }

    fn xobject(doc: &Document, id: ObjectId) -> &Stream {
        doc.get_object(id).unwrap().as_stream().unwrap()
    }

    #[test]
    fn cmyk_jpeg_gets_cmyk_color_space() {
        let mut doc = Document::with_version("1.7");
        let image = EmbeddableImage {
            format: EmbedFormat::Jpeg { color: JpegColor::Cmyk },
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            width: 2,
            height: 2,
        };
        let id = add_image_xobject(&mut doc, &image).unwrap();
        let stream = xobject(&doc, id);
        assert_eq!(stream.dict.get(b"ColorSpace").unwrap().as_name().unwrap(), b"DeviceCMYK");
        assert_eq!(stream.dict.get(b"Decode").unwrap().as_array().unwrap().len(), 8);
        assert_eq!(stream.content, image.bytes);
    }

    #[test]
    fn sixteen_bit_png_keeps_its_depth() {
        let img = ::image::ImageBuffer::<::image::Rgb<u16>, _>::from_fn(3, 2, |x, y| {
            ::image::Rgb([x as u16 * 1000 + 1, y as u16 * 700 + 3, 65535])
        });
        let mut png = Vec::new();
        ::image::DynamicImage::ImageRgb16(img)
            .write_to(&mut std::io::Cursor::new(&mut png), ::image::ImageFormat::Png)
            .unwrap();
        let image = normalize(&png, Some("image/png")).unwrap();

        let mut doc = Document::with_version("1.7");
        let id = add_image_xobject(&mut doc, &image).unwrap();
        let stream = xobject(&doc, id);
        assert_eq!(stream.dict.get(b"BitsPerComponent").unwrap().as_i64().unwrap(), 16);
        let samples = stream.decompressed_content().unwrap();
        assert_eq!(samples.len(), 3 * 2 * 3 * 2);
        // Second pixel, red channel: 1001 big-endian.
        assert_eq!(&samples[6..8], &1001u16.to_be_bytes());
    }

    #[test]
    fn tj_has_no_adjustments_without_kerning() {
        let fonts = font_set();
        let shaped = fonts.body.shape("CERT-001");
        let mut widths = BTreeMap::new();
        let tj = tj_array(&shaped, &fonts.body, &mut widths);
        assert_eq!(tj.len(), 1);
        match &tj[0] {
            Object::String(bytes, _) => assert_eq!(bytes.len(), 2 * "CERT-001".len()),
            other => panic!("expected glyph string, got {other:?}"),
        }
    }
}
