//! Glyph positions from content streams
//!
//! lopdf decodes content streams but does no text layout. This walks a page's
//! text operators, tracking the current transformation and text matrices, and
//! records a page-space box for every shown character. Glyph widths come from
//! the font's `/Widths` array; standard fonts that omit it fall back to
//! Helvetica metrics, or a fixed pitch for Courier. Composite (Type0) fonts
//! advance the pen but contribute no characters.

use std::collections::BTreeMap;
use std::rc::Rc;

use image::{Rgba, RgbaImage};
use lopdf::content::Operation;
use lopdf::{Dictionary, Object, ObjectId};

use crate::geometry::{PageSize, Rect};

/// Glyph extent above and below the baseline, in text space
const ASCENT: f64 = 0.8;
const DESCENT: f64 = -0.2;
/// Horizontal gap (in ems) between two shown glyphs that reads as a space
const WORD_GAP: f64 = 0.2;
const DEFAULT_WIDTH: f64 = 500.0;
const COURIER_WIDTH: f64 = 600.0;
const COMPOSITE_WIDTH: f64 = 1000.0;

/// Helvetica advance widths for codes 32..=126, in thousandths of an em
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

pub(crate) const GLYPH_FILL: Rgba<u8> = Rgba([190, 190, 190, 255]);
pub(crate) const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Paint one glyph box, inset so adjacent glyphs stay visually separate
pub(crate) fn fill_glyph(image: &mut RgbaImage, glyph: &Rect, zoom: f32) {
    let (width, height) = image.dimensions();
    let inset_y = glyph.height() / 6.0;
    let glyph = Rect::new(glyph.x0 + 0.5, glyph.y0 + inset_y, glyph.x1 - 0.5, glyph.y1 - inset_y);
    if let Some((l, t, r, b)) = glyph.pixel_bounds(zoom, width, height) {
        for y in t..=b {
            for x in l..=r {
                image.put_pixel(x, y, GLYPH_FILL);
            }
        }
    }
}

/// Page box in default user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaBox {
    pub left: f64,
    pub bottom: f64,
    pub size: PageSize,
}

impl MediaBox {
    /// Convert a user-space box (bottom-left origin) into page space
    fn to_page(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::from_pdf_box(
            x0 - self.left,
            y0 - self.bottom,
            x1 - self.left,
            y1 - self.bottom,
            self.size.height,
        )
    }
}

/// Text of one page with the page-space box of every character.
///
/// Line breaks and inferred word gaps are part of the text but have no box.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    text: String,
    boxes: Vec<Option<Rect>>,
}

impl PageLayout {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Boxes of every occurrence of `literal`, in content order
    pub fn find(&self, literal: &str) -> Vec<Rect> {
        if literal.is_empty() || literal.contains('\n') {
            return Vec::new();
        }
        let len = literal.chars().count();
        self.text
            .match_indices(literal)
            .filter_map(|(byte_idx, _)| {
                let start = self.text[..byte_idx].chars().count();
                self.boxes[start..start + len]
                    .iter()
                    .flatten()
                    .copied()
                    .reduce(|acc, r| acc.union(&r))
            })
            .collect()
    }

    /// Boxes of the visible (non-whitespace) characters
    pub fn glyphs(&self) -> impl Iterator<Item = &Rect> + '_ {
        self.text
            .chars()
            .zip(&self.boxes)
            .filter(|(ch, _)| !ch.is_whitespace())
            .filter_map(|(_, rect)| rect.as_ref())
    }

    fn push_glyph(&mut self, ch: char, rect: Rect) {
        self.text.push(ch);
        self.boxes.push(Some(rect));
    }

    /// Insert a separator unless the text already ends in whitespace
    fn push_break(&mut self, separator: char) {
        match self.text.chars().last() {
            None => {}
            Some('\n') => {}
            Some(last) if last.is_whitespace() && separator != '\n' => {}
            Some(last) if last.is_whitespace() => {
                self.text.pop();
                self.boxes.pop();
                self.push_break('\n');
            }
            Some(_) => {
                self.text.push(separator);
                self.boxes.push(None);
            }
        }
    }
}

/// Affine matrix `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translation(tx: f64, ty: f64) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self` applied first, then `next`
    fn then(&self, next: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = next.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }
}

/// Widths and byte decoding of one font resource
#[derive(Debug, Clone)]
struct FontMetrics {
    /// Character for each single-byte code; `None` for composite fonts
    decode: Option<Vec<Option<char>>>,
    first_char: i64,
    widths: Vec<f64>,
    courier: bool,
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self {
            decode: Some(decode_table("StandardEncoding")),
            first_char: 0,
            widths: Vec::new(),
            courier: false,
        }
    }
}

impl FontMetrics {
    fn load(doc: &lopdf::Document, font: &Dictionary) -> Self {
        let composite = font
            .get(b"Subtype")
            .and_then(Object::as_name)
            .is_ok_and(|subtype| subtype == b"Type0");
        let courier = font
            .get(b"BaseFont")
            .and_then(Object::as_name)
            .is_ok_and(|name| name.windows(7).any(|w| w == b"Courier"));

        let first_char = font
            .get(b"FirstChar")
            .and_then(Object::as_i64)
            .unwrap_or(0);
        let widths: Vec<f64> = font
            .get(b"Widths")
            .and_then(|obj| doc.dereference(obj))
            .and_then(|(_, obj)| obj.as_array())
            .map(|array| array.iter().filter_map(number).collect())
            .unwrap_or_default();

        Self {
            decode: (!composite).then(|| decode_table(font.get_font_encoding())),
            first_char,
            widths,
            courier,
        }
    }

    /// Advance width of `code`, in thousandths of an em
    fn width(&self, code: u32) -> f64 {
        if self.decode.is_none() {
            return COMPOSITE_WIDTH;
        }
        let declared = usize::try_from(i64::from(code) - self.first_char)
            .ok()
            .and_then(|index| self.widths.get(index));
        match declared {
            Some(w) => *w,
            None if self.courier => COURIER_WIDTH,
            None => match code {
                32..=126 => f64::from(HELVETICA_WIDTHS[(code - 32) as usize]),
                _ => DEFAULT_WIDTH,
            },
        }
    }
}

fn decode_table(encoding: &str) -> Vec<Option<char>> {
    (0..=255u8)
        .map(|byte| {
            lopdf::Document::decode_text(Some(encoding), &[byte])
                .chars()
                .next()
                .filter(|ch| !ch.is_control() && *ch != char::REPLACEMENT_CHARACTER)
        })
        .collect()
}

fn number(obj: &Object) -> Option<f64> {
    obj.as_float().ok().map(f64::from)
}

/// Graphics state saved by `q` and restored by `Q`
#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Vec<u8>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            font: None,
            font_size: 12.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

/// Baseline of the last shown glyph, in user space
#[derive(Debug, Clone, Copy)]
struct Pen {
    y: f64,
    end_x: f64,
    em: f64,
}

struct Walker<'a> {
    media: MediaBox,
    fonts: BTreeMap<Vec<u8>, Rc<FontMetrics>>,
    fallback: Rc<FontMetrics>,
    state: GraphicsState,
    saved: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    last: Option<Pen>,
    layout: &'a mut PageLayout,
}

impl Walker<'_> {
    fn operate(&mut self, op: &Operation) {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(number);

        match op.operator.as_str() {
            "q" => self.saved.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(m) = matrix(operands) {
                    self.state.ctm = m.then(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                self.state.font = operands
                    .first()
                    .and_then(|obj| obj.as_name().ok())
                    .map(<[u8]>::to_vec);
                if let Some(size) = num(1) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.state.char_spacing = num(0).unwrap_or(0.0),
            "Tw" => self.state.word_spacing = num(0).unwrap_or(0.0),
            "Tz" => self.state.scale = num(0).unwrap_or(100.0) / 100.0,
            "TL" => self.state.leading = num(0).unwrap_or(0.0),
            "Ts" => self.state.rise = num(0).unwrap_or(0.0),
            "Td" => self.next_line(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
            "TD" => {
                let ty = num(1).unwrap_or(0.0);
                self.state.leading = -ty;
                self.next_line(num(0).unwrap_or(0.0), ty);
            }
            "Tm" => {
                if let Some(m) = matrix(operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(0.0, -self.state.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.state.word_spacing = num(0).unwrap_or(0.0);
                self.state.char_spacing = num(1).unwrap_or(0.0);
                self.next_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                let Some(Ok(items)) = operands.first().map(Object::as_array) else {
                    return;
                };
                for item in items {
                    match item {
                        Object::String(bytes, _) => self.show(bytes),
                        other => {
                            if let Some(adjust) = number(other) {
                                let tx = -adjust / 1000.0 * self.state.font_size * self.state.scale;
                                self.tm = Matrix::translation(tx, 0.0).then(&self.tm);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translation(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, bytes: &[u8]) {
        let metrics = self
            .state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback)
            .clone();
        let font = metrics.as_ref();
        let state = &self.state;
        let text_space = Matrix([
            state.font_size * state.scale,
            0.0,
            0.0,
            state.font_size,
            0.0,
            state.rise,
        ]);

        let codes: Vec<u32> = match font.decode {
            Some(_) => bytes.iter().map(|&b| u32::from(b)).collect(),
            None => bytes
                .chunks(2)
                .map(|pair| pair.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
                .collect(),
        };

        for code in codes {
            let w0 = font.width(code) / 1000.0;
            let trm = text_space.then(&self.tm).then(&self.state.ctm);

            let ch = font
                .decode
                .as_ref()
                .and_then(|table| table.get(code as usize).copied().flatten());
            if let Some(ch) = ch {
                self.place(ch, &trm, w0);
            }

            let word = if font.decode.is_some() && code == 32 {
                self.state.word_spacing
            } else {
                0.0
            };
            let tx = (w0 * self.state.font_size + self.state.char_spacing + word) * self.state.scale;
            self.tm = Matrix::translation(tx, 0.0).then(&self.tm);
        }
    }

    fn place(&mut self, ch: char, trm: &Matrix, w0: f64) {
        let corners = [
            trm.apply(0.0, DESCENT),
            trm.apply(w0, DESCENT),
            trm.apply(0.0, ASCENT),
            trm.apply(w0, ASCENT),
        ];
        let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
        for (x, y) in corners {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
            return;
        }

        let (start_x, baseline) = trm.apply(0.0, 0.0);
        let (end_x, _) = trm.apply(w0, 0.0);
        let em = (y1 - y0).abs().max(f64::EPSILON);

        if let Some(pen) = self.last {
            if (baseline - pen.y).abs() > pen.em * 0.5 {
                self.layout.push_break('\n');
            } else if start_x - pen.end_x > pen.em * WORD_GAP {
                self.layout.push_break(' ');
            }
        }
        self.layout.push_glyph(ch, self.media.to_page(x0, y0, x1, y1));
        self.last = Some(Pen {
            y: baseline,
            end_x,
            em,
        });
    }
}

fn matrix(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0; 6];
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(Matrix(m))
}

/// Lay out the text of `page_id` in page space
pub fn layout_page(
    doc: &lopdf::Document,
    page_id: ObjectId,
    media: MediaBox,
) -> lopdf::Result<PageLayout> {
    let content = doc.get_and_decode_page_content(page_id)?;
    let fonts: BTreeMap<Vec<u8>, Rc<FontMetrics>> = doc
        .get_page_fonts(page_id)
        .into_iter()
        .map(|(name, font)| (name, Rc::new(FontMetrics::load(doc, font))))
        .collect();

    let mut layout = PageLayout::default();
    let mut walker = Walker {
        media,
        fonts,
        fallback: Rc::new(FontMetrics::default()),
        state: GraphicsState::default(),
        saved: Vec::new(),
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        last: None,
        layout: &mut layout,
    };
    for op in &content.operations {
        walker.operate(op);
    }

    if !layout.text.is_empty() && !layout.text.ends_with('\n') {
        layout.text.push('\n');
        layout.boxes.push(None);
    }
    Ok(layout)
}
