//! Inline `style="..."` parsing.
//!
//! Declarations are parsed with lightningcss. Each supported property is a
//! [`StyleCapability`] backed by one entry in a static handler registry. A
//! handler owns both directions: reading a typed lightningcss [`Property`]
//! into the [`InlineStyle`] record and rendering it back. Capabilities can be
//! switched off per engine; disabled properties are ignored exactly like
//! unknown ones.

use crate::types::Pt;
use lightningcss::properties::Property;
use lightningcss::properties::font::{
    AbsoluteFontSize, FontFamily, FontSize, LineHeight as CssLineHeight, RelativeFontSize,
};
use lightningcss::properties::size::Size as CssSize;
use lightningcss::properties::text::TextAlign as CssTextAlign;
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use lightningcss::traits::{Parse, ToCss};
use lightningcss::values::length::{LengthPercentage, LengthPercentageOrAuto, LengthValue};
use lightningcss::values::number::CSSNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StyleCapability {
    FontFamily,
    FontSize,
    LineHeight,
    MarginLeft,
    MarginTop,
    MarginBottom,
    TextAlign,
    Width,
}

impl StyleCapability {
    pub const ALL: [StyleCapability; 8] = [
        StyleCapability::FontFamily,
        StyleCapability::FontSize,
        StyleCapability::LineHeight,
        StyleCapability::MarginLeft,
        StyleCapability::MarginTop,
        StyleCapability::MarginBottom,
        StyleCapability::TextAlign,
        StyleCapability::Width,
    ];

    fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn from_name(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace('_', "-");
        HANDLERS
            .iter()
            .find(|handler| handler.property == key)
            .map(|handler| handler.capability)
    }
}

/// Set of enabled style capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleCapabilities(u16);

impl Default for StyleCapabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl StyleCapabilities {
    pub fn all() -> Self {
        StyleCapability::ALL
            .iter()
            .fold(Self::none(), |set, cap| set.with(*cap))
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn with(self, capability: StyleCapability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn without(self, capability: StyleCapability) -> Self {
        Self(self.0 & !capability.bit())
    }

    pub fn contains(self, capability: StyleCapability) -> bool {
        self.0 & capability.bit() != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Pt(f32),
    Px(f32),
    Mm(f32),
    Cm(f32),
    In(f32),
    Em(f32),
    Percent(f32),
}

impl Length {
    /// Parse a CSS length. A bare number is taken as pixels, the way HTML
    /// `width` attributes are written.
    pub fn parse(raw: &str) -> Option<Length> {
        let raw = raw.trim();
        if let Ok(number) = CSSNumber::parse_string(raw) {
            return number.is_finite().then_some(Length::Px(number));
        }
        LengthPercentage::parse_string(raw)
            .ok()
            .as_ref()
            .and_then(Length::from_css)
    }

    fn from_css(value: &LengthPercentage) -> Option<Length> {
        match value {
            LengthPercentage::Dimension(length) => Length::from_css_value(length),
            LengthPercentage::Percentage(pct) => Some(Length::Percent(pct.0 * 100.0)),
            LengthPercentage::Calc(_) => None,
        }
    }

    fn from_css_value(value: &LengthValue) -> Option<Length> {
        match value {
            LengthValue::Pt(v) => Some(Length::Pt(*v)),
            LengthValue::Px(v) => Some(Length::Px(*v)),
            LengthValue::Mm(v) => Some(Length::Mm(*v)),
            LengthValue::Cm(v) => Some(Length::Cm(*v)),
            LengthValue::In(v) => Some(Length::In(*v)),
            LengthValue::Em(v) | LengthValue::Rem(v) => Some(Length::Em(*v)),
            other => other.to_px().map(Length::Px),
        }
    }

    fn value(self) -> f32 {
        match self {
            Length::Pt(v)
            | Length::Px(v)
            | Length::Mm(v)
            | Length::Cm(v)
            | Length::In(v)
            | Length::Em(v)
            | Length::Percent(v) => v,
        }
    }

    /// Resolve to points. `Em` is relative to `font_size`, `Percent` to
    /// `basis`.
    pub fn to_pt(self, font_size: Pt, basis: Pt) -> Pt {
        match self {
            Length::Pt(v) => Pt::from_f32(v),
            Length::Px(v) => Pt::from_px(v),
            Length::Mm(v) => Pt::from_mm(v),
            Length::Cm(v) => Pt::from_mm(v * 10.0),
            Length::In(v) => Pt::from_f32(v * 72.0),
            Length::Em(v) => font_size * v,
            Length::Percent(v) => basis * (v / 100.0),
        }
    }

    pub fn to_css(self) -> String {
        match self {
            Length::Pt(v) => format!("{}pt", v),
            Length::Px(v) => format!("{}px", v),
            Length::Mm(v) => format!("{}mm", v),
            Length::Cm(v) => format!("{}cm", v),
            Length::In(v) => format!("{}in", v),
            Length::Em(v) => format!("{}em", v),
            Length::Percent(v) => format!("{}%", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineHeight {
    Multiplier(f32),
    Length(Length),
}

impl LineHeight {
    pub fn parse(raw: &str) -> Option<LineHeight> {
        CssLineHeight::parse_string(raw.trim())
            .ok()
            .as_ref()
            .and_then(LineHeight::from_css)
    }

    fn from_css(value: &CssLineHeight) -> Option<LineHeight> {
        let line_height = match value {
            CssLineHeight::Normal => LineHeight::Multiplier(1.2),
            CssLineHeight::Number(n) => LineHeight::Multiplier(*n),
            CssLineHeight::Length(length) => match Length::from_css(length)? {
                Length::Percent(p) => LineHeight::Multiplier(p / 100.0),
                Length::Em(v) => LineHeight::Multiplier(v),
                other => LineHeight::Length(other),
            },
        };
        let raw = match line_height {
            LineHeight::Multiplier(m) => m,
            LineHeight::Length(len) => len.value(),
        };
        (raw.is_finite() && raw > 0.0).then_some(line_height)
    }

    /// Multiplier relative to `font_size`.
    pub fn multiplier(self, font_size: Pt) -> f32 {
        match self {
            LineHeight::Multiplier(m) => m,
            LineHeight::Length(len) => {
                let size = font_size.to_f32();
                if size <= 0.0 {
                    return 1.0;
                }
                len.to_pt(font_size, font_size).to_f32() / size
            }
        }
    }

    pub fn to_css(self) -> String {
        match self {
            LineHeight::Multiplier(m) => format!("{}", m),
            LineHeight::Length(len) => len.to_css(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    /// Accepts both CSS `text-align` values and the legacy `align` attribute.
    pub fn parse(raw: &str) -> Option<TextAlign> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("middle") {
            return Some(TextAlign::Center);
        }
        CssTextAlign::parse_string(raw)
            .ok()
            .as_ref()
            .and_then(TextAlign::from_css)
    }

    fn from_css(value: &CssTextAlign) -> Option<TextAlign> {
        match value {
            CssTextAlign::Left | CssTextAlign::Start => Some(TextAlign::Left),
            CssTextAlign::Center => Some(TextAlign::Center),
            CssTextAlign::Right | CssTextAlign::End => Some(TextAlign::Right),
            CssTextAlign::Justify => Some(TextAlign::Justify),
            _ => None,
        }
    }

    pub fn as_css(self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        }
    }
}

/// Typed record of the recognized inline style properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlineStyle {
    pub font_family: Option<String>,
    pub font_size: Option<Length>,
    pub line_height: Option<LineHeight>,
    pub margin_left: Option<Length>,
    pub margin_top: Option<Length>,
    pub margin_bottom: Option<Length>,
    pub text_align: Option<TextAlign>,
    pub width: Option<Length>,
}

impl InlineStyle {
    /// Parse a `style` attribute. `!important` declarations win over normal
    /// ones; a malformed declaration drops only itself.
    pub fn parse(raw: &str, caps: StyleCapabilities) -> InlineStyle {
        let mut style = InlineStyle::default();
        let options = ParserOptions {
            error_recovery: true,
            ..ParserOptions::default()
        };
        let attribute = match StyleAttribute::parse(raw, options) {
            Ok(attribute) => attribute,
            Err(err) => {
                log::debug!("ignoring style attribute {:?}: {}", raw, err);
                return style;
            }
        };
        let block = &attribute.declarations;
        for property in block
            .declarations
            .iter()
            .chain(block.important_declarations.iter())
        {
            style.apply(property, caps);
        }
        style
    }

    fn apply(&mut self, property: &Property, caps: StyleCapabilities) {
        if let Property::Unparsed(unparsed) = property {
            log::debug!("ignoring invalid {} value", unparsed.property_id.name());
            return;
        }
        for handler in HANDLERS.iter().filter(|h| caps.contains(h.capability)) {
            if (handler.apply)(property, self) == Some(false) {
                log::debug!("ignoring unsupported {} value", handler.property);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == InlineStyle::default()
    }

    /// Render back to a `style` attribute value, in registry order.
    pub fn to_css(&self) -> String {
        HANDLERS
            .iter()
            .filter_map(|handler| {
                (handler.render)(self).map(|value| format!("{}: {}", handler.property, value))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

struct StyleHandler {
    capability: StyleCapability,
    property: &'static str,
    /// `None` when the property is not this handler's, otherwise whether
    /// the value was usable.
    apply: fn(&Property, &mut InlineStyle) -> Option<bool>,
    render: fn(&InlineStyle) -> Option<String>,
}

static HANDLERS: &[StyleHandler] = &[
    StyleHandler {
        capability: StyleCapability::FontFamily,
        property: "font-family",
        apply: apply_font_family,
        render: |style| style.font_family.as_deref().map(quote_family),
    },
    StyleHandler {
        capability: StyleCapability::FontSize,
        property: "font-size",
        apply: apply_font_size,
        render: |style| style.font_size.map(Length::to_css),
    },
    StyleHandler {
        capability: StyleCapability::LineHeight,
        property: "line-height",
        apply: apply_line_height,
        render: |style| style.line_height.map(LineHeight::to_css),
    },
    StyleHandler {
        capability: StyleCapability::MarginLeft,
        property: "margin-left",
        apply: apply_margin_left,
        render: |style| style.margin_left.map(Length::to_css),
    },
    StyleHandler {
        capability: StyleCapability::MarginTop,
        property: "margin-top",
        apply: apply_margin_top,
        render: |style| style.margin_top.map(Length::to_css),
    },
    StyleHandler {
        capability: StyleCapability::MarginBottom,
        property: "margin-bottom",
        apply: apply_margin_bottom,
        render: |style| style.margin_bottom.map(Length::to_css),
    },
    StyleHandler {
        capability: StyleCapability::TextAlign,
        property: "text-align",
        apply: apply_text_align,
        render: |style| style.text_align.map(|align| align.as_css().to_string()),
    },
    StyleHandler {
        capability: StyleCapability::Width,
        property: "width",
        apply: apply_width,
        render: |style| style.width.map(Length::to_css),
    },
];

/// Store `value` when it is present; a rejected value keeps the earlier one.
fn assign<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

fn non_negative(len: Length) -> Option<Length> {
    (len.value() >= 0.0).then_some(len)
}

fn apply_font_family(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::FontFamily(families) => Some(assign(&mut style.font_family, first_family(families))),
        _ => None,
    }
}

fn apply_font_size(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::FontSize(size) => Some(assign(
            &mut style.font_size,
            font_size_length(size).and_then(non_negative),
        )),
        _ => None,
    }
}

fn apply_line_height(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::LineHeight(value) => {
            Some(assign(&mut style.line_height, LineHeight::from_css(value)))
        }
        _ => None,
    }
}

fn apply_margin_left(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::MarginLeft(value) => Some(assign(&mut style.margin_left, margin_length(value))),
        Property::Margin(margin) => Some(assign(&mut style.margin_left, margin_length(&margin.left))),
        _ => None,
    }
}

fn apply_margin_top(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::MarginTop(value) => Some(assign(&mut style.margin_top, margin_length(value))),
        Property::Margin(margin) => Some(assign(&mut style.margin_top, margin_length(&margin.top))),
        _ => None,
    }
}

fn apply_margin_bottom(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::MarginBottom(value) => {
            Some(assign(&mut style.margin_bottom, margin_length(value)))
        }
        Property::Margin(margin) => {
            Some(assign(&mut style.margin_bottom, margin_length(&margin.bottom)))
        }
        _ => None,
    }
}

fn apply_text_align(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::TextAlign(value) => Some(assign(&mut style.text_align, TextAlign::from_css(value))),
        _ => None,
    }
}

fn apply_width(property: &Property, style: &mut InlineStyle) -> Option<bool> {
    match property {
        Property::Width(CssSize::LengthPercentage(length)) => Some(assign(
            &mut style.width,
            Length::from_css(length).and_then(non_negative),
        )),
        Property::Width(_) => Some(false),
        _ => None,
    }
}

fn margin_length(value: &LengthPercentageOrAuto) -> Option<Length> {
    match value {
        LengthPercentageOrAuto::LengthPercentage(length) => Length::from_css(length),
        LengthPercentageOrAuto::Auto => None,
    }
}

fn font_size_length(value: &FontSize) -> Option<Length> {
    match value {
        FontSize::Length(length) => Length::from_css(length),
        FontSize::Absolute(size) => Some(Length::Px(absolute_font_px(*size))),
        FontSize::Relative(RelativeFontSize::Smaller) => Some(Length::Em(0.8)),
        FontSize::Relative(RelativeFontSize::Larger) => Some(Length::Em(1.2)),
    }
}

fn absolute_font_px(size: AbsoluteFontSize) -> f32 {
    match size {
        AbsoluteFontSize::XXSmall => 9.0,
        AbsoluteFontSize::XSmall => 10.0,
        AbsoluteFontSize::Small => 13.0,
        AbsoluteFontSize::Medium => 16.0,
        AbsoluteFontSize::Large => 18.0,
        AbsoluteFontSize::XLarge => 24.0,
        AbsoluteFontSize::XXLarge => 32.0,
        AbsoluteFontSize::XXXLarge => 40.0,
    }
}

/// First family of a `font-family` list, unquoted. Generic families keep
/// their keyword (`serif`, `monospace`).
fn first_family(families: &[FontFamily]) -> Option<String> {
    let printed = families
        .first()?
        .to_css_string(PrinterOptions::default())
        .ok()?;
    let name = printed
        .trim()
        .trim_matches(|ch| ch == '"' || ch == '\'')
        .trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn quote_family(name: &str) -> String {
    if name.contains(' ') {
        format!("'{}'", name)
    } else {
        name.to_string()
    }
}
