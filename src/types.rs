use fixed::types::{I32F32, I64F64};

const PT_PER_MM: f32 = 72.0 / 25.4;
const PT_PER_PX: f32 = 0.75;

/// Length in PDF points. Fixed point, and every value built from a float is
/// snapped to a thousandth of a point, so layout is identical on every
/// platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::ZERO);

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        let snapped = (value as f64 * 1000.0).round() / 1000.0;
        Pt(I32F32::saturating_from_num(snapped))
    }

    pub fn from_mm(mm: f32) -> Pt {
        Pt::from_f32(mm * PT_PER_MM)
    }

    pub fn from_px(px: f32) -> Pt {
        Pt::from_f32(px * PT_PER_PX)
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    pub fn to_mm(self) -> f32 {
        self.to_f32() / PT_PER_MM
    }

    /// Rounded thousandths of a point, for number formatting.
    pub fn to_milli_i64(self) -> i64 {
        let wide = I64F64::from_num(self.0) * I64F64::from_num(1000);
        wide.round().to_num()
    }

    pub fn max(self, other: Pt) -> Pt {
        Ord::max(self, other)
    }

    pub fn min(self, other: Pt) -> Pt {
        Ord::min(self, other)
    }

    /// `self * num / denom` without an intermediate float.
    pub fn mul_ratio(self, num: i32, denom: i32) -> Pt {
        if denom == 0 {
            return Pt::ZERO;
        }
        let wide = I64F64::from_num(self.0) * I64F64::from_num(num) / I64F64::from_num(denom);
        Pt(I32F32::saturating_from_num(wide))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt(self.0.saturating_sub(rhs.0))
    }
}

impl std::ops::SubAssign for Pt {
    fn sub_assign(&mut self, rhs: Pt) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        Pt(self.0.saturating_mul_int(i64::from(rhs)))
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        self.mul_ratio(1, rhs)
    }
}

impl std::ops::Mul<f32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: f32) -> Pt {
        Pt::from_f32(self.to_f32() * rhs)
    }
}

impl std::ops::Div<f32> for Pt {
    type Output = Pt;
    fn div(self, rhs: f32) -> Pt {
        if rhs == 0.0 {
            return Pt::ZERO;
        }
        Pt::from_f32(self.to_f32() / rhs)
    }
}

impl std::ops::Neg for Pt {
    type Output = Pt;
    fn neg(self) -> Pt {
        Pt(self.0.saturating_neg())
    }
}

impl std::iter::Sum for Pt {
    fn sum<I: Iterator<Item = Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, |acc, v| acc + v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Self::from_mm(210.0, 297.0)
    }

    pub fn letter() -> Self {
        Self {
            width: Pt::from_f32(8.5 * 72.0),
            height: Pt::from_f32(11.0 * 72.0),
        }
    }

    pub fn from_mm(width_mm: f32, height_mm: f32) -> Self {
        Self {
            width: Pt::from_mm(width_mm),
            height: Pt::from_mm(height_mm),
        }
    }

    /// Long edge horizontal.
    pub fn landscape(self) -> Self {
        Self {
            width: self.width.max(self.height),
            height: self.width.min(self.height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    A4,
    Letter,
}

impl PageFormat {
    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "a4" => Some(PageFormat::A4),
            "letter" => Some(PageFormat::Letter),
            _ => None,
        }
    }

    pub fn size(self, orientation: Orientation) -> Size {
        let size = match self {
            PageFormat::A4 => Size::a4(),
            PageFormat::Letter => Size::letter(),
        };
        match orientation {
            Orientation::Portrait => size,
            Orientation::Landscape => size.landscape(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Margins {
    pub fn uniform(value: Pt) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }

    pub fn all_mm(value: f32) -> Self {
        Self::uniform(Pt::from_mm(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub const HIGHLIGHT: Color = Color {
        r: 1.0,
        g: 0.94,
        b: 0.4,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_round_trips_through_points() {
        let pt = Pt::from_mm(20.0);
        assert!((pt.to_f32() - 56.693).abs() < 0.01, "got {}", pt.to_f32());
        assert!((pt.to_mm() - 20.0).abs() < 0.01);
    }

    #[test]
    fn a4_landscape_swaps_axes() {
        let portrait = PageFormat::A4.size(Orientation::Portrait);
        let landscape = PageFormat::A4.size(Orientation::Landscape);
        assert_eq!(portrait.width, landscape.height);
        assert_eq!(portrait.height, landscape.width);
        assert!(landscape.width > landscape.height);
    }

    #[test]
    fn px_conversion_uses_css_reference_pixel() {
        assert_eq!(Pt::from_px(100.0), Pt::from_f32(75.0));
    }

    #[test]
    fn ratios_and_formatting_stay_exact() {
        assert_eq!(Pt::from_f32(12.0).mul_ratio(556, 1000).to_milli_i64(), 6_672);
        assert_eq!((Pt::from_f32(10.0) / 4).to_milli_i64(), 2_500);
        assert_eq!(Pt::from_f32(-1.25).to_milli_i64(), -1_250);
        assert_eq!(Pt::from_f32(f32::NAN), Pt::ZERO);
    }
}
