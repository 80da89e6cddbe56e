use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::hash::hash_all;
use crate::view::View;

/// An immutable string of code points.
///
/// Owned text is kept in its narrowest unit width: one byte if every code point is
/// below 256, two bytes below 65536, four bytes otherwise. Text decoded from a mold
/// reads code points from the region on demand.
#[derive(Clone)]
pub struct Text {
    repr: Repr,
    hash: u32,
}

#[derive(Clone)]
enum Repr {
    Latin1(Arc<[u8]>),
    Ucs2(Arc<[u16]>),
    Wide(Arc<[u32]>),
    Mapped { view: View, width: u8 },
}

impl Text {
    pub fn new(value: &str) -> Self {
        Self::from_code_points(value.chars().map(u32::from).collect())
    }

    pub fn empty() -> Self {
        Self::from_code_points(Vec::new())
    }

    /// Creates text from raw code points, which need not be valid scalar values.
    pub fn from_code_points(points: Vec<u32>) -> Self {
        let hash = hash_all(points.iter().copied());
        let repr = match width_for(&points) {
            1 => Repr::Latin1(points.iter().map(|p| *p as u8).collect()),
            2 => Repr::Ucs2(points.iter().map(|p| *p as u16).collect()),
            _ => Repr::Wide(points.into()),
        };
        Text { repr, hash }
    }

    pub(crate) fn mapped(view: View, width: u8) -> Self {
        let hash = view.hash;
        Text {
            repr: Repr::Mapped { view, width },
            hash,
        }
    }

    pub(crate) fn view(&self) -> Option<&View> {
        match &self.repr {
            Repr::Mapped { view, .. } => Some(view),
            _ => None,
        }
    }

    /// Number of code points.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Latin1(units) => units.len(),
            Repr::Ucs2(units) => units.len(),
            Repr::Wide(units) => units.len(),
            Repr::Mapped { view, .. } => view.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hash_code(&self) -> u32 {
        self.hash
    }

    /// Bytes per code point: 1, 2 or 4.
    pub fn width(&self) -> u8 {
        match &self.repr {
            Repr::Latin1(_) => 1,
            Repr::Ucs2(_) => 2,
            Repr::Wide(_) => 4,
            Repr::Mapped { width, .. } => *width,
        }
    }

    /// Code point at `index`.
    pub fn code_point(&self, index: usize) -> Result<u32> {
        let length = self.len();
        if index >= length {
            return Err(Error::IndexOutOfBounds { index, length });
        }
        Ok(match &self.repr {
            Repr::Latin1(units) => units[index] as u32,
            Repr::Ucs2(units) => units[index] as u32,
            Repr::Wide(units) => units[index],
            Repr::Mapped { view, width } => {
                let addr = view.data + index as u64 * *width as u64;
                let region = view.region();
                match width {
                    1 => region.read_u8(addr)? as u32,
                    2 => region.read_u16(addr)? as u32,
                    _ => region.read_u32(addr)?,
                }
            }
        })
    }

    /// Character at `index`, or U+FFFD if the code point is not a scalar value.
    pub fn get(&self, index: usize) -> Result<char> {
        Ok(char::from_u32(self.code_point(index)?).unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    /// All code points, reading a mapped payload in one pass.
    pub fn code_points(&self) -> Result<Vec<u32>> {
        Ok(match &self.repr {
            Repr::Latin1(units) => units.iter().map(|u| *u as u32).collect(),
            Repr::Ucs2(units) => units.iter().map(|u| *u as u32).collect(),
            Repr::Wide(units) => units.to_vec(),
            Repr::Mapped { view, width } => {
                let width = *width as usize;
                let mut raw = vec![0u8; view.len * width];
                view.region().read_bytes(view.data, &mut raw)?;
                raw.chunks_exact(width).map(decode_unit).collect()
            }
        })
    }

    /// Materializes the text, replacing invalid code points with U+FFFD.
    pub fn to_owned_string(&self) -> Result<String> {
        Ok(self
            .code_points()?
            .into_iter()
            .map(|p| char::from_u32(p).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())
    }

    pub(crate) fn equals(&self, other: &Text) -> Result<bool> {
        if self.len() != other.len() || self.hash != other.hash {
            return Ok(false);
        }
        if let (Some(a), Some(b)) = (self.view(), other.view())
            && a.same_record(b)
        {
            return Ok(true);
        }
        Ok(self.code_points()? == other.code_points()?)
    }
}

/// Narrowest unit width in bytes that holds every code point.
pub(crate) fn width_for(points: &[u32]) -> u8 {
    match points.iter().max() {
        Some(max) if *max > 0xFFFF => 4,
        Some(max) if *max > 0xFF => 2,
        _ => 1,
    }
}

fn decode_unit(unit: &[u8]) -> u32 {
    match unit.len() {
        1 => unit[0] as u32,
        2 => LittleEndian::read_u16(unit) as u32,
        _ => LittleEndian::read_u32(unit),
    }
}

impl From<&str> for Text {
    fn from(value: &str) -> Text {
        Text::new(value)
    }
}

impl PartialEq for Text {
    fn eq(&self, other: &Text) -> bool {
        self.equals(other).unwrap_or(false)
    }
}

impl fmt::Debug for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_owned_string() {
            Ok(s) => fmt::Debug::fmt(&s, f),
            Err(_) => write!(f, "Text({:?})", self.view()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowest_width() {
        assert_eq!(Text::new("ab").width(), 1);
        assert_eq!(Text::new("é").width(), 1);
        assert_eq!(Text::new("ab€").width(), 2);
        assert_eq!(Text::new("a😀").width(), 4);
        assert_eq!(Text::empty().width(), 1);
    }

    #[test]
    fn indexed_access() {
        let text = Text::new("h€😀");
        assert_eq!(text.len(), 3);
        assert_eq!(text.get(0).unwrap(), 'h');
        assert_eq!(text.get(1).unwrap(), '€');
        assert_eq!(text.get(2).unwrap(), '😀');
        assert!(matches!(
            text.get(3),
            Err(Error::IndexOutOfBounds { index: 3, length: 3 })
        ));
    }

    #[test]
    fn invalid_code_points_are_replaced() {
        let text = Text::from_code_points(vec![0x41, 0xD800]);
        assert_eq!(text.code_point(1).unwrap(), 0xD800);
        assert_eq!(text.get(1).unwrap(), char::REPLACEMENT_CHARACTER);
        assert_eq!(text.to_owned_string().unwrap(), "A\u{FFFD}");
    }

    #[test]
    fn hash_ignores_width() {
        let narrow = Text::from_code_points(vec![0x61, 0x62]);
        assert_eq!(narrow.hash_code(), Text::new("ab").hash_code());
        assert_eq!(narrow, Text::new("ab"));
        assert_ne!(Text::new("ab"), Text::new("ba"));
    }
}
