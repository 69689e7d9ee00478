use std::fmt;

/// A value that was either successfully recognized as a known variant `T`,
/// or is an unrecognized raw value `Raw`.
///
/// Chunk type bytes decode into this: a byte outside the type table is not an
/// error on its own, only in a list that requires a closed set of types. The
/// raw value is preserved so callers can report it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Recognized<T, Raw = u8> {
    Known(T),
    Unknown(Raw),
}

impl<T: Copy, Raw: Copy> Copy for Recognized<T, Raw> {}

impl<T, Raw> Recognized<T, Raw> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Recognized::Known(t) => Some(t),
            Recognized::Unknown(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Recognized::Known(_))
    }
}

impl<T: fmt::Display, Raw: fmt::Display> fmt::Display for Recognized<T, Raw> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recognized::Known(t) => t.fmt(f),
            Recognized::Unknown(raw) => write!(f, "unknown chunk type {raw}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_values_keep_their_raw_byte() {
        let known: Recognized<&str, u8> = Recognized::Known("strip");
        assert!(known.is_known());
        assert_eq!(known.known(), Some(&"strip"));
        assert_eq!(known.to_string(), "strip");

        let unknown: Recognized<&str, u8> = Recognized::Unknown(0x33);
        assert!(!unknown.is_known());
        assert_eq!(unknown.known(), None);
        assert_eq!(unknown.to_string(), "unknown chunk type 51");
    }
}
