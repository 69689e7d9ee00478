//! Shared winnow-based parsing utilities used by the chunk, geometry and node parsers.

use glam::{Vec3, Vec4};
use winnow::Parser;
use winnow::binary::{f32, i16, i32, u16, u32};
use winnow::error::{ContextError, ErrMode};

use crate::data::Endian;
use crate::error::DecodeError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, ErrMode<ContextError>>;

pub fn parse_u16(input: &mut &[u8], endian: Endian) -> WResult<u16> {
    u16(endian.into()).parse_next(input)
}

pub fn parse_i16(input: &mut &[u8], endian: Endian) -> WResult<i16> {
    i16(endian.into()).parse_next(input)
}

pub fn parse_u32(input: &mut &[u8], endian: Endian) -> WResult<u32> {
    u32(endian.into()).parse_next(input)
}

pub fn parse_i32(input: &mut &[u8], endian: Endian) -> WResult<i32> {
    i32(endian.into()).parse_next(input)
}

pub fn parse_f32(input: &mut &[u8], endian: Endian) -> WResult<f32> {
    f32(endian.into()).parse_next(input)
}

pub fn parse_vec3(input: &mut &[u8], endian: Endian) -> WResult<Vec3> {
    let x = parse_f32(input, endian)?;
    let y = parse_f32(input, endian)?;
    let z = parse_f32(input, endian)?;
    Ok(Vec3::new(x, y, z))
}

pub fn parse_vec4(input: &mut &[u8], endian: Endian) -> WResult<Vec4> {
    let x = parse_f32(input, endian)?;
    let y = parse_f32(input, endian)?;
    let z = parse_f32(input, endian)?;
    let w = parse_f32(input, endian)?;
    Ok(Vec4::new(x, y, z, w))
}

/// A 32-bit value stored as two 16-bit words, low word first.
///
/// Colours inside polygon chunks use this layout so the list stays 16-bit
/// aligned.
pub fn parse_split_u32(input: &mut &[u8], endian: Endian) -> WResult<u32> {
    let low = parse_u16(input, endian)? as u32;
    let high = parse_u16(input, endian)? as u32;
    Ok((high << 16) | low)
}

/// Byte offset of `input` inside `file_data`, assuming `input` is a suffix of it.
pub fn offset_in(file_data: &[u8], input: &[u8]) -> usize {
    file_data.len() - input.len()
}

/// Borrow `file_data[offset..]`, failing instead of panicking when `offset` is
/// past the end.
pub fn slice_from<'a>(
    file_data: &'a [u8],
    offset: usize,
    what: &'static str,
) -> Result<&'a [u8], DecodeError> {
    file_data
        .get(offset..)
        .ok_or(DecodeError::Truncated { offset, what })
}

/// Turn a winnow failure into a [`DecodeError::Truncated`] at the offset the
/// input had reached. Every parser here is a fixed-width binary read, so running
/// out of bytes is the only way they fail.
pub fn truncated(
    file_data: &[u8],
    input: &[u8],
    what: &'static str,
) -> impl FnOnce(ErrMode<ContextError>) -> DecodeError {
    let offset = offset_in(file_data, input);
    move |_| DecodeError::Truncated { offset, what }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_u32_is_low_word_first() {
        let data = [0x34, 0x12, 0x78, 0x56];
        let input = &mut &data[..];
        assert_eq!(parse_split_u32(input, Endian::Little).unwrap(), 0x5678_1234);

        let data = [0x12, 0x34, 0x56, 0x78];
        let input = &mut &data[..];
        assert_eq!(parse_split_u32(input, Endian::Big).unwrap(), 0x5678_1234);
    }

    #[test]
    fn slice_from_rejects_out_of_range() {
        let data = [0u8; 4];
        assert!(slice_from(&data, 4, "test").unwrap().is_empty());
        assert!(matches!(
            slice_from(&data, 5, "test"),
            Err(DecodeError::Truncated { offset: 5, .. })
        ));
    }
}
