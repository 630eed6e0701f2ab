//! Shared winnow-based parsing utilities used by the chunk, header, section and submesh parsers.

use rootcause::Report;
use winnow::Parser;
use winnow::binary::{le_f32, le_u8};
use winnow::error::ContextError;
use winnow::token::take_till;

use crate::error::FormatError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, winnow::error::ErrMode<ContextError>>;

/// Build a mapper from a winnow error to a [`FormatError::Parse`] report at `offset`.
pub fn parse_failure(
    offset: usize,
) -> impl FnOnce(winnow::error::ErrMode<ContextError>) -> Report<FormatError> {
    move |e| {
        Report::new(FormatError::Parse {
            offset,
            detail: format!("{e}"),
        })
    }
}

/// Parse three consecutive little-endian `f32`s.
pub fn parse_vec3(input: &mut &[u8]) -> WResult<glam::Vec3> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    let z = le_f32.parse_next(input)?;
    Ok(glam::Vec3::new(x, y, z))
}

/// Parse two consecutive little-endian `f32`s.
pub fn parse_vec2(input: &mut &[u8]) -> WResult<glam::Vec2> {
    let x = le_f32.parse_next(input)?;
    let y = le_f32.parse_next(input)?;
    Ok(glam::Vec2::new(x, y))
}

/// Parse a NUL-terminated string, consuming the terminator.
///
/// Fails if the input runs out before a NUL byte is found.
pub fn parse_c_string(input: &mut &[u8]) -> WResult<String> {
    let bytes = take_till(0.., |b: u8| b == 0).parse_next(input)?;
    let _nul = le_u8.parse_next(input)?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Read a fixed-size array of raw bytes.
pub fn parse_array<const N: usize>(input: &mut &[u8]) -> WResult<[u8; N]> {
    let bytes = winnow::token::take(N).parse_next(input)?;
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}
