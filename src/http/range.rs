// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Parsing of archive read requests (`/zim?<offset>,<length>`).

use std::fmt;

use crate::archive::MAX_READ_LENGTH;

/// The URI prefix that selects the archive reader.
pub const ARCHIVE_PREFIX: &str = "/zim?";

/// A request to read `length` octets of the archive from `offset`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArchiveRequest {
    pub offset: u64,
    pub length: u64,
}

impl ArchiveRequest {
    /// Parses the request from a URI of the form
    /// `…?<offset>,<length>`.
    ///
    /// The offset and the length are read the same way, as C's `atoi`
    /// would: leading whitespace and an optional `+` or `-` sign are
    /// skipped, then the leading decimal digits are taken. Trailing
    /// characters are ignored and an absent number reads as zero. A
    /// negative offset or length is reported as invalid rather than
    /// misread. Lengths above [`MAX_READ_LENGTH`] are rejected.
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let (_, query) = uri.split_once('?').ok_or(Error::MissingParameter)?;
        let (offset, length) = query.split_once(',').ok_or(Error::MissingParameter)?;

        let offset = match parse_integer_prefix(offset) {
            Some(Integer::NonNegative(offset)) => offset,
            _ => return Err(Error::InvalidParameter),
        };
        let length = match parse_integer_prefix(length) {
            Some(Integer::NonNegative(length)) => length,
            Some(Integer::Negative) => return Err(Error::InvalidParameter),
            None => return Err(Error::TooLarge),
        };
        if length > MAX_READ_LENGTH {
            return Err(Error::TooLarge);
        }
        Ok(Self { offset, length })
    }
}

enum Integer {
    NonNegative(u64),
    Negative,
}

/// Reads an optionally signed decimal integer from the start of `s`,
/// after any leading whitespace. Returns [`None`] if the magnitude does
/// not fit in a `u64`.
fn parse_integer_prefix(s: &str) -> Option<Integer> {
    let s = s.trim_start_matches(|c: char| c.is_ascii_whitespace());
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut value: u64 = 0;
    for digit in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.checked_mul(10)?.checked_add((digit - b'0') as u64)?;
    }
    if negative && value != 0 {
        Some(Integer::Negative)
    } else {
        Some(Integer::NonNegative(value))
    }
}

/// Errors that arise when parsing an [`ArchiveRequest`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    MissingParameter,
    InvalidParameter,
    TooLarge,
}

impl Error {
    /// A short message suitable for a response body.
    pub fn message(&self) -> &'static str {
        match *self {
            Self::MissingParameter => "No param",
            Self::InvalidParameter => "Invalid param",
            Self::TooLarge => "Too large",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::MissingParameter => f.write_str("missing offset or length delimiter"),
            Self::InvalidParameter => f.write_str("invalid offset or length"),
            Self::TooLarge => write!(f, "length exceeds {MAX_READ_LENGTH} octets"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(uri: &str) -> Result<(u64, u64), Error> {
        ArchiveRequest::parse(uri).map(|r| (r.offset, r.length))
    }

    #[test]
    fn parse_works() {
        assert_eq!(parse("/zim?0,4"), Ok((0, 4)));
        assert_eq!(parse("/zim?123456789012,65536"), Ok((123456789012, 65536)));
        assert_eq!(parse("/zim?18446744073709551615,1"), Ok((u64::MAX, 1)));
    }

    #[test]
    fn parse_follows_atoi_conventions() {
        assert_eq!(parse("/zim?,"), Ok((0, 0)));
        assert_eq!(parse("/zim?12abc,34xyz"), Ok((12, 34)));
        assert_eq!(parse("/zim?5, 6"), Ok((5, 6)));
        assert_eq!(parse("/zim?5,+6"), Ok((5, 6)));
        assert_eq!(parse("/zim?5,-0"), Ok((5, 0)));
        assert_eq!(parse("/zim? 7,1"), Ok((7, 1)));
        assert_eq!(parse("/zim?+7,1"), Ok((7, 1)));
    }

    #[test]
    fn parse_requires_both_delimiters() {
        assert_eq!(parse("/zim"), Err(Error::MissingParameter));
        assert_eq!(parse("/zim?100"), Err(Error::MissingParameter));
        assert_eq!(parse("/zim,5"), Err(Error::MissingParameter));
    }

    #[test]
    fn parse_rejects_negative_values() {
        assert_eq!(parse("/zim?10,-1"), Err(Error::InvalidParameter));
        assert_eq!(parse("/zim?-10,1"), Err(Error::InvalidParameter));
        assert_eq!(parse("/zim?18446744073709551616,1"), Err(Error::InvalidParameter));
    }

    #[test]
    fn parse_enforces_the_length_cap() {
        let max = MAX_READ_LENGTH;
        assert_eq!(parse(&format!("/zim?0,{max}")), Ok((0, max)));
        assert_eq!(parse(&format!("/zim?0,{}", max + 1)), Err(Error::TooLarge));
        assert_eq!(parse("/zim?0,99999999999999999999999"), Err(Error::TooLarge));
    }
}
