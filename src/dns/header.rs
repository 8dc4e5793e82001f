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

//! Reading and writing of the fixed 12-octet DNS message header.

use std::convert::TryInto;

use super::constants::*;

/// A decoded DNS message header.
///
/// All six fields are 16-bit big-endian integers on the wire. A
/// `Header` is read with [`Header::read`] and written back with
/// [`Header::write`]; neither ever aliases the buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl Header {
    /// Reads a header from the start of `octets`. Returns [`None`] if
    /// fewer than [`HEADER_SIZE`] octets are available.
    pub fn read(octets: &[u8]) -> Option<Self> {
        if octets.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            id: read_u16(octets, ID_START..ID_END),
            flags: read_u16(octets, FLAGS_START..FLAGS_END),
            qdcount: read_u16(octets, QDCOUNT_START..QDCOUNT_END),
            ancount: read_u16(octets, ANCOUNT_START..ANCOUNT_END),
            nscount: read_u16(octets, NSCOUNT_START..NSCOUNT_END),
            arcount: read_u16(octets, ARCOUNT_START..ARCOUNT_END),
        })
    }

    /// Writes the header to the start of `octets`. Returns [`None`]
    /// (writing nothing) if fewer than [`HEADER_SIZE`] octets are
    /// available.
    pub fn write(&self, octets: &mut [u8]) -> Option<()> {
        if octets.len() < HEADER_SIZE {
            return None;
        }
        octets[ID_START..ID_END].copy_from_slice(&self.id.to_be_bytes());
        octets[FLAGS_START..FLAGS_END].copy_from_slice(&self.flags.to_be_bytes());
        octets[QDCOUNT_START..QDCOUNT_END].copy_from_slice(&self.qdcount.to_be_bytes());
        octets[ANCOUNT_START..ANCOUNT_END].copy_from_slice(&self.ancount.to_be_bytes());
        octets[NSCOUNT_START..NSCOUNT_END].copy_from_slice(&self.nscount.to_be_bytes());
        octets[ARCOUNT_START..ARCOUNT_END].copy_from_slice(&self.arcount.to_be_bytes());
        Some(())
    }
}

/// Reads a big-endian `u16` from a two-octet range already checked to
/// lie within the header.
fn read_u16(octets: &[u8], range: std::ops::Range<usize>) -> u16 {
    u16::from_be_bytes([octets[range.start], octets[range.end - 1]])
}
