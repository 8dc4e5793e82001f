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

//! Serialization of the synthetic A record appended to every response.

use std::net::Ipv4Addr;

use super::constants::*;

/// An A record whose owner is given by a compression pointer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Answer {
    pub name_pointer: u16,
    pub ttl: u32,
    pub address: Ipv4Addr,
}

impl Answer {
    /// Creates an answer for `address` that refers back to the question
    /// name at offset 12.
    pub fn for_question(address: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name_pointer: QNAME_POINTER,
            ttl,
            address,
        }
    }

    /// Writes the record to the start of `octets`, returning the number
    /// of octets written ([`ANSWER_SIZE`]), or [`None`] if `octets` is
    /// too small. Nothing is written on failure.
    pub fn write(&self, octets: &mut [u8]) -> Option<usize> {
        let octets = octets.get_mut(..ANSWER_SIZE)?;
        octets[0..2].copy_from_slice(&self.name_pointer.to_be_bytes());
        octets[2..4].copy_from_slice(&TYPE_A.to_be_bytes());
        octets[4..6].copy_from_slice(&CLASS_IN.to_be_bytes());
        octets[6..10].copy_from_slice(&self.ttl.to_be_bytes());
        octets[10..12].copy_from_slice(&A_RDLENGTH.to_be_bytes());
        octets[12..16].copy_from_slice(&self.address.octets());
        Some(ANSWER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_produces_expected_wire_format() {
        let answer = Answer::for_question(Ipv4Addr::new(192, 168, 4, 1), DEFAULT_TTL);
        let mut buf = [0xff; ANSWER_SIZE + 1];
        assert_eq!(answer.write(&mut buf), Some(ANSWER_SIZE));
        assert_eq!(
            &buf[..ANSWER_SIZE],
            b"\xc0\x0c\x00\x01\x00\x01\x00\x00\x00\x40\x00\x04\xc0\xa8\x04\x01"
        );
        assert_eq!(buf[ANSWER_SIZE], 0xff);
    }

    #[test]
    fn write_refuses_short_buffers() {
        let answer = Answer::for_question(Ipv4Addr::LOCALHOST, 0);
        let mut buf = [0; ANSWER_SIZE - 1];
        assert_eq!(answer.write(&mut buf), None);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
