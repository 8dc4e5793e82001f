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

//! The captive-portal DNS responder.
//!
//! The [`Responder`] turns any DNS query into an answer pointing at a
//! single fixed IPv4 address. It is abstracted from network I/O; see
//! [`crate::io`] for the provider that feeds it datagrams.

use std::fmt;
use std::net::Ipv4Addr;

pub mod answer;
pub mod constants;
pub mod header;

pub use answer::Answer;
pub use header::Header;

use constants::*;

/// The size of the buffer the I/O provider receives datagrams into,
/// including [`ANSWER_SIZE`] octets of slack at the end.
pub const RECEIVE_BUFFER_SIZE: usize = 1024;

////////////////////////////////////////////////////////////////////////
// RESPONDER                                                          //
////////////////////////////////////////////////////////////////////////

/// A stateless DNS responder that answers every query with the same A
/// record.
///
/// The responder never parses the question. It assumes that the query
/// has exactly one question whose name starts at offset 12, and points
/// the appended answer's owner there with a compression pointer. This
/// holds for the single-question queries that stub resolvers send;
/// queries with several questions get an answer that refers to the
/// first one only.
#[derive(Clone, Debug)]
pub struct Responder {
    target: Ipv4Addr,
    ttl: u32,
}

impl Responder {
    /// Creates a `Responder` that answers with `target`. The TTL of
    /// answers defaults to 64 seconds.
    pub fn new(target: Ipv4Addr) -> Self {
        Self {
            target,
            ttl: DEFAULT_TTL,
        }
    }

    /// Returns the address that every answer points to.
    pub fn target(&self) -> Ipv4Addr {
        self.target
    }

    /// Returns the TTL of answers.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Sets the TTL of answers.
    pub fn set_ttl(&mut self, ttl: u32) {
        self.ttl = ttl;
    }

    /// Rewrites a received query into a response, in place.
    ///
    /// The first `received_len` octets of `buf` hold the datagram; the
    /// rest of `buf` is slack into which the answer is appended, so it
    /// must be at least [`ANSWER_SIZE`] octets long. On success, the
    /// length of the response (the first octets of `buf`) is returned.
    /// On failure, `buf` is left untouched and no response should be
    /// sent.
    ///
    /// The transaction ID and the QDCOUNT, NSCOUNT, and ARCOUNT fields
    /// are preserved, as is everything after the header.
    pub fn respond_in_place(&self, buf: &mut [u8], received_len: usize) -> Result<usize, Rejection> {
        let received = buf.get(..received_len).ok_or(Rejection::NoRoom)?;
        let mut header = Header::read(received).ok_or(Rejection::TooShort(received_len))?;
        if header.qdcount == 0 {
            return Err(Rejection::NoQuestion);
        }

        let answer = Answer::for_question(self.target, self.ttl);
        let answer_len = answer
            .write(&mut buf[received_len..])
            .ok_or(Rejection::NoRoom)?;

        header.flags = RESPONSE_FLAGS;
        header.ancount = 1;
        header.write(buf).ok_or(Rejection::NoRoom)?;
        Ok(received_len + answer_len)
    }
}

/// The reasons a received datagram gets no response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Rejection {
    TooShort(usize),
    NoQuestion,
    NoRoom,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::TooShort(len) => write!(f, "DNS packet too short: {len} octets"),
            Self::NoQuestion => f.write_str("DNS query has no question"),
            Self::NoRoom => f.write_str("no room to append the answer"),
        }
    }
}

impl std::error::Error for Rejection {}
