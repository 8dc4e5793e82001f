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

//! Constants related to DNS messages and the synthetic answer.

pub const HEADER_SIZE: usize = 12;
pub const ID_START: usize = 0;
pub const ID_END: usize = 2;
pub const FLAGS_START: usize = 2;
pub const FLAGS_END: usize = 4;
pub const QDCOUNT_START: usize = 4;
pub const QDCOUNT_END: usize = 6;
pub const ANCOUNT_START: usize = 6;
pub const ANCOUNT_END: usize = 8;
pub const NSCOUNT_START: usize = 8;
pub const NSCOUNT_END: usize = 10;
pub const ARCOUNT_START: usize = 10;
pub const ARCOUNT_END: usize = 12;

/// QR set, opcode QUERY, RD set, RA set, RCODE NOERROR.
pub const RESPONSE_FLAGS: u16 = 0x8180;

/// A compression pointer to offset 12, where the question name of a
/// single-question query begins.
pub const QNAME_POINTER: u16 = 0xc000 | HEADER_SIZE as u16;

pub const TYPE_A: u16 = 1;
pub const CLASS_IN: u16 = 1;
pub const A_RDLENGTH: u16 = 4;
pub const DEFAULT_TTL: u32 = 64;

/// The size of the synthetic answer: pointer (2), type (2), class (2),
/// TTL (4), RDLENGTH (2), and the IPv4 address (4).
pub const ANSWER_SIZE: usize = 16;
