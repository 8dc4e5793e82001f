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

//! Zimbox is the network core of an offline content appliance.
//!
//! It pairs two responders that together make a self-contained
//! "walled garden":
//!
//! * a captive-portal [DNS responder](dns) that answers every query
//!   with the appliance's own address; and
//! * an [HTTP file server](http) that serves static files from a
//!   storage root and arbitrary byte ranges of one large
//!   [archive](archive), located through a precomputed
//!   [link map](archive::LinkMap) rather than by walking the
//!   filesystem's cluster chain.
//!
//! Both are independent of network I/O; the [`io`] module provides a
//! Tokio-based provider that runs them.

pub mod archive;
pub mod dns;
pub mod http;
pub mod io;
pub mod storage;
mod util;
