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

//! The I/O provider for running the responders.
//!
//! The [`Responder`](crate::dns::Responder) and the
//! [`FileServer`](crate::http::FileServer) implement their protocols
//! abstracted from underlying network I/O. To actually run them, an I/O
//! provider is needed: it binds the sockets, and then acts as the
//! intermediary between the operating system's network APIs on one hand
//! and the responders on the other.

mod tokio;

pub use self::tokio::{TokioIoProvider, TokioShutdownController};
