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

//! Response bodies, including bodies streamed from storage.

use std::convert::Infallible;
use std::io;

use bytes::{Bytes, BytesMut};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use log::{debug, error};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// The body type of every response the file server produces.
pub type Body = BoxBody<Bytes, io::Error>;

/// The default size of streamed chunks: 32 KiB.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// How many chunks may be read ahead of the client.
const CHANNEL_DEPTH: usize = 2;

/// Returns an empty body.
pub fn empty() -> Body {
    Empty::new().map_err(never).boxed()
}

/// Returns a body holding `data`.
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).map_err(never).boxed()
}

fn never(e: Infallible) -> io::Error {
    match e {}
}

/// Returns a body streamed from `read`.
///
/// `read` is called on Tokio's blocking thread pool with a fresh buffer
/// of at most `chunk_size` octets, and whatever it reads is sent as one
/// chunk. Streaming ends when `read` returns zero or once `limit`
/// octets (if given) have been sent. Since the response length is not
/// known in advance, hyper sends such a body with chunked
/// transfer-encoding.
///
/// By the time `read` is first called the response head is on its way,
/// so errors can no longer become an error status. A read error is
/// logged and ends the body with an error, which makes hyper abort the
/// connection. If the client goes away, reading simply stops. `label`
/// names the transfer in log messages.
pub fn stream<R>(label: String, read: R, chunk_size: usize, limit: Option<u64>) -> Body
where
    R: FnMut(&mut [u8]) -> io::Result<usize> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(CHANNEL_DEPTH);
    tokio::task::spawn_blocking(move || pump(&label, read, chunk_size, limit, sender));
    StreamBody::new(ReceiverStream::new(receiver)).boxed()
}

/// The read loop behind [`stream`].
fn pump<R>(
    label: &str,
    mut read: R,
    chunk_size: usize,
    limit: Option<u64>,
    sender: mpsc::Sender<io::Result<Frame<Bytes>>>,
) where
    R: FnMut(&mut [u8]) -> io::Result<usize>,
{
    let mut remaining = limit.unwrap_or(u64::MAX);
    let mut sent = 0;
    while remaining > 0 {
        let mut chunk = BytesMut::zeroed((chunk_size as u64).min(remaining) as usize);
        let n = match read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!("Failed to read {label} after {sent} octets: {e}");
                let _ = sender.blocking_send(Err(e));
                return;
            }
        };
        chunk.truncate(n);
        if sender.blocking_send(Ok(Frame::data(chunk.freeze()))).is_err() {
            debug!("Client went away while sending {label}; stopping after {sent} octets.");
            return;
        }
        sent += n as u64;
        remaining -= n as u64;
    }
    debug!("Finished sending {label} ({sent} octets).");
}
