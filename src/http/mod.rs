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

//! The HTTP file server.
//!
//! The [`FileServer`] structure implements request handling abstracted
//! from connection management: it maps a [`Request`] to a [`Response`]
//! whose body may stream from storage. Accepting connections and
//! driving hyper is the job of the [I/O provider](crate::io).
//!
//! Every `GET` request resolves to exactly one [`Route`], in priority
//! order:
//!
//! 1. a redirect, if the `Host` header names something other than the
//!    canonical host;
//! 2. a read from the archive, for URIs beginning with
//!    [`/zim?`](range::ARCHIVE_PREFIX);
//! 3. an empty placeholder for `/favicon.ico`;
//! 4. a static file under the storage root.

pub mod body;
pub mod content_type;
pub mod path;
pub mod range;

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE, HOST, LOCATION};
use hyper::{Method, Request, Response, StatusCode};
use log::{debug, error, info, warn};

use crate::archive::{ArchiveSlot, Status};
use crate::storage::Volume;
use crate::util::Caseless;
pub use body::{Body, DEFAULT_CHUNK_SIZE};
pub use path::{PathResolver, ResolveError, ResolvedPath};
pub use range::ArchiveRequest;

/// The relative path served as an empty icon.
const FAVICON_PATH: &str = "/favicon.ico";

/// The outcome of routing a request. See the [module-level
/// documentation](self).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Route {
    MethodNotAllowed,
    Redirect,
    Archive(Result<ArchiveRequest, range::Error>),
    Favicon,
    File(ResolvedPath),
    BadPath(ResolveError),
}

/// An HTTP server for static files and archive reads.
pub struct FileServer<V> {
    paths: PathResolver,
    canonical_host: String,
    location: HeaderValue,
    archive: Arc<ArchiveSlot<V>>,
    chunk_size: usize,
}

impl<V> FileServer<V> {
    /// Creates a new `FileServer`. Requests naming a host other than
    /// `canonical_host` are redirected to `http://<canonical_host>/`;
    /// this fails if that is not a valid header value.
    pub fn new(
        paths: PathResolver,
        canonical_host: impl Into<String>,
        archive: Arc<ArchiveSlot<V>>,
    ) -> Result<Self, InvalidHostError> {
        let canonical_host = canonical_host.into();
        let location = HeaderValue::try_from(format!("http://{canonical_host}/"))
            .map_err(|_| InvalidHostError(canonical_host.clone()))?;
        Ok(Self {
            paths,
            canonical_host,
            location,
            archive,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Sets the size of the chunks in which bodies are streamed.
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.chunk_size = chunk_size.max(1);
    }

    /// Returns the canonical host.
    pub fn canonical_host(&self) -> &str {
        &self.canonical_host
    }

    /// Returns the archive slot the server reads from.
    pub fn archive(&self) -> &Arc<ArchiveSlot<V>> {
        &self.archive
    }

    /// Routes a request, given its method, its target in origin form,
    /// and its `Host` header (if any). This does no I/O.
    pub fn route(&self, method: &Method, target: &str, host: Option<&str>) -> Route {
        if *method != Method::GET {
            return Route::MethodNotAllowed;
        }
        if let Some(host) = host {
            if Caseless(host) != Caseless(&self.canonical_host) {
                return Route::Redirect;
            }
        }
        if target.starts_with(range::ARCHIVE_PREFIX) {
            return Route::Archive(ArchiveRequest::parse(target));
        }
        match self.paths.resolve(target) {
            Ok(path) if path.relative() == FAVICON_PATH => Route::Favicon,
            Ok(path) => Route::File(path),
            Err(e) => Route::BadPath(e),
        }
    }
}

impl<V: Volume + 'static> FileServer<V> {
    /// Handles a request.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Body> {
        let target = request
            .uri()
            .path_and_query()
            .map_or("/", |path_and_query| path_and_query.as_str())
            .to_owned();
        let host = request
            .headers()
            .get(HOST)
            .map(|value| value.to_str().unwrap_or_default().to_owned());

        match self.route(request.method(), &target, host.as_deref()) {
            Route::MethodNotAllowed => {
                let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed");
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("GET"));
                response
            }
            Route::Redirect => {
                info!("Redirect: {}", host.unwrap_or_default());
                let mut response = Response::new(body::empty());
                *response.status_mut() = StatusCode::MOVED_PERMANENTLY;
                response
                    .headers_mut()
                    .insert(LOCATION, self.location.clone());
                response
            }
            Route::Archive(parsed) => self.serve_archive(parsed),
            Route::Favicon => with_content_type(
                Response::new(body::empty()),
                content_type::for_path(FAVICON_PATH),
            ),
            Route::File(path) => self.serve_file(path).await,
            Route::BadPath(ResolveError::TooLong) => {
                error!("Filename is too long: {target}");
                text(StatusCode::INTERNAL_SERVER_ERROR, "Filename too long")
            }
            Route::BadPath(ResolveError::Traversal) => {
                warn!("Rejected path traversal: {target}");
                text(StatusCode::BAD_REQUEST, "Invalid path")
            }
        }
    }

    /// Streams part of the archive.
    fn serve_archive(&self, parsed: Result<ArchiveRequest, range::Error>) -> Response<Body> {
        match self.archive.status() {
            Status::Ready => (),
            Status::NotReady => {
                return text(StatusCode::INTERNAL_SERVER_ERROR, "Archive not ready");
            }
            Status::Failed => {
                error!(
                    "Archive unavailable: {}",
                    self.archive.failure().unwrap_or_default()
                );
                return text(StatusCode::INTERNAL_SERVER_ERROR, "Archive not ready");
            }
        }
        let ArchiveRequest { offset, length } = match parsed {
            Ok(request) => request,
            Err(e) => {
                warn!("Bad archive request: {e}");
                return text(StatusCode::INTERNAL_SERVER_ERROR, e.message());
            }
        };

        debug!("Reading {length} octets of the archive from offset {offset}.");
        let archive = self.archive.clone();
        let mut position = offset;
        let body = body::stream(
            format!("archive range {offset}+{length}"),
            move |buf| {
                let n = archive.read_at(position, buf)?;
                position += n as u64;
                Ok(n)
            },
            self.chunk_size,
            Some(length),
        );
        with_content_type(Response::new(body), content_type::OCTET_STREAM)
    }

    /// Streams a static file.
    async fn serve_file(&self, path: ResolvedPath) -> Response<Body> {
        let file = match tokio::fs::File::open(path.full()).await {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to open {}: {e}", path.full().display());
                return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to open file");
            }
        };
        match file.metadata().await {
            Ok(metadata) if !metadata.is_dir() => (),
            Ok(_) => {
                error!("Refusing to send directory {}", path.full().display());
                return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to open file");
            }
            Err(e) => {
                error!("Failed to stat {}: {e}", path.full().display());
                return text(StatusCode::INTERNAL_SERVER_ERROR, "Failed to open file");
            }
        }

        info!("Sending file: {}", path.relative());
        let mut file = file.into_std().await;
        let body = body::stream(
            path.relative().to_owned(),
            move |buf| file.read(buf),
            self.chunk_size,
            None,
        );
        with_content_type(Response::new(body), content_type::for_path(path.relative()))
    }
}

/// Builds a `text/plain` response.
fn text(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = with_content_type(Response::new(body::full(message)), "text/plain");
    *response.status_mut() = status;
    response
}

fn with_content_type(mut response: Response<Body>, content_type: &'static str) -> Response<Body> {
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// An error returned when the canonical host cannot be used in a
/// `Location` header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InvalidHostError(String);

impl fmt::Display for InvalidHostError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} is not a valid canonical host", self.0)
    }
}

impl std::error::Error for InvalidHostError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
