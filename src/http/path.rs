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

//! Mapping of request URIs onto the storage root.

use std::fmt;
use std::path::Path;

/// Maps request URIs to paths under a storage root.
///
/// The resolved path is built by plain concatenation: the storage root
/// followed by the URI's path component. It must fit in a path buffer
/// of a fixed capacity (which, as with a C string, includes one octet
/// for a terminator); longer paths are rejected rather than truncated.
#[derive(Clone, Debug)]
pub struct PathResolver {
    root: String,
    index: String,
    capacity: usize,
}

/// A path produced by [`PathResolver::resolve`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedPath {
    full: String,
    root_len: usize,
}

impl ResolvedPath {
    /// The complete path on storage.
    pub fn full(&self) -> &Path {
        Path::new(&self.full)
    }

    /// The part of the path after the storage root, beginning with
    /// `/`. For the root URI this names the index document.
    pub fn relative(&self) -> &str {
        &self.full[self.root_len..]
    }
}

impl PathResolver {
    /// The default path buffer capacity, in octets.
    pub const DEFAULT_CAPACITY: usize = 128;

    /// The default index document.
    pub const DEFAULT_INDEX: &'static str = "index.html";

    /// Creates a resolver for the storage root `root`, using the
    /// default index document and capacity. Trailing slashes on `root`
    /// are ignored.
    pub fn new(root: impl Into<String>) -> Self {
        let mut root = root.into();
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        Self {
            root,
            index: Self::DEFAULT_INDEX.to_owned(),
            capacity: Self::DEFAULT_CAPACITY,
        }
    }

    /// Sets the document served for the root URI.
    pub fn set_index(&mut self, index: impl Into<String>) {
        self.index = index.into();
    }

    /// Sets the path buffer capacity.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Returns the storage root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolves `uri` (a request target in origin form) to a path on
    /// storage. Any query or fragment is dropped first.
    pub fn resolve(&self, uri: &str) -> Result<ResolvedPath, ResolveError> {
        let end = uri.find(['?', '#']).unwrap_or(uri.len());
        let path = &uri[..end];

        if self.root.len() + path.len() + 1 > self.capacity {
            return Err(ResolveError::TooLong);
        }
        if path.split('/').any(|segment| segment == "..") {
            return Err(ResolveError::Traversal);
        }

        let mut full = String::with_capacity(self.capacity);
        full.push_str(&self.root);
        if path.is_empty() || path == "/" {
            full.push('/');
            full.push_str(&self.index);
        } else {
            full.push_str(path);
        }
        Ok(ResolvedPath {
            full,
            root_len: self.root.len(),
        })
    }
}

/// Errors that arise when resolving a request URI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResolveError {
    TooLong,
    Traversal,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::TooLong => f.write_str("the path does not fit in the path buffer"),
            Self::Traversal => f.write_str("the path contains a \"..\" segment"),
        }
    }
}

impl std::error::Error for ResolveError {}
