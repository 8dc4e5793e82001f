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

//! Content types for served files.

use crate::util::Caseless;

/// The content type of anything not in [`CONTENT_TYPES`].
pub const OCTET_STREAM: &str = "application/octet-stream";

/// File-name suffixes and the content types they map to. This is a
/// deliberately small set covering what the bundled web application
/// uses.
pub const CONTENT_TYPES: &[(&str, &str)] = &[
    (".pdf", "application/pdf"),
    (".html", "text/html"),
    (".jpg", "image/jpeg"),
    (".ico", "image/x-icon"),
    (".css", "text/css"),
    (".js", "application/javascript"),
    (".wasm", "application/wasm"),
];

/// Returns the content type for `path`, based on its suffix (matched
/// case-insensitively).
pub fn for_path(path: &str) -> &'static str {
    let path = Caseless(path);
    CONTENT_TYPES
        .iter()
        .find(|(suffix, _)| path.ends_with(suffix))
        .map_or(OCTET_STREAM, |&(_, content_type)| content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_path_covers_the_allow_list() {
        for (suffix, content_type) in CONTENT_TYPES {
            assert_eq!(for_path(&format!("/dir/file{suffix}")), *content_type);
            assert_eq!(
                for_path(&format!("/dir/FILE{}", suffix.to_ascii_uppercase())),
                *content_type
            );
        }
    }

    #[test]
    fn for_path_defaults_to_octet_stream() {
        for path in ["/", "/data.json", "/archive.zim", "/html", "/x.jpeg", ""] {
            assert_eq!(for_path(path), OCTET_STREAM);
        }
    }
}
