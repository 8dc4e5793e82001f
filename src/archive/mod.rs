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

//! Random-offset reads from one large archive file.
//!
//! An [`Archive`] pairs an open [`Volume`] with a [`LinkMap`] built
//! when it is opened, so that seeking to any offset costs the same no
//! matter how far into a fragmented file it lies. The process holds a
//! single archive for its whole lifetime in an [`ArchiveSlot`], which
//! records whether it is ready and serializes reads from it.

use std::fmt;
use std::io;
use std::sync::{Mutex, OnceLock, PoisonError};

mod link_map;

pub use link_map::{LinkMap, LinkMapError, LINK_MAP_CAPACITY};

use crate::storage::Volume;

/// The largest read that a single archive request may ask for: 10 MiB.
pub const MAX_READ_LENGTH: u64 = 10 * 1024 * 1024;

////////////////////////////////////////////////////////////////////////
// ARCHIVE                                                            //
////////////////////////////////////////////////////////////////////////

/// An open archive file with its cluster index.
pub struct Archive<V> {
    volume: V,
    link_map: LinkMap,
    position: u64,
}

impl<V: Volume> Archive<V> {
    /// Opens an archive on `volume`, building its [`LinkMap`]. This
    /// walks the whole cluster chain once.
    pub fn open(mut volume: V) -> Result<Self, LinkMapError> {
        let link_map = LinkMap::build(&mut volume)?;
        Ok(Self {
            volume,
            link_map,
            position: 0,
        })
    }

    /// Returns the length of the archive, in octets.
    pub fn len(&self) -> u64 {
        self.volume.len()
    }

    /// Returns whether the archive is empty.
    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
    }

    /// Returns the archive's link map.
    pub fn link_map(&self) -> &LinkMap {
        &self.link_map
    }

    /// Returns the current read position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Moves the read position to `offset`. Offsets past the end are
    /// allowed; reads from them return zero octets.
    pub fn seek(&mut self, offset: u64) {
        self.position = offset;
    }

    /// Reads from the current position, filling as much of `buf` as the
    /// file allows, and advances the position. Returns zero at or past
    /// the end of the file.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cluster_size = self.link_map.cluster_size();
        let len = self.volume.len();
        let mut filled = 0;
        while filled < buf.len() && self.position < len {
            let (cluster, within) = match self.link_map.locate(self.position) {
                Some(location) => location,
                None => break,
            };
            let wanted = ((buf.len() - filled) as u64)
                .min(cluster_size - within)
                .min(len - self.position) as usize;
            let n = self
                .volume
                .read_cluster(cluster, within, &mut buf[filled..filled + wanted])?;
            if n == 0 {
                break;
            }
            filled += n;
            self.position += n as u64;
        }
        Ok(filled)
    }

    /// Seeks to `offset` and reads, as one operation.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(offset);
        self.read(buf)
    }
}

////////////////////////////////////////////////////////////////////////
// ARCHIVE SLOT                                                       //
////////////////////////////////////////////////////////////////////////

/// The process-wide home of the archive.
///
/// A slot starts out not ready. Initialization code then either
/// [installs](ArchiveSlot::install) an opened [`Archive`] or records
/// that opening it [failed](ArchiveSlot::fail); this happens exactly
/// once. Readers check [`ArchiveSlot::status`] before dispatching and
/// then read through [`ArchiveSlot::read_at`].
///
/// Reads are serialized by a mutex: each seek-and-read pair runs while
/// holding it, so two readers can never interleave their seeks. The
/// lock is held only for a single read, never while the data is sent
/// to a client.
pub struct ArchiveSlot<V> {
    state: OnceLock<State<V>>,
}

enum State<V> {
    Ready(Mutex<Archive<V>>),
    Failed(String),
}

/// The readiness of an [`ArchiveSlot`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    NotReady,
    Ready,
    Failed,
}

impl<V> ArchiveSlot<V> {
    /// Creates an empty (not ready) slot.
    pub fn new() -> Self {
        Self {
            state: OnceLock::new(),
        }
    }

    /// Returns the readiness of the slot.
    pub fn status(&self) -> Status {
        match self.state.get() {
            None => Status::NotReady,
            Some(State::Ready(_)) => Status::Ready,
            Some(State::Failed(_)) => Status::Failed,
        }
    }

    /// Returns why the archive could not be opened, if it failed.
    pub fn failure(&self) -> Option<&str> {
        match self.state.get() {
            Some(State::Failed(reason)) => Some(reason),
            _ => None,
        }
    }

    /// Installs an opened archive, making the slot ready.
    pub fn install(&self, archive: Archive<V>) -> Result<(), AlreadyInitializedError> {
        self.state
            .set(State::Ready(Mutex::new(archive)))
            .map_err(|_| AlreadyInitializedError)
    }

    /// Marks the slot as permanently failed.
    pub fn fail(&self, reason: impl fmt::Display) -> Result<(), AlreadyInitializedError> {
        self.state
            .set(State::Failed(reason.to_string()))
            .map_err(|_| AlreadyInitializedError)
    }
}

impl<V: Volume> ArchiveSlot<V> {
    /// Reads from the archive at `offset`. See [`Archive::read`].
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, ReadError> {
        match self.state.get() {
            None => Err(ReadError::NotReady),
            Some(State::Failed(_)) => Err(ReadError::Failed),
            Some(State::Ready(archive)) => archive
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .read_at(offset, buf)
                .map_err(ReadError::Io),
        }
    }

    /// Returns the length of the archive, if it is ready.
    pub fn len(&self) -> Option<u64> {
        match self.state.get() {
            Some(State::Ready(archive)) => {
                Some(archive.lock().unwrap_or_else(PoisonError::into_inner).len())
            }
            _ => None,
        }
    }
}

impl<V> Default for ArchiveSlot<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// An error returned when an [`ArchiveSlot`] is initialized twice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AlreadyInitializedError;

impl fmt::Display for AlreadyInitializedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("the archive slot is already initialized")
    }
}

impl std::error::Error for AlreadyInitializedError {}

/// Errors that arise when reading through an [`ArchiveSlot`].
#[derive(Debug)]
pub enum ReadError {
    NotReady,
    Failed,
    Io(io::Error),
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotReady => f.write_str("the archive is not ready"),
            Self::Failed => f.write_str("the archive could not be opened"),
            Self::Io(e) => write!(f, "failed to read the archive: {e}"),
        }
    }
}

impl std::error::Error for ReadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReadError> for io::Error {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::storage::memory::MemoryVolume;

    fn content(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    /// 10 clusters of 8 octets in 4 runs; the last cluster is partial.
    fn fragmented_archive(content: &[u8]) -> Archive<MemoryVolume> {
        let volume = MemoryVolume::with_chain(content, 8, &[12, 13, 2, 3, 4, 20, 7, 8, 9, 0]);
        Archive::open(volume).unwrap()
    }

    #[test]
    fn read_at_works_across_fragments() {
        let content = content(77);
        let mut archive = fragmented_archive(&content);
        assert_eq!(archive.link_map().fragments(), 5);
        for offset in 0..77 {
            for len in [1, 5, 8, 17, 40] {
                let mut buf = vec![0; len];
                let n = archive.read_at(offset as u64, &mut buf).unwrap();
                let expected = &content[offset..(offset + len).min(77)];
                assert_eq!(&buf[..n], expected, "offset {offset}, length {len}");
            }
        }
    }

    #[test]
    fn sequential_reads_advance_the_position() {
        let content = content(77);
        let mut archive = fragmented_archive(&content);
        archive.seek(30);
        let mut first = [0; 10];
        let mut second = [0; 10];
        assert_eq!(archive.read(&mut first).unwrap(), 10);
        assert_eq!(archive.read(&mut second).unwrap(), 10);
        assert_eq!(archive.position(), 50);
        assert_eq!(&first, &content[30..40]);
        assert_eq!(&second, &content[40..50]);
    }

    #[test]
    fn reads_past_the_end_are_short_or_empty() {
        let content = content(77);
        let mut archive = fragmented_archive(&content);
        let mut buf = [0; 16];
        assert_eq!(archive.len(), 77);
        assert!(!archive.is_empty());
        assert_eq!(archive.read_at(70, &mut buf).unwrap(), 7);
        assert_eq!(archive.read_at(77, &mut buf).unwrap(), 0);
        assert_eq!(archive.read_at(1_000_000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn empty_archive_reads_nothing() {
        let mut archive = Archive::open(MemoryVolume::with_chain(&[], 8, &[])).unwrap();
        assert!(archive.is_empty());
        assert_eq!(archive.link_map().fragments(), 0);
        assert_eq!(archive.read_at(0, &mut [0; 4]).unwrap(), 0);
    }

    #[test]
    fn reads_do_not_walk_the_chain() {
        let content = content(77);
        let mut archive = fragmented_archive(&content);
        let walked = archive.volume.chain_reads;
        let mut buf = [0; 3];
        archive.read_at(75, &mut buf).unwrap();
        archive.read_at(1, &mut buf).unwrap();
        assert_eq!(archive.volume.chain_reads, walked);
    }

    #[test]
    fn slot_lifecycle_works() {
        let slot: ArchiveSlot<MemoryVolume> = ArchiveSlot::new();
        let mut buf = [0; 4];
        assert_eq!(slot.status(), Status::NotReady);
        assert!(matches!(slot.read_at(0, &mut buf), Err(ReadError::NotReady)));
        assert_eq!(slot.len(), None);

        let content = content(77);
        slot.install(fragmented_archive(&content)).unwrap();
        assert_eq!(slot.status(), Status::Ready);
        assert_eq!(slot.len(), Some(77));
        assert_eq!(slot.read_at(0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, &content[..4]);

        assert_eq!(
            slot.install(fragmented_archive(&content)),
            Err(AlreadyInitializedError)
        );
        assert_eq!(slot.fail("too late"), Err(AlreadyInitializedError));
        assert_eq!(slot.status(), Status::Ready);
    }

    #[test]
    fn failed_slot_stays_failed() {
        let slot: ArchiveSlot<MemoryVolume> = ArchiveSlot::new();
        slot.fail(LinkMapError::TooFragmented).unwrap();
        assert_eq!(slot.status(), Status::Failed);
        assert!(slot.failure().unwrap().contains("too fragmented"));
        let mut buf = [0; 4];
        assert!(matches!(slot.read_at(0, &mut buf), Err(ReadError::Failed)));
    }

    #[test]
    fn concurrent_reads_are_coherent() {
        let content = Arc::new(content(4096));
        // Four runs of 16 clusters, out of order.
        let chain: Vec<u32> = (0..64).map(|i| [2, 0, 3, 1][i / 16] * 16 + i as u32 % 16).collect();
        let volume = MemoryVolume::with_chain(&content, 64, &chain);
        let slot: Arc<ArchiveSlot<MemoryVolume>> = Arc::new(ArchiveSlot::new());
        slot.install(Archive::open(volume).unwrap()).unwrap();

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let slot = slot.clone();
                let content = content.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        let offset = (t * 509 + i * 37) % 4000;
                        let mut buf = [0; 96];
                        let n = slot.read_at(offset as u64, &mut buf).unwrap();
                        assert_eq!(&buf[..n], &content[offset..offset + n]);
                        assert_eq!(n, 96);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
    }
}
