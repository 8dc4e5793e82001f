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

//! Implementation of the [`LinkMap`] cluster-run index.

use std::fmt;
use std::io;

use arrayvec::ArrayVec;

use crate::storage::Volume;

/// The maximum number of runs a [`LinkMap`] can hold. This matches a
/// 128-word table: one word for the table size, then a (length, start)
/// pair per run.
pub const LINK_MAP_CAPACITY: usize = 63;

/// A run of consecutive clusters.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Run {
    start: u32,
    len: u32,
}

/// An index of a file's cluster chain.
///
/// Seeking in a cluster-chained file normally means following the chain
/// from the first cluster, which is linear in the seek offset. A
/// `LinkMap` is built by walking the chain once and recording it as a
/// list of runs of consecutive clusters. After that, any offset can be
/// mapped to its cluster by scanning at most [`LINK_MAP_CAPACITY`] runs
/// without touching the volume.
///
/// The table has a fixed size. A file fragmented into more runs than
/// that cannot be indexed.
#[derive(Clone, Debug)]
pub struct LinkMap {
    cluster_size: u64,
    runs: ArrayVec<Run, LINK_MAP_CAPACITY>,
}

impl LinkMap {
    /// Builds the link map for the file on `volume`.
    ///
    /// The chain must contain exactly as many clusters as the file's
    /// length requires; a chain that ends early or runs on (including
    /// one that loops) is reported as [`LinkMapError::BrokenChain`].
    pub fn build<V: Volume + ?Sized>(volume: &mut V) -> Result<Self, LinkMapError> {
        let cluster_size = volume.cluster_size();
        if cluster_size == 0 {
            return Err(LinkMapError::ZeroClusterSize);
        }
        let expected = (volume.len() + cluster_size - 1) / cluster_size;

        let mut runs: ArrayVec<Run, LINK_MAP_CAPACITY> = ArrayVec::new();
        let mut seen = 0;
        let mut next = volume.first_cluster();
        while let Some(cluster) = next {
            seen += 1;
            if seen > expected {
                return Err(LinkMapError::BrokenChain);
            }
            match runs.last_mut() {
                Some(run) if run.start.checked_add(run.len) == Some(cluster) => run.len += 1,
                _ => runs
                    .try_push(Run {
                        start: cluster,
                        len: 1,
                    })
                    .map_err(|_| LinkMapError::TooFragmented)?,
            }
            next = volume.next_cluster(cluster)?;
        }
        if seen < expected {
            return Err(LinkMapError::BrokenChain);
        }

        Ok(Self { cluster_size, runs })
    }

    /// Maps a file offset to the cluster holding it and the offset
    /// within that cluster. Returns [`None`] if `offset` lies beyond
    /// the last cluster of the file.
    pub fn locate(&self, offset: u64) -> Option<(u32, u64)> {
        let mut index = offset / self.cluster_size;
        let within = offset % self.cluster_size;
        for run in &self.runs {
            if index < run.len as u64 {
                return Some((run.start + index as u32, within));
            }
            index -= run.len as u64;
        }
        None
    }

    /// Returns the number of runs (fragments) in the map.
    pub fn fragments(&self) -> usize {
        self.runs.len()
    }

    /// Returns the cluster size of the indexed volume.
    pub fn cluster_size(&self) -> u64 {
        self.cluster_size
    }
}

/// Errors that arise while building a [`LinkMap`].
#[derive(Debug)]
pub enum LinkMapError {
    ZeroClusterSize,
    TooFragmented,
    BrokenChain,
    Io(io::Error),
}

impl fmt::Display for LinkMapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ZeroClusterSize => f.write_str("the volume reports a zero cluster size"),
            Self::TooFragmented => write!(
                f,
                "the file is too fragmented (more than {LINK_MAP_CAPACITY} runs)"
            ),
            Self::BrokenChain => {
                f.write_str("the cluster chain does not match the file length")
            }
            Self::Io(e) => write!(f, "failed to read the cluster chain: {e}"),
        }
    }
}

impl std::error::Error for LinkMapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LinkMapError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryVolume;

    #[test]
    fn build_merges_consecutive_clusters() {
        let mut volume = MemoryVolume::with_chain(&[0; 40], 4, &[3, 4, 5, 9, 10, 1, 2, 0, 6, 7]);
        let map = LinkMap::build(&mut volume).unwrap();
        assert_eq!(map.fragments(), 5);
        assert_eq!(map.cluster_size(), 4);
    }

    #[test]
    fn locate_works() {
        let mut volume = MemoryVolume::with_chain(&[0; 22], 4, &[3, 4, 9, 10, 11, 1]);
        let map = LinkMap::build(&mut volume).unwrap();
        assert_eq!(map.locate(0), Some((3, 0)));
        assert_eq!(map.locate(7), Some((4, 3)));
        assert_eq!(map.locate(8), Some((9, 0)));
        assert_eq!(map.locate(19), Some((11, 3)));
        assert_eq!(map.locate(21), Some((1, 1)));
        assert_eq!(map.locate(24), None);
        assert_eq!(map.locate(u64::MAX), None);
    }

    #[test]
    fn build_accepts_exactly_full_table() {
        // Every other cluster, so no two are consecutive.
        let chain: Vec<u32> = (0..LINK_MAP_CAPACITY as u32).map(|i| i * 2).collect();
        let mut volume = MemoryVolume::with_chain(&vec![0; chain.len()], 1, &chain);
        let map = LinkMap::build(&mut volume).unwrap();
        assert_eq!(map.fragments(), LINK_MAP_CAPACITY);
    }

    #[test]
    fn build_rejects_overly_fragmented_files() {
        let chain: Vec<u32> = (0..=LINK_MAP_CAPACITY as u32).map(|i| i * 2).collect();
        let mut volume = MemoryVolume::with_chain(&vec![0; chain.len()], 1, &chain);
        assert!(matches!(
            LinkMap::build(&mut volume),
            Err(LinkMapError::TooFragmented)
        ));
    }

    #[test]
    fn build_rejects_short_chains() {
        let mut volume = MemoryVolume::with_chain(&[0; 8], 4, &[0, 1]);
        volume.len = 9;
        assert!(matches!(
            LinkMap::build(&mut volume),
            Err(LinkMapError::BrokenChain)
        ));
    }

    #[test]
    fn build_rejects_looping_chains() {
        let mut volume = MemoryVolume::with_chain(&[0; 8], 4, &[0, 1]);
        volume.table[1] = 0;
        assert!(matches!(
            LinkMap::build(&mut volume),
            Err(LinkMapError::BrokenChain)
        ));
    }

    #[test]
    fn build_propagates_chain_read_errors() {
        let mut volume = MemoryVolume::with_chain(&[0; 8], 4, &[0, 1]);
        volume.table[0] = 77;
        assert!(matches!(LinkMap::build(&mut volume), Err(LinkMapError::Io(_))));
    }

    #[test]
    fn empty_file_has_empty_map() {
        let mut volume = MemoryVolume::with_chain(&[], 4, &[]);
        let map = LinkMap::build(&mut volume).unwrap();
        assert_eq!(map.fragments(), 0);
        assert_eq!(map.locate(0), None);
    }
}
