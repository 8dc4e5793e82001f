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

//! The storage boundary that the archive reader consumes.
//!
//! Block filesystems store a file's content as a chain of clusters,
//! each of which points at the next. The [`Volume`] trait exposes one
//! such file: the chain itself (so that an index can be built over it)
//! and reads within individual clusters.

use std::io;

mod host;

pub use host::HostVolume;

/// A single file on a cluster-based volume.
///
/// Cluster numbers are opaque to callers: they are only ever obtained
/// from [`Volume::first_cluster`] and [`Volume::next_cluster`] (or
/// derived by the link map from consecutive runs of them).
pub trait Volume: Send {
    /// The size of one cluster, in octets. This must not be zero.
    fn cluster_size(&self) -> u64;

    /// The length of the file, in octets.
    fn len(&self) -> u64;

    /// Returns whether the file is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first cluster of the file, or [`None`] if the file has no
    /// clusters allocated.
    fn first_cluster(&self) -> Option<u32>;

    /// The cluster that follows `cluster` in the file's chain, or
    /// [`None`] if `cluster` is the last one.
    fn next_cluster(&mut self, cluster: u32) -> io::Result<Option<u32>>;

    /// Reads from `cluster`, starting `offset` octets into it. The
    /// caller guarantees that `offset + buf.len()` does not exceed the
    /// cluster size. Like [`io::Read::read`], this may return fewer
    /// octets than requested.
    fn read_cluster(&mut self, cluster: u32, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
}

impl<V: Volume + ?Sized> Volume for Box<V> {
    fn cluster_size(&self) -> u64 {
        (**self).cluster_size()
    }

    fn len(&self) -> u64 {
        (**self).len()
    }

    fn first_cluster(&self) -> Option<u32> {
        (**self).first_cluster()
    }

    fn next_cluster(&mut self, cluster: u32) -> io::Result<Option<u32>> {
        (**self).next_cluster(cluster)
    }

    fn read_cluster(&mut self, cluster: u32, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_cluster(cluster, offset, buf)
    }
}

/// An in-memory volume with an explicit cluster chain, for tests.
#[cfg(test)]
pub(crate) mod memory {
    use super::*;

    /// A volume image: `data` is the data region, split into clusters
    /// of `cluster_size` octets, and `table` maps each cluster to its
    /// successor (`u32::MAX` marks the end of the chain).
    pub struct MemoryVolume {
        pub data: Vec<u8>,
        pub table: Vec<u32>,
        pub cluster_size: u64,
        pub first: Option<u32>,
        pub len: u64,
        pub chain_reads: usize,
    }

    impl MemoryVolume {
        /// Lays out `content` over the clusters listed in `chain`, in
        /// order.
        pub fn with_chain(content: &[u8], cluster_size: u64, chain: &[u32]) -> Self {
            let cluster_count = chain.iter().copied().max().map_or(0, |c| c as usize + 1);
            let mut data = vec![0; cluster_count * cluster_size as usize];
            let mut table = vec![u32::MAX; cluster_count];
            for (i, piece) in content.chunks(cluster_size as usize).enumerate() {
                let start = chain[i] as usize * cluster_size as usize;
                data[start..start + piece.len()].copy_from_slice(piece);
            }
            for pair in chain.windows(2) {
                table[pair[0] as usize] = pair[1];
            }
            Self {
                data,
                table,
                cluster_size,
                first: chain.first().copied(),
                len: content.len() as u64,
                chain_reads: 0,
            }
        }
    }

    impl Volume for MemoryVolume {
        fn cluster_size(&self) -> u64 {
            self.cluster_size
        }

        fn len(&self) -> u64 {
            self.len
        }

        fn first_cluster(&self) -> Option<u32> {
            self.first
        }

        fn next_cluster(&mut self, cluster: u32) -> io::Result<Option<u32>> {
            self.chain_reads += 1;
            match self.table.get(cluster as usize) {
                Some(&u32::MAX) => Ok(None),
                Some(&next) => Ok(Some(next)),
                None => Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "cluster out of range",
                )),
            }
        }

        fn read_cluster(&mut self, cluster: u32, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (cluster as u64 * self.cluster_size + offset) as usize;
            let end = start + buf.len();
            buf.copy_from_slice(&self.data[start..end]);
            Ok(buf.len())
        }
    }
}
