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

//! Implementation of [`HostVolume`].

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::Volume;

/// A file on the host filesystem presented as a [`Volume`].
///
/// The host kernel already maps file offsets to disk blocks, so from
/// our point of view the file is one contiguous run of clusters
/// numbered from zero. The cluster size then only sets the granularity
/// of reads.
pub struct HostVolume {
    file: File,
    len: u64,
    cluster_size: u64,
}

impl HostVolume {
    /// The default cluster size: 32 KiB, the usual FAT32 allocation
    /// unit for large SD cards.
    pub const DEFAULT_CLUSTER_SIZE: u64 = 32 * 1024;

    /// Opens the file at `path` for reading.
    pub fn open(path: impl AsRef<Path>, cluster_size: u64) -> io::Result<Self> {
        if cluster_size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the cluster size must not be zero",
            ));
        }
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        Ok(Self {
            file,
            len: metadata.len(),
            cluster_size,
        })
    }

    fn cluster_count(&self) -> u64 {
        (self.len + self.cluster_size - 1) / self.cluster_size
    }
}

impl Volume for HostVolume {
    fn cluster_size(&self) -> u64 {
        self.cluster_size
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn first_cluster(&self) -> Option<u32> {
        if self.len == 0 {
            None
        } else {
            Some(0)
        }
    }

    fn next_cluster(&mut self, cluster: u32) -> io::Result<Option<u32>> {
        let next = cluster as u64 + 1;
        if next < self.cluster_count() {
            u32::try_from(next)
                .map(Some)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "file has too many clusters"))
        } else {
            Ok(None)
        }
    }

    fn read_cluster(&mut self, cluster: u32, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file
            .seek(SeekFrom::Start(cluster as u64 * self.cluster_size + offset))?;
        self.file.read(buf)
    }
}
