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

//! Implements the daemon configuration file.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::Level::Debug;
use log::{debug, log_enabled};
use serde::Deserialize;

use zimbox::dns::constants::DEFAULT_TTL;
use zimbox::http::PathResolver;
use zimbox::io::TokioIoProvider;
use zimbox::storage::HostVolume;

use crate::args::RunArgs;

////////////////////////////////////////////////////////////////////////
// CONFIGURATION LOADING                                              //
////////////////////////////////////////////////////////////////////////

/// Loads the daemon configuration from the file given by `path`.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let dir = match path.as_ref().parent() {
        Some(p) => p,
        None => return Err(anyhow!("the configuration file path has no parent")),
    };
    let raw_config = fs::read(path.as_ref()).context("failed to read the configuration file")?;
    let mut config: Config =
        toml::from_slice(&raw_config).context("failed to parse the configuration file")?;

    // When loading the configuration from a path, the storage root and
    // the archive path are interpreted relative to the configuration
    // file's directory.
    if config.http.root.is_relative() {
        config.http.root = dir.join(&config.http.root);
    }
    if let Some(ref mut archive) = config.archive {
        if archive.path.is_relative() {
            archive.path = dir.join(&archive.path);
        }
    }

    log_config_summary(&config);
    Ok(config)
}

/// Loads the daemon configuration from the parsed command line
/// arguments given by `args`.
pub fn load_from_args(args: RunArgs) -> Config {
    let mut dns = DnsConfig::default();
    if let Some(bind) = args.dns_bind {
        dns.bind = bind;
    }
    if let Some(target) = args.target {
        dns.target = target;
    }

    let mut http = HttpConfig::default();
    if let Some(bind) = args.http_bind {
        http.bind = bind;
    }
    if let Some(root) = args.root {
        http.root = root;
    }

    let config = Config {
        dns,
        http,
        archive: args.archive.map(|path| ArchiveConfig {
            path,
            cluster_size: args.cluster_size.unwrap_or_else(default_cluster_size),
        }),
    };
    log_config_summary(&config);
    config
}

/// Summarizes the configuration in the log, if the debug log level is
/// enabled.
fn log_config_summary(config: &Config) {
    if !log_enabled!(Debug) {
        // Don't compute the message if it will never be printed.
        return;
    }

    let archive = match config.archive {
        Some(ref archive) => format!(
            "{} ({} octet clusters)",
            archive.path.display(),
            archive.cluster_size
        ),
        None => "none".to_owned(),
    };
    debug!(
        "Configuration loaded:\n         DNS bind address:  {}\n         DNS target:        {} (TTL {})\n         HTTP bind address: {}\n         Storage root:      {}\n         Canonical host:    {}\n         Archive:           {}",
        config.dns.bind,
        config.dns.target,
        config.dns.ttl,
        config.http.bind,
        config.http.root.display(),
        config.canonical_host(),
        archive,
    );
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION FILE STRUCTURE                                       //
////////////////////////////////////////////////////////////////////////

/// The complete configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub archive: Option<ArchiveConfig>,
}

impl Config {
    /// Returns the host that HTTP requests are expected to name. This
    /// defaults to the DNS target address.
    pub fn canonical_host(&self) -> String {
        self.http
            .canonical_host
            .clone()
            .unwrap_or_else(|| self.dns.target.to_string())
    }
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: DNS                                         //
////////////////////////////////////////////////////////////////////////

/// The configuration of the DNS responder.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsConfig {
    #[serde(default = "default_dns_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_target")]
    pub target: Ipv4Addr,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            bind: default_dns_bind(),
            target: default_target(),
            ttl: default_ttl(),
        }
    }
}

const DEFAULT_BIND_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

fn default_dns_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, 53)
}

fn default_target() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 4, 1)
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: HTTP                                        //
////////////////////////////////////////////////////////////////////////

/// The configuration of the HTTP file server.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_root")]
    pub root: PathBuf,
    pub canonical_host: Option<String>,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_path_capacity")]
    pub path_capacity: usize,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

impl HttpConfig {
    /// Creates the [`PathResolver`] this configuration describes.
    pub fn path_resolver(&self) -> Result<PathResolver> {
        let root = self
            .root
            .to_str()
            .ok_or_else(|| anyhow!("the storage root is not valid UTF-8"))?;
        let mut paths = PathResolver::new(root);
        paths.set_index(self.index.as_str());
        paths.set_capacity(self.path_capacity);
        Ok(paths)
    }

    /// Returns the idle connection timeout.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            root: default_root(),
            canonical_host: None,
            index: default_index(),
            path_capacity: default_path_capacity(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

fn default_http_bind() -> SocketAddr {
    SocketAddr::new(DEFAULT_BIND_IP, 80)
}

fn default_root() -> PathBuf {
    PathBuf::from("/sd/www")
}

fn default_index() -> String {
    PathResolver::DEFAULT_INDEX.to_owned()
}

fn default_path_capacity() -> usize {
    PathResolver::DEFAULT_CAPACITY
}

fn default_idle_timeout() -> u64 {
    TokioIoProvider::DEFAULT_IDLE_TIMEOUT.as_secs()
}

////////////////////////////////////////////////////////////////////////
// CONFIGURATION SECTION: ARCHIVE                                     //
////////////////////////////////////////////////////////////////////////

/// The configuration of the archive served under `/zim?`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArchiveConfig {
    pub path: PathBuf,
    #[serde(default = "default_cluster_size")]
    pub cluster_size: u64,
}

fn default_cluster_size() -> u64 {
    HostVolume::DEFAULT_CLUSTER_SIZE
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
