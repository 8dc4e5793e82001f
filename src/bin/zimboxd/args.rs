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

//! Implements command-line argument parsing.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parses the command line arguments.
pub fn parse() -> Args {
    Args::parse()
}

/// The Zimbox offline content daemon
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the DNS responder and the HTTP file server
    Run(RunArgs),
}

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Set the configuration file to use
    #[clap(
        long,
        conflicts_with_all = &["dns_bind", "http_bind", "target", "root", "archive", "cluster_size"],
        value_name = "FILE"
    )]
    pub config: Option<PathBuf>,

    /// Set the DNS responder bind IP address and port
    #[clap(long, value_name = "IP:PORT")]
    pub dns_bind: Option<SocketAddr>,

    /// Set the HTTP server bind IP address and port
    #[clap(long, value_name = "IP:PORT")]
    pub http_bind: Option<SocketAddr>,

    /// Set the address every DNS query is answered with
    #[clap(long, value_name = "IP")]
    pub target: Option<Ipv4Addr>,

    /// Set the directory static files are served from
    #[clap(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Set the archive file served under /zim?
    #[clap(long, value_name = "FILE")]
    pub archive: Option<PathBuf>,

    /// Set the cluster size of the archive's volume, in octets
    #[clap(long, requires = "archive", value_name = "OCTETS")]
    pub cluster_size: Option<u64>,
}
