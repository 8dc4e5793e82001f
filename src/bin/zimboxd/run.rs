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

//! Implements the `run` command (i.e., running the daemon).

use std::fmt::Write;
use std::process;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error, Result};
use env_logger::Env;
use log::{error, info, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use zimbox::archive::{Archive, ArchiveSlot};
use zimbox::dns::Responder;
use zimbox::http::FileServer;
use zimbox::io::TokioIoProvider;
use zimbox::storage::HostVolume;

use crate::args::RunArgs;
use crate::config::{self, ArchiveConfig};

/// How long to wait for blocking tasks (such as file transfers) to
/// finish once the server tasks have shut down.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs the daemon.
pub fn run(args: RunArgs) {
    env_logger::init_from_env(Env::new().default_filter_or("info"));

    if let Err(e) = try_running(args) {
        let mut message = String::from("Failed to run:");
        append_cause_chain(&mut message, &e);
        message.push_str("\nExiting with failure.");
        error!("{}", message);
        process::exit(1);
    }
    info!("Exiting with success.");
}

fn try_running(run_args: RunArgs) -> Result<()> {
    info!(
        "Zimbox daemon v{}.{}.{} starting.",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR"),
        env!("CARGO_PKG_VERSION_PATCH"),
    );

    // Get the configuration, either from the file system or from the
    // command line arguments, as appropriate.
    let config = if let Some(ref config_path) = run_args.config {
        info!("Loading the configuration from {}.", config_path.display());
        config::load_from_path(config_path).context("failed to load the configuration")?
    } else {
        info!("Loading the configuration from the command line.");
        config::load_from_args(run_args)
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the Tokio runtime")?;

    // Bind first, so that we fail fast.
    let mut io_provider = runtime
        .block_on(TokioIoProvider::bind(config.dns.bind, config.http.bind))
        .context("failed to bind sockets")?;
    io_provider.set_idle_timeout(config.http.idle_timeout());

    let mut responder = Responder::new(config.dns.target);
    responder.set_ttl(config.dns.ttl);
    info!(
        "Answering DNS queries on {} with {} (TTL {}).",
        config.dns.bind,
        responder.target(),
        responder.ttl(),
    );
    let slot = Arc::new(ArchiveSlot::new());
    let paths = config
        .http
        .path_resolver()
        .context("failed to configure the storage root")?;
    let storage_root = paths.root().to_owned();
    let server = FileServer::new(paths, config.canonical_host(), slot.clone())
        .context("failed to configure the HTTP server")?;
    info!(
        "Serving {} over HTTP on {} as {}.",
        storage_root,
        config.http.bind,
        server.canonical_host(),
    );

    // Set up signal handling.
    let mut signals = set_up_signal_handling().context("failed to set up signal handling")?;

    // Start the I/O provider.
    info!("Set-up is complete; starting the server.");
    let shutdown_controller = {
        let _guard = runtime.enter();
        io_provider.start(Arc::new(responder), Arc::new(server))
    };

    // The archive is opened only now, in the background. Until it is
    // ready, archive requests are refused.
    match config.archive {
        Some(archive_config) => {
            runtime.spawn_blocking(move || open_archive(&slot, archive_config));
        }
        None => info!("No archive is configured."),
    }

    // Wait for a termination signal.
    if let Some(signal) = signals.forever().next() {
        let name = match signal {
            SIGINT => "SIGINT",
            SIGTERM => "SIGTERM",
            _ => unreachable!(),
        };
        info!("Received {}; shutting down.", name);
    }

    // Shut down the server.
    shutdown_controller.blocking_shut_down();
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    info!("Shutdown complete.");
    Ok(())
}

/// Opens the archive and builds its link map, then installs it in
/// `slot` (or records why it could not be opened).
fn open_archive(slot: &ArchiveSlot<HostVolume>, config: ArchiveConfig) {
    info!("Opening the archive {}.", config.path.display());
    let opened = HostVolume::open(&config.path, config.cluster_size)
        .context("failed to open the archive file")
        .and_then(|volume| Archive::open(volume).context("failed to build the link map"));

    let installed = match opened {
        Ok(archive) => {
            if archive.is_empty() {
                warn!("The archive {} is empty.", config.path.display());
            }
            let fragments = archive.link_map().fragments();
            slot.install(archive).map(|()| {
                info!(
                    "Archive ready: {} octets in {} fragments.",
                    slot.len().unwrap_or_default(),
                    fragments,
                );
            })
        }
        Err(e) => {
            let mut message = format!("Failed to open the archive {}:", config.path.display());
            append_cause_chain(&mut message, &e);
            error!("{}", message);
            slot.fail(format!("{e:#}"))
        }
    };
    if let Err(e) = installed {
        error!("{}", e);
    }
}

/// Appends the numbered causes of `e` to `message`, one per line.
fn append_cause_chain(message: &mut String, e: &Error) {
    for (i, cause) in e.chain().enumerate() {
        write!(message, "\n[{}] {}", i + 1, cause).unwrap();
    }
}

fn set_up_signal_handling() -> Result<Signals> {
    let term_signals = &[SIGINT, SIGTERM];
    let already_terminating = Arc::new(AtomicBool::new(false));

    // This sets up signal handlers to exit immediately if a second
    // termination signal arrives before the process finishes shutting
    // down gracefully.
    for sig in term_signals {
        signal_hook::flag::register_conditional_shutdown(*sig, 1, already_terminating.clone())?;
        signal_hook::flag::register(*sig, already_terminating.clone())?;
    }

    Signals::new(term_signals).map_err(Into::into)
}
