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

//! Implementation of the Tokio I/O provider.

// NOTE: In this provider, I/O error handling is generally to exit the
// task. The run_with_respawning function acts as a supervisor that will
// respawn the HTTP acceptor and DNS receiver, after a delay, if they
// exit with an error or a panic.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioIo, TokioTimer};
use log::{debug, error};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc};

use crate::dns::constants::ANSWER_SIZE;
use crate::dns::{Responder, RECEIVE_BUFFER_SIZE};
use crate::http::FileServer;
use crate::storage::Volume;

/// A Tokio I/O provider.
///
/// This provider runs the DNS responder and the HTTP file server by
/// spawning tasks on a Tokio runtime. It supports graceful shutdown:
/// to initiate one, use the [`TokioShutdownController`] returned by
/// [`TokioIoProvider::start`].
pub struct TokioIoProvider {
    dns_socket: UdpSocket,
    http_listener: TcpListener,
    idle_timeout: Duration,
}

impl TokioIoProvider {
    /// The default time an HTTP connection may sit idle before it is
    /// closed.
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a new `TokioIoProvider`. This call binds the DNS socket
    /// and the HTTP listener in preparation, but does not start
    /// serving. This function requires that the Tokio runtime be
    /// active.
    pub async fn bind(dns_addr: SocketAddr, http_addr: SocketAddr) -> io::Result<Self> {
        let dns_socket = UdpSocket::bind(dns_addr).await?;
        let http_listener = TcpListener::bind(http_addr).await?;
        Ok(Self {
            dns_socket,
            http_listener,
            idle_timeout: Self::DEFAULT_IDLE_TIMEOUT,
        })
    }

    /// Returns the address the DNS socket is bound to.
    pub fn dns_local_addr(&self) -> io::Result<SocketAddr> {
        self.dns_socket.local_addr()
    }

    /// Returns the address the HTTP listener is bound to.
    pub fn http_local_addr(&self) -> io::Result<SocketAddr> {
        self.http_listener.local_addr()
    }

    /// Sets how long an HTTP connection may wait for a request's
    /// headers before it is closed.
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Starts serving on the active Tokio runtime.
    ///
    /// This spawns tasks on the active Tokio runtime and then returns
    /// a [`TokioShutdownController`] that can be used to shut down the
    /// tasks at a later time. (The [`TokioShutdownController`] must be
    /// held as long as the server should be running, since dropping it
    /// will trigger shutdown.)
    pub fn start<V>(
        self,
        responder: Arc<Responder>,
        server: Arc<FileServer<V>>,
    ) -> TokioShutdownController
    where
        V: Volume + 'static,
    {
        let (shutdown_controller, shutdown_handle) = make_shutdown_channels();

        tokio::spawn(run_with_respawning(
            run_dns_receiver,
            shutdown_handle.clone(),
            responder,
            Arc::new(self.dns_socket),
        ));

        let http = HttpContext {
            server,
            idle_timeout: self.idle_timeout,
        };
        tokio::spawn(run_with_respawning(
            run_http_acceptor,
            shutdown_handle,
            http,
            Arc::new(self.http_listener),
        ));

        shutdown_controller
    }
}

/// How long to wait between respawns of a task. This is to prevent
/// tasks that crash immediately from using up significant CPU time.
const TASK_RESPAWN_DELAY: Duration = Duration::from_secs(1);

/// Runs a Tokio task, respawning it if it returns an I/O error, is
/// cancelled, or panics.
async fn run_with_respawning<F, G, H, S>(f: F, mut shutdown: ShutdownHandle, handler: H, socket: S)
where
    F: Fn(ShutdownHandle, H, S) -> G,
    G: Future<Output = io::Result<()>> + Send + 'static,
    H: Clone,
    S: Clone,
{
    loop {
        let last_spawn_time = Instant::now();
        match tokio::spawn(f(shutdown.clone(), handler.clone(), socket.clone())).await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => log_io_error(e),
            Err(_) => (), // The task panicked or was cancelled.
        }

        // If necessary, wait before respawning, but receive shutdown
        // requests immediately.
        let since_last_spawn = Instant::now().duration_since(last_spawn_time);
        if let Some(duration_to_wait) = TASK_RESPAWN_DELAY.checked_sub(since_last_spawn) {
            tokio::select! {
                _ = shutdown.request_receiver.recv() => return,
                _ = tokio::time::sleep(duration_to_wait) => (),
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// DNS                                                                //
////////////////////////////////////////////////////////////////////////

/// The DNS receiver loop.
///
/// Datagrams are handled one at a time, in place: the query is received
/// into a buffer with room for the answer left at the end, rewritten
/// into a response, and sent back to its source.
async fn run_dns_receiver(
    mut shutdown: ShutdownHandle,
    responder: Arc<Responder>,
    socket: Arc<UdpSocket>,
) -> io::Result<()> {
    let mut buf = [0; RECEIVE_BUFFER_SIZE];
    loop {
        let (received_len, src) = tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            res = socket.recv_from(&mut buf[..RECEIVE_BUFFER_SIZE - ANSWER_SIZE]) => res?,
        };

        match responder.respond_in_place(&mut buf, received_len) {
            Ok(response_len) => {
                if let Err(e) = socket.send_to(&buf[..response_len], src).await {
                    log_io_error(e);
                }
            }
            Err(rejection) => debug!("Ignoring datagram from {src}: {rejection}"),
        }
    }
}

////////////////////////////////////////////////////////////////////////
// HTTP                                                               //
////////////////////////////////////////////////////////////////////////

/// What the HTTP tasks need besides their listener.
struct HttpContext<V> {
    server: Arc<FileServer<V>>,
    idle_timeout: Duration,
}

impl<V> Clone for HttpContext<V> {
    fn clone(&self) -> Self {
        Self {
            server: self.server.clone(),
            idle_timeout: self.idle_timeout,
        }
    }
}

/// The HTTP listener/accept loop.
async fn run_http_acceptor<V>(
    mut shutdown: ShutdownHandle,
    http: HttpContext<V>,
    listener: Arc<TcpListener>,
) -> io::Result<()>
where
    V: Volume + 'static,
{
    loop {
        let (client, client_socket_addr) = tokio::select! {
            _ = shutdown.request_receiver.recv() => return Ok(()),
            res = listener.accept() => res?,
        };
        let shutdown = shutdown.clone();
        let http = http.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_http_connection(shutdown, http, client).await {
                debug!("HTTP connection from {client_socket_addr} failed: {e}");
            }
        });
    }
}

/// Serves HTTP/1.1 on a connection until the client closes it, it sits
/// idle for too long, or shutdown is requested. On shutdown, a response
/// already in flight is completed first.
async fn serve_http_connection<V>(
    mut shutdown: ShutdownHandle,
    http: HttpContext<V>,
    client: TcpStream,
) -> hyper::Result<()>
where
    V: Volume + 'static,
{
    let server = http.server;
    let service = service_fn(move |request: Request<Incoming>| {
        let server = server.clone();
        async move { Ok::<_, Infallible>(server.handle(request).await) }
    });
    let connection = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(http.idle_timeout)
        .serve_connection(TokioIo::new(client), service);
    tokio::pin!(connection);

    let mut shutting_down = false;
    loop {
        tokio::select! {
            res = connection.as_mut() => return res,
            _ = shutdown.request_receiver.recv(), if !shutting_down => {
                connection.as_mut().graceful_shutdown();
                shutting_down = true;
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////
// SHUTDOWN                                                           //
////////////////////////////////////////////////////////////////////////

/// Controls the shutdown of a server's Tokio tasks.
///
/// This type is used to shut down the Tokio tasks spawned by
/// [`TokioIoProvider::start`]. Use
/// [`TokioShutdownController::shut_down`] or its blocking variant,
/// [`TokioShutdownController::blocking_shut_down`], to initiate
/// shutdown and wait for its completion. Dropping the controller will
/// also trigger shutdown (but will not wait for it to complete).
#[must_use]
pub struct TokioShutdownController {
    request_sender: broadcast::Sender<()>,
    wait_receiver: mpsc::Receiver<()>,
}

impl TokioShutdownController {
    /// Requests that running server tasks shut down, and then waits for
    /// them to terminate.
    pub async fn shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.recv().await;
    }

    /// The blocking variant of [`TokioShutdownController::shut_down`].
    pub fn blocking_shut_down(mut self) {
        drop(self.request_sender);
        let _ = self.wait_receiver.blocking_recv();
    }
}

/// A handle held by tasks to interact with the graceful shutdown
/// mechanism.
///
/// This type has two roles:
///
/// 1. It enables tasks to listen for graceful shutdown signals. This
///    is done by waiting for all senders attached to `request_receiver`
///    to close.
/// 2. It prevents graceful shutdown from completing until it is
///    dropped. This is done by holding `wait_sender`. All server tasks,
///    including every HTTP connection task, therefore own a
///    `ShutdownHandle`.
struct ShutdownHandle {
    request_receiver: broadcast::Receiver<()>,
    wait_sender: mpsc::Sender<()>,
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        // A resubscribed receiver misses values already queued, but the
        // shutdown signal is not a value: it is all senders being
        // dropped.
        ShutdownHandle {
            request_receiver: self.request_receiver.resubscribe(),
            wait_sender: self.wait_sender.clone(),
        }
    }
}

/// Produces a [`TokioShutdownController`] and an initial
/// [`ShutdownHandle`] connected to it.
fn make_shutdown_channels() -> (TokioShutdownController, ShutdownHandle) {
    let (request_sender, request_receiver) = broadcast::channel(1);
    let (wait_sender, wait_receiver) = mpsc::channel(1);
    let controller = TokioShutdownController {
        request_sender,
        wait_receiver,
    };
    let handle = ShutdownHandle {
        request_receiver,
        wait_sender,
    };
    (controller, handle)
}

/// Logs an I/O error.
fn log_io_error(e: io::Error) {
    error!("I/O error: {e}");
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    use super::*;
    use crate::archive::{Archive, ArchiveSlot};
    use crate::http::PathResolver;
    use crate::storage::memory::MemoryVolume;

    const TARGET: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn loopback() -> SocketAddr {
        (Ipv4Addr::LOCALHOST, 0).into()
    }

    /// Starts a provider on loopback with a ready archive holding
    /// `b"0123456789"` and a storage root that does not exist.
    async fn start() -> (SocketAddr, SocketAddr, TokioShutdownController) {
        start_with_idle_timeout(TokioIoProvider::DEFAULT_IDLE_TIMEOUT).await
    }

    async fn start_with_idle_timeout(
        idle_timeout: Duration,
    ) -> (SocketAddr, SocketAddr, TokioShutdownController) {
        let mut provider = TokioIoProvider::bind(loopback(), loopback()).await.unwrap();
        provider.set_idle_timeout(idle_timeout);
        let dns_addr = provider.dns_local_addr().unwrap();
        let http_addr = provider.http_local_addr().unwrap();

        let slot = Arc::new(ArchiveSlot::new());
        let volume = MemoryVolume::with_chain(b"0123456789", 4, &[2, 0, 1]);
        slot.install(Archive::open(volume).unwrap()).unwrap();
        let server = FileServer::new(
            PathResolver::new("/nonexistent/www"),
            TARGET.to_string(),
            slot,
        )
        .unwrap();

        let controller = provider.start(Arc::new(Responder::new(TARGET)), Arc::new(server));
        (dns_addr, http_addr, controller)
    }

    #[tokio::test]
    async fn dns_queries_are_answered() {
        let (dns_addr, _, controller) = start().await;
        let client = UdpSocket::bind(loopback()).await.unwrap();

        // A query for "a.b" IN A, with ID 0xbeef and RD set.
        let query = [
            0xbe, 0xef, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, b'a',
            0x01, b'b', 0x00, 0x00, 0x01, 0x00, 0x01,
        ];
        client.send_to(&query, dns_addr).await.unwrap();
        let mut buf = [0; 512];
        let (len, _) = timeout(TIMEOUT, client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(len, query.len() + ANSWER_SIZE);
        assert_eq!(&buf[0..4], &[0xbe, 0xef, 0x81, 0x80]);
        assert_eq!(&buf[6..8], &[0x00, 0x01]);
        assert_eq!(&buf[12..query.len()], &query[12..]);
        assert_eq!(&buf[len - 4..len], &TARGET.octets());

        controller.shut_down().await;
    }

    #[tokio::test]
    async fn full_size_queries_are_answered() {
        let (dns_addr, _, controller) = start().await;
        let client = UdpSocket::bind(loopback()).await.unwrap();

        // "a.b" IN A followed by padding, filling the receive window.
        let mut query = vec![
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, b'a',
            0x01, b'b', 0x00, 0x00, 0x01, 0x00, 0x01,
        ];
        query.resize(RECEIVE_BUFFER_SIZE - ANSWER_SIZE, 0);
        assert_eq!(query.len(), 1008);
        client.send_to(&query, dns_addr).await.unwrap();
        let mut buf = [0; 2048];
        let (len, _) = timeout(TIMEOUT, client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(len, RECEIVE_BUFFER_SIZE);
        assert_eq!(&buf[0..4], &[0x12, 0x34, 0x81, 0x80]);
        assert_eq!(&buf[len - 4..len], &TARGET.octets());

        controller.shut_down().await;
    }

    #[tokio::test]
    async fn malformed_datagrams_are_ignored() {
        let (dns_addr, _, controller) = start().await;
        let client = UdpSocket::bind(loopback()).await.unwrap();
        client.send_to(&[0x12, 0x34], dns_addr).await.unwrap();
        let mut buf = [0; 512];
        assert!(
            timeout(Duration::from_millis(200), client.recv_from(&mut buf))
                .await
                .is_err()
        );
        controller.shut_down().await;
    }

    async fn http_exchange(http_addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(http_addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        timeout(TIMEOUT, stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn archive_reads_are_served_chunked() {
        let (_, http_addr, controller) = start().await;
        let response = http_exchange(
            http_addr,
            "GET /zim?3,5 HTTP/1.1\r\nHost: 192.168.4.1\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("transfer-encoding: chunked\r\n"));
        assert!(response.ends_with("\r\n0\r\n\r\n"));

        let (_, body) = response.split_once("\r\n\r\n").unwrap();
        let data: String = body
            .split("\r\n")
            .skip(1)
            .step_by(2)
            .collect();
        assert_eq!(data, "34567");
        controller.shut_down().await;
    }

    #[tokio::test]
    async fn foreign_hosts_are_redirected() {
        let (_, http_addr, controller) = start().await;
        let response = http_exchange(
            http_addr,
            "GET /generate_204 HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 301 Moved Permanently\r\n"));
        assert!(response.contains("location: http://192.168.4.1/\r\n"));
        controller.shut_down().await;
    }

    #[tokio::test]
    async fn shutdown_closes_idle_connections() {
        let (_, http_addr, controller) = start().await;
        let mut stream = TcpStream::connect(http_addr).await.unwrap();
        stream
            .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n")
            .await
            .unwrap();
        let mut buf = [0; 1024];
        let n = timeout(TIMEOUT, stream.read(&mut buf)).await.unwrap().unwrap();
        assert!(buf[..n].starts_with(b"HTTP/1.1 200 OK\r\n"));

        // The keep-alive connection must not hold up shutdown.
        timeout(TIMEOUT, controller.shut_down()).await.unwrap();
        let mut rest = Vec::new();
        timeout(TIMEOUT, stream.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn idle_connections_are_closed() {
        let (_, http_addr, controller) =
            start_with_idle_timeout(Duration::from_millis(500)).await;

        // A client that never sends anything.
        let mut silent = TcpStream::connect(http_addr).await.unwrap();
        let mut rest = Vec::new();
        timeout(TIMEOUT, silent.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();

        // A client that goes quiet after one keep-alive request.
        let mut kept_alive = TcpStream::connect(http_addr).await.unwrap();
        kept_alive
            .write_all(b"GET /favicon.ico HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n")
            .await
            .unwrap();
        let mut rest = Vec::new();
        timeout(TIMEOUT, kept_alive.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.starts_with(b"HTTP/1.1 200 OK\r\n"));

        controller.shut_down().await;
    }
}
