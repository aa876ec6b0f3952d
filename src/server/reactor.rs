//! Single-task event loop
//!
//! One task owns every piece of mutable state (connections, membership
//! index, broker), so no locking is needed anywhere. Each turn of the loop
//! waits on exactly one of: a termination signal, an admin console line,
//! a pending accept, or readiness of any live connection, then applies the
//! event and prints whatever landed on the local queue.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader, Ready};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use crate::broker::MessageBroker;
use crate::config::ServerConfig;
use crate::error::{CastError, Result};
use crate::membership::MembershipIndex;
use crate::protocol::codec::ReadOutcome;
use crate::protocol::frame::MessageKind;
use crate::server::admin::{self, AdminOutcome};
use crate::server::connection::{Connection, WriteStatus};
use crate::server::dispatch;

/// One loop turn's worth of input
enum Event {
    Signal(&'static str),
    Admin(io::Result<Option<String>>),
    Accept(io::Result<(TcpStream, SocketAddr)>),
    Ready(RawFd, io::Result<Ready>),
}

/// The chat server: listener, connections, membership, broker
pub struct Reactor {
    listener: TcpListener,
    conns: HashMap<RawFd, Connection>,
    index: MembershipIndex,
    broker: MessageBroker,
}

impl Reactor {
    /// Bind the listener and seed the membership index from `config`
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| CastError::setup(format!("bind {}: {}", config.bind_addr, e)))?;

        let mut index = MembershipIndex::new();
        for (name, passwd) in &config.roommates {
            index.roommate_upsert(name, passwd);
        }
        for (room, mate) in &config.room_mates {
            index.room_add_mates(room, &[mate.as_str()]);
        }
        info!(
            admin = %config.admin_name,
            roommates = index.roommate_count(),
            rooms = index.room_count(),
            "membership seeded"
        );

        Ok(Self {
            listener,
            conns: HashMap::new(),
            index,
            broker: MessageBroker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run until a termination signal or the admin `:quit` command
    ///
    /// Accept failures and per-connection errors are logged and survived;
    /// only signal delivery setup can fail here.
    pub async fn run(&mut self) -> Result<()> {
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| CastError::setup(format!("install SIGHUP handler: {}", e)))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| CastError::setup(format!("install SIGINT handler: {}", e)))?;
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| CastError::setup(format!("install SIGTERM handler: {}", e)))?;

        let mut admin_lines = BufReader::new(tokio::io::stdin()).lines();
        let mut admin_eof = false;

        self.broker
            .log_info(format!("listening on {}", self.local_addr()?));
        self.flush_locals();

        loop {
            let event = {
                let conns = &self.conns;
                tokio::select! {
                    _ = sighup.recv() => Event::Signal("SIGHUP"),
                    _ = sigint.recv() => Event::Signal("SIGINT"),
                    _ = sigterm.recv() => Event::Signal("SIGTERM"),
                    line = admin_lines.next_line(), if !admin_eof => Event::Admin(line),
                    accepted = self.listener.accept() => Event::Accept(accepted),
                    (fd, readiness) = next_ready(conns) => Event::Ready(fd, readiness),
                }
            };

            match event {
                Event::Signal(name) => {
                    self.broker.log_info(format!("{} received, shutting down", name));
                    break;
                }
                Event::Admin(Ok(Some(line))) => {
                    if admin::handle_line(&line, &mut self.index, &mut self.broker)
                        == AdminOutcome::Quit
                    {
                        break;
                    }
                }
                Event::Admin(Ok(None)) => {
                    debug!("admin console closed");
                    admin_eof = true;
                }
                Event::Admin(Err(e)) => {
                    self.broker.log_io_error("admin console read failed", &e);
                    admin_eof = true;
                }
                Event::Accept(Ok((stream, addr))) => self.accept(stream, addr),
                Event::Accept(Err(e)) => {
                    self.broker.log_io_error("accept failed", &e);
                }
                Event::Ready(fd, Ok(readiness)) => self.service(fd, readiness),
                Event::Ready(fd, Err(e)) => {
                    self.broker.log_io_error("connection readiness failed", &e);
                    self.teardown(fd, "readiness error");
                }
            }

            self.flush_locals();
        }

        let open = self.conns.len();
        self.conns.clear();
        self.broker
            .log_info(format!("closed {} connection(s), goodbye", open));
        self.flush_locals();
        Ok(())
    }

    fn accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        let fd = stream.as_raw_fd();
        if self.conns.contains_key(&fd) {
            self.broker
                .log_error(format!("duplicate descriptor {} for {}, dropping", fd, addr));
            return;
        }
        self.broker.log_info(format!("accepted connection from {}", addr));
        self.conns.insert(fd, Connection::new(stream, addr));
    }

    /// Serve one connection's readiness: drain reads, then flush writes
    fn service(&mut self, fd: RawFd, readiness: Ready) {
        if readiness.is_readable() || readiness.is_read_closed() {
            loop {
                let outcome = match self.conns.get_mut(&fd) {
                    Some(conn) => conn.read_step(),
                    None => return,
                };
                match outcome {
                    Ok(ReadOutcome::Complete(frame)) => {
                        dispatch::handle_frame(
                            &mut self.conns,
                            &self.index,
                            &mut self.broker,
                            fd,
                            frame,
                        );
                    }
                    Ok(ReadOutcome::Pending) => break,
                    Ok(ReadOutcome::PeerClosed) => {
                        self.teardown(fd, "peer closed");
                        return;
                    }
                    Err(e) => {
                        self.broker.log_io_error(
                            format!("read on descriptor {} failed", fd),
                            &e,
                        );
                        self.teardown(fd, "read error");
                        return;
                    }
                }
            }
        }
        if readiness.is_writable() {
            self.flush_conn(fd);
        }
    }

    fn flush_conn(&mut self, fd: RawFd) {
        let status = match self.conns.get_mut(&fd) {
            Some(conn) => conn.write_step(),
            None => return,
        };
        match status {
            Ok(WriteStatus::Idle | WriteStatus::Pending) => {}
            Ok(WriteStatus::FinSent) => self.teardown(fd, "final message sent"),
            Err(e) => {
                self.broker
                    .log_io_error(format!("write on descriptor {} failed", fd), &e);
                self.teardown(fd, "write error");
            }
        }
    }

    /// Drop a connection; roommates and rooms are untouched
    fn teardown(&mut self, fd: RawFd, reason: &str) {
        if let Some(conn) = self.conns.remove(&fd) {
            self.broker.log_info(format!(
                "connection from {} closed ({})",
                conn.addr(),
                reason
            ));
        }
    }

    /// Print everything routed to the local queue
    fn flush_locals(&mut self) {
        for msg in self.broker.drain_local() {
            let text = String::from_utf8_lossy(msg.payload());
            let text = text.trim_end_matches('\n');
            if msg.kind() == MessageKind::LocalError {
                warn!("{}", text);
                eprintln!("{}", text);
            } else {
                println!("{}", text);
            }
        }
    }
}

/// Wait for the first connection to become ready
///
/// Pends forever while no connections exist, letting the other select arms
/// drive the loop.
async fn next_ready(
    conns: &HashMap<RawFd, Connection>,
) -> (RawFd, io::Result<Ready>) {
    if conns.is_empty() {
        return std::future::pending().await;
    }
    let mut readiness: FuturesUnordered<_> = conns
        .values()
        .map(|conn| {
            let fd = conn.fd();
            let interest = conn.interest();
            async move { (fd, conn.stream().ready(interest).await) }
        })
        .collect();
    match readiness.next().await {
        Some(event) => event,
        None => std::future::pending().await,
    }
}
