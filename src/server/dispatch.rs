//! Routing of committed client messages
//!
//! Chat messages fan out according to the broadcast width in their ops
//! word; client commands (`login`, `join`, `leave`, `quit`) mutate the
//! sending connection's identity and answer on the active connection only.

use std::collections::HashMap;
use std::os::fd::RawFd;

use tracing::debug;

use crate::broker::MessageBroker;
use crate::config;
use crate::membership::MembershipIndex;
use crate::protocol::frame::{BroadcastWidth, Frame, MessageKind, Ops};
use crate::server::connection::Connection;

/// Resolve a broadcast width to the set of connections it addresses
///
/// `conns` yields `(fd, bound roommate, joined room)` for every live
/// connection. Width semantics:
/// * `Active` addresses the sender alone.
/// * `Mates*` widths address connections whose bound roommate is a mate of
///   `room_name`, wherever those connections currently sit.
/// * `Room*` widths address every connection joined to `room_name`, mate
///   or not.
///
/// Widths that include self always carry the sender; the `ExceptSelf`
/// variants never do.
pub fn relay_targets<'a, I>(
    conns: I,
    index: &MembershipIndex,
    origin: RawFd,
    width: BroadcastWidth,
    room_name: &str,
) -> Vec<RawFd>
where
    I: IntoIterator<Item = (RawFd, Option<&'a str>, Option<&'a str>)>,
{
    if width == BroadcastWidth::Active {
        return vec![origin];
    }
    let mut targets: Vec<RawFd> = conns
        .into_iter()
        .filter(|(_, mate, room)| match width {
            BroadcastWidth::Mates | BroadcastWidth::MatesExceptSelf => mate
                .map(|m| {
                    index
                        .room(room_name)
                        .map(|r| r.has_mate(m))
                        .unwrap_or(false)
                })
                .unwrap_or(false),
            _ => *room == Some(room_name),
        })
        .map(|(fd, _, _)| fd)
        .collect();
    if width.includes_self() {
        if !targets.contains(&origin) {
            targets.push(origin);
        }
    } else {
        targets.retain(|&fd| fd != origin);
    }
    targets
}

/// Handle one decoded frame from `origin`
///
/// Frames without the commit flag only extend the partial inbound message;
/// routing happens when the committing frame lands.
pub fn handle_frame(
    conns: &mut HashMap<RawFd, Connection>,
    index: &MembershipIndex,
    broker: &mut MessageBroker,
    origin: RawFd,
    frame: Frame,
) {
    let ops = frame.header.ops;
    let Some(conn) = conns.get_mut(&origin) else {
        return;
    };
    conn.accumulate(&frame.payload);
    if !ops.is_commit() {
        return;
    }
    let addr = conn.addr();
    let (payload, dropped) = conn.take_inbound();
    if dropped > 0 {
        // Truncated, not rejected; the diagnostic reaches the console.
        broker.log_error(format!(
            "message from {} truncated, {} bytes dropped",
            addr, dropped
        ));
    }

    match ops.kind() {
        MessageKind::Chat => relay_chat(conns, index, broker, origin, ops.width(), &payload),
        MessageKind::ClientCommand => client_command(conns, index, broker, origin, &payload),
        other => {
            debug!(kind = ?other, %addr, "rejecting client frame with server-side kind");
            respond(
                conns,
                broker,
                origin,
                MessageKind::ServerError,
                "unexpected message kind",
            );
        }
    }
}

fn relay_chat(
    conns: &mut HashMap<RawFd, Connection>,
    index: &MembershipIndex,
    broker: &mut MessageBroker,
    origin: RawFd,
    width: BroadcastWidth,
    payload: &[u8],
) {
    let Some(conn) = conns.get(&origin) else {
        return;
    };
    if conn.roommate().is_none() {
        respond(conns, broker, origin, MessageKind::ServerError, "login first");
        return;
    }
    let Some(room_name) = conn.room().map(str::to_string) else {
        respond(conns, broker, origin, MessageKind::ServerError, "join a room first");
        return;
    };

    let targets = relay_targets(
        conns.iter().map(|(&fd, c)| (fd, c.roommate(), c.room())),
        index,
        origin,
        width,
        &room_name,
    );
    if targets.is_empty() {
        return;
    }

    let relay_ops = Ops::new(MessageKind::Chat, width).with_commit();
    // The inbound buffer caps at the frame limit, so append only fails on
    // allocation, which discards the tail.
    if broker.append(relay_ops, payload).is_err() {
        broker.log_error(format!("dropping chat relay for room '{}'", room_name));
        return;
    }
    let Some(msg) = broker.commit(true) else {
        return;
    };
    for fd in targets {
        if let Some(target) = conns.get_mut(&fd) {
            target.enqueue(msg.clone());
        }
    }
}

fn client_command(
    conns: &mut HashMap<RawFd, Connection>,
    index: &MembershipIndex,
    broker: &mut MessageBroker,
    origin: RawFd,
    payload: &[u8],
) {
    let line = String::from_utf8_lossy(payload);
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((c, r)) => (c, r.trim()),
        None => (line, ""),
    };

    match command {
        "login" => {
            let Ok((name, passwd)) = config::parse_pair(rest, "login") else {
                respond(conns, broker, origin, MessageKind::ServerError, "login failed");
                return;
            };
            let authorized = index
                .roommate(&name)
                .map(|mate| mate.passwd() == passwd)
                .unwrap_or(false);
            if !authorized {
                respond(conns, broker, origin, MessageKind::ServerError, "login failed");
                return;
            }
            if let Some(conn) = conns.get_mut(&origin) {
                debug!(%name, addr = %conn.addr(), "roommate logged in");
                conn.set_roommate(Some(name.clone()));
            }
            respond(
                conns,
                broker,
                origin,
                MessageKind::ServerInfo,
                &format!("logged in as {}", name),
            );
        }
        "join" => {
            let Some(conn) = conns.get(&origin) else {
                return;
            };
            let Some(mate) = conn.roommate() else {
                respond(conns, broker, origin, MessageKind::ServerError, "login first");
                return;
            };
            let admitted = index
                .room(rest)
                .map(|room| room.is_open() || room.has_mate(mate))
                .unwrap_or(false);
            if !admitted || rest.is_empty() {
                respond(conns, broker, origin, MessageKind::ServerError, "cannot join room");
                return;
            }
            let room_name = rest.to_string();
            if let Some(conn) = conns.get_mut(&origin) {
                conn.set_room(Some(room_name.clone()));
            }
            respond(
                conns,
                broker,
                origin,
                MessageKind::ServerInfo,
                &format!("joined {}", room_name),
            );
        }
        "leave" => {
            if let Some(conn) = conns.get_mut(&origin) {
                conn.set_room(None);
            }
            respond(conns, broker, origin, MessageKind::ServerInfo, "left room");
        }
        "quit" => {
            respond_fin(conns, broker, origin, "bye");
        }
        _ => {
            respond(conns, broker, origin, MessageKind::ServerError, "unknown command");
        }
    }
}

/// Queue a single-frame reply on the active connection
fn respond(
    conns: &mut HashMap<RawFd, Connection>,
    broker: &mut MessageBroker,
    origin: RawFd,
    kind: MessageKind,
    text: &str,
) {
    let ops = Ops::new(kind, BroadcastWidth::Active).with_commit();
    enqueue_reply(conns, broker, origin, ops, text);
}

/// Like [`respond`] but marks the frame FIN so the connection closes after it
fn respond_fin(
    conns: &mut HashMap<RawFd, Connection>,
    broker: &mut MessageBroker,
    origin: RawFd,
    text: &str,
) {
    let ops = Ops::new(MessageKind::ServerInfo, BroadcastWidth::Active)
        .with_commit()
        .with_fin();
    enqueue_reply(conns, broker, origin, ops, text);
}

fn enqueue_reply(
    conns: &mut HashMap<RawFd, Connection>,
    broker: &mut MessageBroker,
    origin: RawFd,
    ops: Ops,
    text: &str,
) {
    match broker.post(ops, text, true) {
        Ok(Some(msg)) => {
            if let Some(conn) = conns.get_mut(&origin) {
                conn.enqueue(msg);
            }
        }
        Ok(None) => {}
        Err(e) => broker.log_error(format!("dropping reply: {}", e)),
    }
}
