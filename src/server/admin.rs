//! Administrator console
//!
//! Lines read from the server's stdin mutate the membership index. Every
//! command answers through the broker's local queue, which the reactor
//! prints after each event.
//!
//! Grammar:
//! ```text
//! :roommates add <name:passwd>...   | del <name>... | clear | show
//! :rooms     addmates <room> <name>... | delmates <room> <name>...
//! :status
//! :quit
//! ```

use crate::broker::MessageBroker;
use crate::config;
use crate::membership::MembershipIndex;
use crate::protocol::frame::{BroadcastWidth, MessageKind, Ops};

/// What the reactor should do after a console line
#[derive(Debug, PartialEq, Eq)]
pub enum AdminOutcome {
    Continue,
    Quit,
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

/// Apply one console line
pub fn handle_line(
    line: &str,
    index: &mut MembershipIndex,
    broker: &mut MessageBroker,
) -> AdminOutcome {
    let (command, rest) = split_word(line);
    match command {
        "" => {}
        ":quit" => {
            broker.log_info("shutting down");
            return AdminOutcome::Quit;
        }
        ":status" => status(index, broker),
        ":roommates" => roommates_command(rest, index, broker),
        ":rooms" => rooms_command(rest, index, broker),
        other => broker.log_error(format!("unknown admin command '{}'", other)),
    }
    AdminOutcome::Continue
}

fn roommates_command(rest: &str, index: &mut MembershipIndex, broker: &mut MessageBroker) {
    let (subcommand, args) = split_word(rest);
    match subcommand {
        "add" => {
            for obj in config::parse_objects(args) {
                match obj.ext {
                    Some(passwd) => {
                        index.roommate_upsert(&obj.name, &passwd);
                    }
                    None => broker.log_error(format!(
                        "roommate '{}' needs a password (name:passwd)",
                        obj.name
                    )),
                }
            }
        }
        "del" => {
            for obj in config::parse_objects(args) {
                index.roommate_remove(&obj.name);
            }
        }
        "clear" => index.roommate_clear(),
        "show" => status(index, broker),
        _ => broker.log_error("usage: :roommates add|del|clear|show ..."),
    }
}

fn rooms_command(rest: &str, index: &mut MembershipIndex, broker: &mut MessageBroker) {
    let (subcommand, rest) = split_word(rest);
    let (room, args) = split_word(rest);
    if room.is_empty() {
        broker.log_error("usage: :rooms addmates|delmates <room> <name>...");
        return;
    }
    let names: Vec<String> = config::parse_objects(args)
        .into_iter()
        .map(|obj| obj.name)
        .collect();
    match subcommand {
        "addmates" => index.room_add_mates(room, &names),
        "delmates" => index.room_remove_mates(room, &names),
        _ => broker.log_error("usage: :rooms addmates|delmates <room> <name>..."),
    }
}

/// Dump roommates and rooms as one multi-chunk local message
fn status(index: &MembershipIndex, broker: &mut MessageBroker) {
    let ops = Ops::new(MessageKind::LocalInfo, BroadcastWidth::Active);
    let _ = broker.append_fmt(ops, format_args!("roommates ({}):\n", index.roommate_count()));
    for mate in index.roommates() {
        let rooms: Vec<&str> = mate.rooms().collect();
        let _ = broker.append_fmt(
            ops,
            format_args!("  * {} (rooms: {})\n", mate.name(), rooms.join(", ")),
        );
    }
    let _ = broker.append_fmt(ops, format_args!("rooms ({}):\n", index.room_count()));
    for room in index.rooms() {
        let mates: Vec<&str> = room.mates().collect();
        let _ = broker.append_fmt(
            ops,
            format_args!(
                "  * {} (open: {}, mates: {})\n",
                room.name(),
                room.is_open(),
                mates.join(", ")
            ),
        );
    }
    let _ = broker.commit(false);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::MessageKind;

    fn local_text(broker: &mut MessageBroker) -> String {
        broker
            .drain_local()
            .map(|msg| String::from_utf8_lossy(msg.payload()).into_owned())
            .collect()
    }

    #[test]
    fn test_roommates_add_and_del() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();

        let outcome = handle_line(":roommates add alice:p1, bob:p2", &mut index, &mut broker);
        assert_eq!(outcome, AdminOutcome::Continue);
        assert_eq!(index.roommate_count(), 2);

        handle_line(":roommates del alice", &mut index, &mut broker);
        assert_eq!(index.roommate_count(), 1);
        assert!(index.roommate("bob").is_some());
    }

    #[test]
    fn test_roommates_add_without_password_reports_error() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();
        handle_line(":roommates add alice", &mut index, &mut broker);
        assert_eq!(index.roommate_count(), 0);
        let errors: Vec<_> = broker
            .drain_local()
            .filter(|m| m.kind() == MessageKind::LocalError)
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_rooms_addmates_and_delmates() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();
        handle_line(":roommates add alice:p1 bob:p2", &mut index, &mut broker);
        handle_line(":rooms addmates lobby alice bob", &mut index, &mut broker);
        let room = index.room("lobby").unwrap();
        assert!(room.has_mate("alice") && room.has_mate("bob"));

        handle_line(":rooms delmates lobby bob", &mut index, &mut broker);
        let room = index.room("lobby").unwrap();
        assert!(room.has_mate("alice") && !room.has_mate("bob"));
    }

    #[test]
    fn test_rooms_wildcard_opens_room() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();
        handle_line(":rooms addmates lobby *", &mut index, &mut broker);
        assert!(index.room("lobby").unwrap().is_open());
    }

    #[test]
    fn test_status_lists_entities() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();
        handle_line(":roommates add alice:p1", &mut index, &mut broker);
        handle_line(":rooms addmates lobby alice", &mut index, &mut broker);
        handle_line(":status", &mut index, &mut broker);
        let text = local_text(&mut broker);
        assert!(text.contains("roommates (1)"));
        assert!(text.contains("lobby"));
        assert!(text.contains("alice"));
    }

    #[test]
    fn test_quit_and_unknown_command() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();
        assert_eq!(
            handle_line(":quit", &mut index, &mut broker),
            AdminOutcome::Quit
        );
        handle_line(":frobnicate", &mut index, &mut broker);
        let text = local_text(&mut broker);
        assert!(text.contains("unknown admin command"));
    }

    #[test]
    fn test_blank_line_is_ignored() {
        let mut index = MembershipIndex::new();
        let mut broker = MessageBroker::new();
        assert_eq!(
            handle_line("   ", &mut index, &mut broker),
            AdminOutcome::Continue
        );
        assert!(!broker.has_local());
    }
}
