//! Server configuration and the command-line object grammar
//!
//! Option values use one small grammar throughout: objects separated by
//! whitespace, `,` or `;`, each split on the first `:` into a name and an
//! optional extension (`alice:p1,bob:p2` or `lobby:*`). Zero-length names
//! are rejected here, at the parsing boundary.

use std::net::{IpAddr, SocketAddr};

use crate::error::{CastError, Result};

/// One parsed `name[:ext]` object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfgObject {
    /// Part before the first `:`
    pub name: String,
    /// Part after the first `:`, if any
    pub ext: Option<String>,
}

fn is_outer_delim(c: char) -> bool {
    c.is_whitespace() || c == ',' || c == ';'
}

/// Parse an object list; empty tokens are skipped
pub fn parse_objects(input: &str) -> Vec<CfgObject> {
    input
        .split(is_outer_delim)
        .filter(|tok| !tok.is_empty())
        .map(|tok| match tok.split_once(':') {
            Some((name, ext)) => CfgObject {
                name: name.to_string(),
                ext: (!ext.is_empty()).then(|| ext.to_string()),
            },
            None => CfgObject {
                name: tok.to_string(),
                ext: None,
            },
        })
        .filter(|obj| !obj.name.is_empty())
        .collect()
}

/// Parse a single `name:ext` pair where both parts are required
pub fn parse_pair(input: &str, what: &str) -> Result<(String, String)> {
    let objects = parse_objects(input);
    match objects.into_iter().next() {
        Some(CfgObject {
            name,
            ext: Some(ext),
        }) => Ok((name, ext)),
        _ => Err(CastError::config(format!(
            "{} must have the form name:value, got '{}'",
            what, input
        ))),
    }
}

/// Parse a `host:port` listen endpoint
pub fn parse_endpoint(input: &str) -> Result<SocketAddr> {
    let (host, port) = parse_pair(input, "endpoint")?;
    let ip: IpAddr = host
        .parse()
        .map_err(|_| CastError::config(format!("invalid listen address '{}'", host)))?;
    let port: u16 = port
        .parse()
        .map_err(|_| CastError::config(format!("invalid listen port '{}'", port)))?;
    if port == 0 {
        return Err(CastError::config("listen port must be non-zero"));
    }
    Ok(SocketAddr::new(ip, port))
}

/// Server configuration assembled from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Administrator login name
    pub admin_name: String,
    /// Administrator password
    pub admin_passwd: String,
    /// Preset roommates as `(name, password)` pairs
    pub roommates: Vec<(String, String)>,
    /// Preset memberships as `(room, mate-or-wildcard)` pairs
    pub room_mates: Vec<(String, String)>,
}

impl ServerConfig {
    /// Build a configuration from command-line arguments (program name
    /// already stripped); `Ok(None)` means help was requested
    pub fn from_args<I>(args: I) -> Result<Option<Self>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut server = None;
        let mut admin = None;
        let mut mate_lists = Vec::new();
        let mut room_lists = Vec::new();

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value_of = |opt: &str| {
                args.next()
                    .ok_or_else(|| CastError::config(format!("{} requires a value", opt)))
            };
            match arg.as_str() {
                "--server" | "-s" => server = Some(value_of("--server")?),
                "--admin" | "-a" => admin = Some(value_of("--admin")?),
                "--roommates" | "-m" => mate_lists.push(value_of("--roommates")?),
                "--rooms" | "-R" => room_lists.push(value_of("--rooms")?),
                "--help" | "-h" => return Ok(None),
                other => {
                    return Err(CastError::config(format!(
                        "unexpected argument '{}'",
                        other
                    )))
                }
            }
        }

        let server =
            server.ok_or_else(|| CastError::config("--server host:port must be set"))?;
        let admin =
            admin.ok_or_else(|| CastError::config("--admin name:password must be set"))?;

        let bind_addr = parse_endpoint(&server)?;
        let (admin_name, admin_passwd) = parse_pair(&admin, "--admin")?;

        let mut roommates = Vec::new();
        for list in &mate_lists {
            for obj in parse_objects(list) {
                let ext = obj.ext.ok_or_else(|| {
                    CastError::config(format!(
                        "roommate '{}' is missing a password (name:password)",
                        obj.name
                    ))
                })?;
                roommates.push((obj.name, ext));
            }
        }

        let mut room_mates = Vec::new();
        for list in &room_lists {
            for obj in parse_objects(list) {
                let ext = obj.ext.ok_or_else(|| {
                    CastError::config(format!(
                        "room entry '{}' is missing a mate (room:mate or room:*)",
                        obj.name
                    ))
                })?;
                room_mates.push((obj.name, ext));
            }
        }

        Ok(Some(ServerConfig {
            bind_addr,
            admin_name,
            admin_passwd,
            roommates,
            room_mates,
        }))
    }
}
