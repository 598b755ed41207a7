//! Listening port checks done before the server is spawned.

use std::io;
use std::net::TcpListener;

/// The wildcard address cannot be probed for an existing listener, loopback is used instead.
pub fn probe_host(host: &str) -> &str {
    if host == "0.0.0.0" { "127.0.0.1" } else { host }
}

/// Returns true if binding `host:port` fails because the address is taken.
/// The probe socket is closed before returning.
pub fn is_port_in_use(host: &str, port: u16) -> bool {
    let host = probe_host(host);
    match TcpListener::bind((host, port)) {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => true,
        Err(e) => {
            // e.g. EACCES on a privileged port; the runtime will report it itself
            debug!("could not probe {host}:{port}: {e}");
            false
        }
    }
}

/// Best-effort description of whoever listens on `port`, e.g. `python3 (PID 123)`.
pub fn describe_owner(port: u16) -> Option<String> {
    match owner_listing(port) {
        Ok(output) => parse_owner(&output, port),
        Err(e) => {
            debug!("Error checking process on port {port}: {e}");
            None
        }
    }
}

#[cfg(unix)]
fn owner_listing(port: u16) -> io::Result<String> {
    duct::cmd!("lsof", "-i", format!(":{port}"))
        .stderr_null()
        .unchecked()
        .read()
}

#[cfg(windows)]
fn owner_listing(_port: u16) -> io::Result<String> {
    duct::cmd!("netstat", "-ano")
        .stderr_null()
        .unchecked()
        .read()
}

#[cfg(unix)]
fn parse_owner(output: &str, _port: u16) -> Option<String> {
    parse_lsof(output)
}

#[cfg(windows)]
fn parse_owner(output: &str, port: u16) -> Option<String> {
    parse_netstat(output, port)
}

/// Parses `lsof -i :<port>` output: a header line, then `COMMAND PID USER ...` rows.
#[cfg_attr(windows, allow(dead_code))]
fn parse_lsof(output: &str) -> Option<String> {
    let owners: Vec<String> = output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let command = parts.next()?;
            let pid = parts.next()?;
            Some(format!("{command} (PID {pid})"))
        })
        .collect();
    if owners.is_empty() {
        None
    } else {
        Some(owners.join(", "))
    }
}

/// Parses `netstat -ano` output, picking the first LISTENING row bound to `port`.
#[cfg_attr(unix, allow(dead_code))]
fn parse_netstat(output: &str, port: u16) -> Option<String> {
    let needle = format!(":{port}");
    output
        .lines()
        .filter(|line| line.contains("LISTENING"))
        .find(|line| {
            line.split_whitespace()
                .nth(1)
                .is_some_and(|local| local.ends_with(&needle))
        })
        .and_then(|line| line.split_whitespace().last())
        .map(|pid| format!("PID {pid}"))
}
