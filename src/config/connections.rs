//! Connection-file parsing (§6).
//!
//! The connection file is a flat, human-editable text file: one
//! connection descriptor per line, comma-separated, `#`-comments and
//! blank lines ignored. Exactly one line must carry `target_flag=yes`;
//! that line is the single consolidated target, everything else is a
//! source branch.

use crate::error::{Error, Result};
use std::path::Path;

/// One parsed connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub server: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub is_target: bool,
}

const DEFAULT_PORT: u16 = 1433;

/// Parse the connection-file contents into a list of descriptors.
///
/// Malformed lines (wrong field count, unparseable port) are skipped
/// with a warning rather than aborting the whole file — an operator
/// typo in one branch's line should not take every other branch down.
#[must_use]
pub fn parse_connections(contents: &str) -> Vec<ConnectionConfig> {
    let mut parsed = Vec::new();
    for (line_num, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(cfg) => parsed.push(cfg),
            None => {
                tracing::warn!(line = line_num + 1, content = line, "skipping malformed connection line");
            }
        }
    }
    tracing::info!(count = parsed.len(), "loaded connection configurations");
    parsed
}

fn parse_line(line: &str) -> Option<ConnectionConfig> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    let (server, port, database, username, password, target_flag) = match parts.as_slice() {
        [server, database, username, password, target_flag] => {
            (*server, DEFAULT_PORT, *database, *username, *password, *target_flag)
        }
        [server, port, database, username, password, target_flag] => {
            let port: u16 = port.parse().ok()?;
            (*server, port, *database, *username, *password, *target_flag)
        }
        _ => return None,
    };

    if server.is_empty() || database.is_empty() {
        return None;
    }

    Some(ConnectionConfig {
        server: server.to_string(),
        port,
        database: database.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        is_target: target_flag.eq_ignore_ascii_case("yes"),
    })
}

/// Load and parse a connection file from disk.
///
/// # Errors
///
/// Returns [`Error::ConnectionFileMissing`] if the file does not exist.
pub fn load_connections(path: &Path) -> Result<Vec<ConnectionConfig>> {
    if !path.exists() {
        return Err(Error::ConnectionFileMissing { path: path.to_path_buf() });
    }
    let contents = std::fs::read_to_string(path)?;
    Ok(parse_connections(&contents))
}

/// Split a loaded connection list into `(target, sources)`.
///
/// # Errors
///
/// Returns [`Error::NoTargetConnection`] if no line carries
/// `target_flag=yes`, or [`Error::NoSourceConnections`] if the
/// remaining list is empty.
pub fn partition_target(
    path: &Path,
    configs: Vec<ConnectionConfig>,
) -> Result<(ConnectionConfig, Vec<ConnectionConfig>)> {
    let mut target = None;
    let mut sources = Vec::new();
    for cfg in configs {
        if cfg.is_target && target.is_none() {
            target = Some(cfg);
        } else {
            sources.push(cfg);
        }
    }
    let target = target.ok_or_else(|| Error::NoTargetConnection { path: path.to_path_buf() })?;
    if sources.is_empty() {
        return Err(Error::NoSourceConnections { path: path.to_path_buf() });
    }
    Ok((target, sources))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_five_field_lines_with_default_port() {
        let parsed = parse_connections("srv1,branch_a,user,pass,no\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].port, DEFAULT_PORT);
        assert!(!parsed[0].is_target);
    }

    #[test]
    fn parses_six_field_lines_with_explicit_port() {
        let parsed = parse_connections("srv1,1434,branch_a,user,pass,YES\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].port, 1434);
        assert!(parsed[0].is_target);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let parsed = parse_connections("# a comment\n\n   \nsrv1,branch_a,user,pass,no\n");
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn skips_malformed_lines_without_aborting_the_file() {
        let parsed = parse_connections("srv1,only,three\nsrv2,branch_b,user,pass,yes\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].database, "branch_b");
    }

    #[test]
    fn target_flag_is_case_insensitive() {
        let parsed = parse_connections("srv1,branch_a,user,pass,Yes\n");
        assert!(parsed[0].is_target);
    }

    #[test]
    fn partition_separates_target_from_sources() {
        let configs = parse_connections(
            "tgt,target_db,u,p,yes\nsrc1,branch_a,u,p,no\nsrc2,branch_b,u,p,no\n",
        );
        let (target, sources) = partition_target(Path::new("conn.txt"), configs).unwrap();
        assert_eq!(target.database, "target_db");
        assert_eq!(sources.len(), 2);
    }

    #[test]
    fn partition_errors_without_a_target() {
        let configs = parse_connections("src1,branch_a,u,p,no\n");
        let err = partition_target(Path::new("conn.txt"), configs).unwrap_err();
        assert!(matches!(err, Error::NoTargetConnection { .. }));
    }

    #[test]
    fn partition_errors_without_sources() {
        let configs = parse_connections("tgt,target_db,u,p,yes\n");
        let err = partition_target(Path::new("conn.txt"), configs).unwrap_err();
        assert!(matches!(err, Error::NoSourceConnections { .. }));
    }
}
