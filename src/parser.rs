//! Line-oriented command and host list loading
//!
//! Each non-blank line of a list file is one entry. Trailing carriage
//! returns are stripped so CRLF files behave like LF files.
//!
//! Loading is permissive: a list that cannot be read is reported once and
//! treated as empty, and an invalid entry is reported and skipped. An empty
//! list simply yields an empty cross-product.

use crate::error::{FleetError, Result};
use crate::models::{Command, Host};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, error, warn};

/// Read the non-blank lines of `path`.
///
/// # Errors
///
/// * `FleetError::InputSource` - If the file cannot be opened or read
///
/// # Example
///
/// ```no_run
/// use fleetrun::parser::read_lines;
///
/// let hosts = read_lines("hosts.txt")?;
/// println!("{} hosts", hosts.len());
/// # Ok::<(), fleetrun::error::FleetError>(())
/// ```
pub fn read_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let input_error = |source: std::io::Error| FleetError::InputSource {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(input_error)?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(input_error)?;
        let line = line.trim_end_matches('\r');
        if !line.trim().is_empty() {
            lines.push(line.to_string());
        }
    }

    debug!("Read {} lines from {:?}", lines.len(), path);
    Ok(lines)
}

/// Load the command list, reporting problems instead of failing.
pub fn load_commands<P: AsRef<Path>>(path: P) -> Vec<Command> {
    load_list(path.as_ref(), "command", |line| Command::new(line))
}

/// Load the host list, reporting problems instead of failing.
pub fn load_hosts<P: AsRef<Path>>(path: P) -> Vec<Host> {
    load_list(path.as_ref(), "host", |line| Host::new(line))
}

fn load_list<T>(path: &Path, kind: &str, parse: impl Fn(String) -> Result<T>) -> Vec<T> {
    let lines = match read_lines(path) {
        Ok(lines) => lines,
        Err(e) => {
            error!("{}", e);
            return Vec::new();
        }
    };

    lines
        .into_iter()
        .enumerate()
        .filter_map(|(index, line)| match parse(line) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping {} on line {} of {:?}: {}", kind, index + 1, path, e);
                None
            }
        })
        .collect()
}
