use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Identifier of a submitted process. Allocated from 1, never reused.
pub type ProcessId = u64;

/// Identifier of a live log viewer.
pub type SubscriberId = u64;

/// How a finished process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    /// The capability returned a failure; carries its text.
    Error(String),
    NotFound,
    Cancelled,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "ok"),
            Outcome::Error(msg) => write!(f, "error: {msg}"),
            Outcome::NotFound => write!(f, "not found"),
            Outcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Which processes a log viewer is interested in.
///
/// An empty id set is normalised to `All`, matching the operator surface
/// where "no ids" means "every process".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    Processes(BTreeSet<ProcessId>),
}

impl Selector {
    pub fn from_ids<I: IntoIterator<Item = ProcessId>>(ids: I) -> Self {
        let set: BTreeSet<ProcessId> = ids.into_iter().collect();
        if set.is_empty() {
            Selector::All
        } else {
            Selector::Processes(set)
        }
    }

    pub fn matches(&self, id: ProcessId) -> bool {
        match self {
            Selector::All => true,
            Selector::Processes(ids) => ids.contains(&id),
        }
    }
}

impl FromStr for Selector {
    type Err = String;

    /// Parse a comma separated id list, e.g. `"1,4,7"`. Empty means all.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ids = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let id = part
                .parse::<ProcessId>()
                .map_err(|_| format!("invalid process id: {part}"))?;
            ids.insert(id);
        }
        Ok(Selector::from_ids(ids))
    }
}

/// One chunk of output from one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub process_id: ProcessId,
    pub text: String,
}

/// Join a command name and its parameter the way they are displayed and
/// recorded in history: `name` or `name:param`.
pub fn command_line(name: &str, param: &str) -> String {
    if param.is_empty() {
        name.to_string()
    } else {
        format!("{name}:{param}")
    }
}

/// Split an operator command line at the first `:` into `(name, param)`.
pub fn split_command_line(line: &str) -> (&str, &str) {
    match line.split_once(':') {
        Some((name, param)) => (name.trim(), param),
        None => (line.trim(), ""),
    }
}
