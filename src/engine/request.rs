// src/engine/request.rs

//! Operator line parsing. Pure functions, no engine state.

use std::fmt;

use crate::types::{ProcessId, Selector, SubscriberId, split_command_line};

/// Number of entries `history` prints when no limit is given.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorRequest {
    Run { name: String, param: String },
    Cancel(ProcessId),
    Close(ProcessId),
    Tail(Selector),
    Untail(SubscriberId),
    Status,
    List,
    History(usize),
    Reload,
    Help,
    Quit,
    /// Blank line.
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
commands:
  run <name>[:param]   start a command
  cancel <id>          cancel a running process
  close <id>           discard a finished process
  tail [id,id,...]     follow output (no ids: every process)
  untail <viewer>      stop following
  status               running and finished processes
  list                 available command names
  history [n]          recently submitted commands
  reload               reload command formulas
  quit                 exit";

pub fn parse_request(line: &str) -> Result<OperatorRequest, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(OperatorRequest::Nothing);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    match verb {
        "run" => {
            let (name, param) = split_command_line(rest);
            if name.is_empty() {
                return Err(ParseError("usage: run <name>[:param]".into()));
            }
            Ok(OperatorRequest::Run {
                name: name.to_string(),
                param: param.to_string(),
            })
        }
        "cancel" => parse_id(rest, "cancel <id>").map(OperatorRequest::Cancel),
        "close" => parse_id(rest, "close <id>").map(OperatorRequest::Close),
        "tail" => rest
            .parse::<Selector>()
            .map(OperatorRequest::Tail)
            .map_err(ParseError),
        "untail" => parse_id(rest, "untail <viewer>").map(OperatorRequest::Untail),
        "history" if rest.is_empty() => Ok(OperatorRequest::History(DEFAULT_HISTORY_LIMIT)),
        "history" => rest
            .parse::<usize>()
            .map(OperatorRequest::History)
            .map_err(|_| ParseError("usage: history [n]".into())),
        "status" | "list" | "reload" | "help" | "quit" | "exit" if !rest.is_empty() => {
            Err(ParseError(format!("'{verb}' takes no arguments")))
        }
        "status" => Ok(OperatorRequest::Status),
        "list" => Ok(OperatorRequest::List),
        "reload" => Ok(OperatorRequest::Reload),
        "help" => Ok(OperatorRequest::Help),
        "quit" | "exit" => Ok(OperatorRequest::Quit),
        other => Err(ParseError(format!("unknown command '{other}' (try 'help')"))),
    }
}

fn parse_id(raw: &str, usage: &str) -> Result<u64, ParseError> {
    raw.parse::<u64>()
        .map_err(|_| ParseError(format!("usage: {usage}")))
}
