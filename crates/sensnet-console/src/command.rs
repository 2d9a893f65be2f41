//! Operator commands

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A command typed at the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the node's loops
    Start,
    /// Stop the node's loops
    Stop,
    /// Print node diagnostics
    Status,
    /// Stop the node and leave the console
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command '{0}' (expected START, STOP, STATUS or EXIT)")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(Command::Start),
            "STOP" => Ok(Command::Stop),
            "STATUS" => Ok(Command::Status),
            "EXIT" | "QUIT" => Ok(Command::Exit),
            _ => Err(UnknownCommand(s.trim().to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Start => "START",
            Command::Stop => "STOP",
            Command::Status => "STATUS",
            Command::Exit => "EXIT",
        };
        f.write_str(name)
    }
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line: &str) -> Option<Result<Command, UnknownCommand>> {
    if line.trim().is_empty() {
        None
    } else {
        Some(line.parse())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!("start".parse(), Ok(Command::Start));
        assert_eq!("  Stop \n".parse(), Ok(Command::Stop));
        assert_eq!("STATUS".parse(), Ok(Command::Status));
        assert_eq!("quit".parse(), Ok(Command::Exit));
        assert_eq!("Exit".parse(), Ok(Command::Exit));
    }

    #[test]
    fn test_unknown_and_blank_lines() {
        assert_eq!(
            parse_line("launch"),
            Some(Err(UnknownCommand("launch".to_string())))
        );
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line(""), None);
    }
}
