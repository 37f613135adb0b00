// src/types.rs
use std::str::FromStr;

/// Operator commands read from stdin by `run`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunCommand {
    Start,
    Stop,
    Status,
    Quit,
}

impl FromStr for RunCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(RunCommand::Start),
            "stop" => Ok(RunCommand::Stop),
            "status" => Ok(RunCommand::Status),
            "quit" | "exit" => Ok(RunCommand::Quit),
            other => Err(format!(
                "unknown command '{other}' (expected start, stop, status or quit)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_loosely() {
        assert_eq!(" START \n".parse(), Ok(RunCommand::Start));
        assert_eq!("stop".parse(), Ok(RunCommand::Stop));
        assert_eq!("exit".parse(), Ok(RunCommand::Quit));
        assert!("pause".parse::<RunCommand>().is_err());
    }
}
