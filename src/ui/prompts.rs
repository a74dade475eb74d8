//! ui::prompts
//!
//! Interactive prompts and confirmations.
//!
//! # Design
//!
//! Prompts are only shown in interactive mode. In non-interactive mode,
//! operations requiring user input must either have defaults or fail
//! with a clear error message.

use std::io::{BufRead, Write};

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt cancelled by user")]
    Cancelled,

    #[error("not in interactive mode")]
    NotInteractive,

    #[error("IO error: {0}")]
    IoError(String),
}

/// Prompt for confirmation (yes/no) on stdin.
///
/// Returns `Ok(true)` if the user confirms, `Ok(false)` if they decline.
/// An empty answer takes `default`. End of input cancels.
pub fn confirm(message: &str, default: bool, interactive: bool) -> Result<bool, PromptError> {
    if !interactive {
        return Err(PromptError::NotInteractive);
    }
    let stdin = std::io::stdin();
    confirm_from(&mut stdin.lock(), &mut std::io::stderr(), message, default)
}

fn confirm_from(
    input: &mut impl BufRead,
    output: &mut impl Write,
    message: &str,
    default: bool,
) -> Result<bool, PromptError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        write!(output, "{message} {hint} ")
            .and_then(|_| output.flush())
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        let mut line = String::new();
        let read = input
            .read_line(&mut line)
            .map_err(|e| PromptError::IoError(e.to_string()))?;
        if read == 0 {
            return Err(PromptError::Cancelled);
        }

        match parse_answer(&line) {
            Some(answer) => return Ok(answer),
            None if line.trim().is_empty() => return Ok(default),
            None => {
                writeln!(output, "please answer y or n")
                    .map_err(|e| PromptError::IoError(e.to_string()))?;
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<bool> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ask(input: &str, default: bool) -> Result<bool, PromptError> {
        let mut out = Vec::new();
        confirm_from(&mut Cursor::new(input), &mut out, "continue?", default)
    }

    #[test]
    fn answers() {
        assert!(ask("y\n", false).unwrap());
        assert!(ask("YES\n", false).unwrap());
        assert!(!ask("n\n", true).unwrap());
    }

    #[test]
    fn empty_takes_default() {
        assert!(ask("\n", true).unwrap());
        assert!(!ask("\n", false).unwrap());
    }

    #[test]
    fn reasks_on_garbage() {
        assert!(ask("maybe\ny\n", false).unwrap());
    }

    #[test]
    fn eof_cancels() {
        assert!(matches!(ask("", true), Err(PromptError::Cancelled)));
    }

    #[test]
    fn non_interactive_refuses() {
        assert!(matches!(
            confirm("continue?", true, false),
            Err(PromptError::NotInteractive)
        ));
    }
}
