//! Command implementations.
//!
//! Each command returns the text to print; `main` owns stdout.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;

use std::io::{BufRead, Write};

use bamazon_client::ClientError;
use thiserror::Error;

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// Any client failure, shown with its user-facing message.
    #[error("{}", .0.user_message())]
    Client(#[from] ClientError),

    /// Terminal input could not be read.
    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),

    /// The flow cannot continue from here (e.g., not logged in).
    #[error("{0}")]
    Redirect(String),
}

/// Ask a question on stderr and read one line from stdin.
pub(crate) fn prompt_line(prompt: &str) -> Result<String, std::io::Error> {
    let mut stderr = std::io::stderr().lock();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Interactive yes/no confirmation. Anything but `y`/`yes` declines.
pub(crate) fn confirm_on_terminal(prompt: &str) -> bool {
    match prompt_line(&format!("{prompt} [y/N] ")) {
        Ok(answer) => is_yes(&answer),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read confirmation, declining");
            false
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_explicit_yes_confirms() {
        assert!(is_yes("y"));
        assert!(is_yes(" YES "));
        assert!(!is_yes(""));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_client_errors_show_user_message() {
        let err = CliError::from(ClientError::Rejected {
            status: 400,
            message: Some("Only pending orders can be cancelled".to_string()),
        });
        assert_eq!(err.to_string(), "Only pending orders can be cancelled");
    }
}
