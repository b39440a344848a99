//! Output abstraction for testable printing
//!
//! Command handlers write results through [`Output`] so tests can capture
//! them instead of reading stdout.

use serde::Serialize;

use crate::error::CliResult;

pub trait Output: Send + Sync {
    /// Print normal output
    fn print(&self, msg: &str) -> CliResult<()>;

    /// Print an error message
    fn error(&self, msg: &str) -> CliResult<()>;

    /// Print any serializable value as pretty JSON
    fn print_json<T: Serialize + ?Sized>(&self, data: &T) -> CliResult<()>
    where
        Self: Sized,
    {
        self.print(&serde_json::to_string_pretty(data)?)
    }
}

/// Standard console output: results on stdout, errors on stderr
pub struct ConsoleOutput;

impl Output for ConsoleOutput {
    fn print(&self, msg: &str) -> CliResult<()> {
        println!("{}", msg);
        Ok(())
    }

    fn error(&self, msg: &str) -> CliResult<()> {
        eprintln!("error: {}", msg);
        Ok(())
    }
}
