use crate::errors::DashError;
use std::io::Write;

pub trait Terminal: Send + Sync {
    fn stdin_is_tty(&self) -> bool;
    fn write_line(&self, line: &str) -> Result<(), DashError>;
    fn draw(&self, frame: &str) -> Result<(), DashError>;
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn stdin_is_tty(&self) -> bool {
        std::io::IsTerminal::is_terminal(&std::io::stdin())
    }

    fn write_line(&self, line: &str) -> Result<(), DashError> {
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| DashError::Io(e.to_string()))
    }

    fn draw(&self, frame: &str) -> Result<(), DashError> {
        use crossterm::{cursor, terminal, QueueableCommand};
        let mut out = std::io::stdout();
        out.queue(terminal::Clear(terminal::ClearType::All))
            .map_err(|e| DashError::Io(e.to_string()))?;
        out.queue(cursor::MoveTo(0, 0))
            .map_err(|e| DashError::Io(e.to_string()))?;
        write!(out, "{frame}").map_err(|e| DashError::Io(e.to_string()))?;
        out.flush().map_err(|e| DashError::Io(e.to_string()))
    }
}
