//! # Engine Transport Seam
//!
//! The conversion core never talks to the analysis engine directly; it
//! consumes this trait. Implementations (COM bridge, TCP proxy, file
//! replayer, test doubles) live in the app layer.
//!
//! The core treats the transport as opaque: it never interprets the
//! transport's session or connection state, and it never blocks on
//! transport I/O inside cache or resolver critical sections.

use crate::types::StrataError;

/// Access to the third-party analysis engine's command interface.
///
/// Implementors must map their failures into
/// [`StrataError::Transport`].
pub trait EngineTransport {
    /// Fetch the raw record lines for the given wire keywords.
    fn get_records(&mut self, keywords: &[&str]) -> Result<Vec<String>, StrataError>;

    /// Execute one command line against the engine.
    fn execute(&mut self, line: &str) -> Result<(), StrataError>;

    /// Release the engine connection.
    fn close(&mut self) -> Result<(), StrataError>;
}
