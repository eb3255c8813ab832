//! Styled status lines on stderr.

use console::{Style, Term};

/// Writes user-facing status lines, styled per severity.
///
/// Everything goes to stderr so stdout stays free for piped data, and
/// `console` drops the styling automatically when stderr is not a
/// terminal.
pub(crate) struct Output {
    term: Term,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    fn styled(&self, style: &Style, msg: &str) {
        let _ = self.term.write_line(&style.apply_to(msg).to_string());
    }

    /// Plain informational line.
    pub(crate) fn info(&self, msg: &str) {
        let _ = self.term.write_line(msg);
    }

    pub(crate) fn success(&self, msg: &str) {
        self.styled(&Style::new().green(), msg);
    }

    pub(crate) fn warning(&self, msg: &str) {
        self.styled(&Style::new().yellow(), msg);
    }

    pub(crate) fn error(&self, msg: &str) {
        self.styled(&Style::new().red(), msg);
    }

    /// Emphasized heading line.
    pub(crate) fn highlight(&self, msg: &str) {
        self.styled(&Style::new().cyan().bold(), msg);
    }
}
