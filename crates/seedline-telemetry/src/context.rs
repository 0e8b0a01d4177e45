//! Process-wide span helpers.

use tracing::{Span, span::Entered};

use crate::init::build_sha;

/// Guard that keeps the application-level span entered for the lifetime of the process.
pub struct GlobalContextGuard {
    _guard: Entered<'static>,
}

impl GlobalContextGuard {
    #[must_use]
    /// Enter the application-level tracing span for the lifetime of the guard.
    pub fn new(command: impl Into<String>) -> Self {
        let command = command.into();
        let span: &'static Span = Box::leak(Box::new(tracing::info_span!(
            "app",
            command = %command,
            build_sha = %build_sha(),
            api_url = tracing::field::Empty
        )));
        let guard = span.enter();
        Self { _guard: guard }
    }
}

/// Record the backend the process talks to on the active span.
pub fn record_api_url(url: &str) {
    Span::current().record("api_url", tracing::field::display(url));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_context_guard_records_fields() {
        let guard = GlobalContextGuard::new("ls");
        record_api_url("http://127.0.0.1:8000/api/");
        drop(guard);
    }
}
