//! Stage progress on the console
//!
//! Each stage runs inside a tracing span. The indicatif layer installed in
//! `main` draws a spinner for the active span and keeps log lines above it.

use std::cell::RefCell;

use indicatif::ProgressStyle;
use pideploy_core::Error;
use pideploy_core::pipeline::{Stage, StageReporter};
use tracing::span::EnteredSpan;
use tracing_indicatif::span_ext::IndicatifSpanExt;

/// Spinner per stage, one summary line when it ends
pub struct ConsoleReporter {
    style: ProgressStyle,
    active: RefCell<Option<EnteredSpan>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        let style = ProgressStyle::with_template("{spinner:.yellow} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        Self {
            style,
            active: RefCell::new(None),
        }
    }

    fn end_span(&self) {
        self.active.borrow_mut().take();
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl StageReporter for ConsoleReporter {
    fn started(&self, stage: Stage) {
        self.end_span();

        let span = tracing::info_span!("stage", stage = stage.name());
        span.pb_set_style(&self.style);
        span.pb_set_message(&format!("{}...", stage));
        *self.active.borrow_mut() = Some(span.entered());
    }

    fn finished(&self, stage: Stage) {
        self.end_span();
        tracing::info!("✓ {}", stage);
    }

    fn failed(&self, stage: Stage, error: &Error) {
        self.end_span();
        tracing::error!("✗ {}: {}", stage, error);
    }

    fn tolerated(&self, stage: Stage, error: &Error) {
        self.end_span();
        tracing::warn!("! {} (continuing): {}", stage, error);
    }
}

impl Drop for ConsoleReporter {
    fn drop(&mut self) {
        // Clear a spinner left behind by an interrupted run
        self.end_span();
    }
}
