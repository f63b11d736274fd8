use super::diagnostic::{Diagnostic, SourceLocation};
use super::severity::Severity;

/// Maximum number of diagnostics of each severity the sink will accept
/// before silently dropping further ones (spec.md #7).
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticLimits {
    pub max_errors: u32,
    pub max_warnings: u32,
}

impl Default for DiagnosticLimits {
    fn default() -> Self {
        // DungeonSpells's original msgout.cpp defaults to a generous cap;
        // we mirror "generous but finite" rather than unlimited so a
        // pathological input can't grow the diagnostic list unboundedly.
        DiagnosticLimits { max_errors: 200, max_warnings: 200 }
    }
}

/// Accumulates [`Diagnostic`] records, enforcing the severity maxima and
/// the delayed/flush protocol from spec.md #7.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    limits_errors: u32,
    limits_warnings: u32,
    error_count: u32,
    warning_count: u32,
    diagnostics: Vec<Diagnostic>,
    delayed: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new(limits: DiagnosticLimits) -> Self {
        DiagnosticSink {
            limits_errors: limits.max_errors,
            limits_warnings: limits.max_warnings,
            error_count: 0,
            warning_count: 0,
            diagnostics: Vec::new(),
            delayed: Vec::new(),
        }
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn all(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Report a diagnostic immediately. Dropped silently once the relevant
    /// severity counter has hit its configured maximum, unless `force` is
    /// set.
    pub fn report(&mut self, diag: Diagnostic, force: bool) {
        if !self.flush_delayed_into(None) {
            // no-op; flush_delayed_into always succeeds, kept explicit for
            // readability at the call site below
        }
        self.accept(diag, force);
    }

    /// Report a diagnostic and attach `location` to it and to any
    /// currently-queued delayed diagnostics before accepting it
    /// (spec.md #7 "the next print operation flushes queued messages,
    /// attaching them to the current location context").
    pub fn report_at(&mut self, mut diag: Diagnostic, location: SourceLocation, force: bool) {
        self.flush_delayed_into(Some(location.clone()));
        diag.location = Some(location);
        self.accept(diag, force);
    }

    /// Queue a diagnostic discovered at a point lacking good source
    /// location (spec.md #7 `delay(params)`).
    pub fn delay(&mut self, diag: Diagnostic) {
        self.delayed.push(diag);
    }

    fn flush_delayed_into(&mut self, location: Option<SourceLocation>) -> bool {
        if self.delayed.is_empty() {
            return true;
        }
        let queued = std::mem::take(&mut self.delayed);
        for mut d in queued {
            if let Some(loc) = &location {
                d.location = Some(loc.clone());
            }
            self.accept(d, false);
        }
        true
    }

    fn accept(&mut self, diag: Diagnostic, force: bool) {
        let (count, limit) = match diag.severity {
            Severity::Error => (&mut self.error_count, self.limits_errors),
            Severity::Warning => (&mut self.warning_count, self.limits_warnings),
        };
        if !force && *count >= limit {
            return;
        }
        *count += 1;
        match diag.severity {
            Severity::Error => log::error!("{diag}"),
            Severity::Warning => log::warn!("{diag}"),
        }
        self.diagnostics.push(diag);
    }
}
