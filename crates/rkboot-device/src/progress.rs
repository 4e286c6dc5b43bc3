/// Rendering capability for long-running flash operations.
///
/// One bar is active at a time: `begin` opens it, `advance` moves the
/// absolute position, `finish` closes it. The CLI backs this with
/// indicatif; the core and tests use [`NoProgress`].
pub trait Progress {
    fn begin(&mut self, label: &str, total: u64);
    fn advance(&mut self, position: u64);
    fn finish(&mut self);
}

/// No-op reporter.
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&mut self, _label: &str, _total: u64) {}
    fn advance(&mut self, _position: u64) {}
    fn finish(&mut self) {}
}
