use crate::error::Result;

/// Progress and cancellation channel owned by the caller's worker
/// thread.
///
/// The pipeline consults `check_cancelled` before the download starts,
/// after every copied chunk, and before the artifact rename. Returning
/// `Error::Cancelled` unwinds the session; temp files are removed on
/// the way out.
pub trait ProgressIndicator {
    fn set_text(&self, _text: &str) {}

    /// Bytes written over total, in `0.0..=1.0`. Not called when the
    /// total length is unknown.
    fn fraction(&self, _fraction: f64) {}

    fn check_cancelled(&self) -> Result<()> {
        Ok(())
    }
}

/// Indicator for hosts that do not surface progress.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressIndicator for SilentProgress {}
