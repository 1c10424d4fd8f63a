//! Cooperative cancellation for long stage sequences

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a signal handler raises to stop a running sequence
///
/// Clones share the flag. Sequences call [`StopSignal::check`] before every
/// stage move, so a request takes effect at the next move rather than after
/// the whole scan.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// `Err(Error::Interrupted)` once a stop has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_requested() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_request() {
        let stop = StopSignal::new();
        let handler = stop.clone();
        assert!(stop.check().is_ok());

        handler.request();
        assert!(stop.is_requested());
        assert!(matches!(stop.check(), Err(Error::Interrupted)));
    }
}
