//! Per-call options.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{HeraldError, Result};

/// Options applied to one publish or subscribe call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    /// Wait for the backend to acknowledge each item.
    pub sync: bool,
    /// Bound on each item's backend call.
    pub timeout: Option<Duration>,
}

/// A function that adjusts [`Options`].
pub type OptionFn = Arc<dyn Fn(&mut Options) -> Result<()> + Send + Sync>;

impl Options {
    /// Fold option functions over the defaults, stopping at the first error.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an option function, or a validation
    /// error if the resulting options are inconsistent.
    pub fn from_fns(fns: &[OptionFn]) -> Result<Self> {
        let mut options = Self::default();
        for apply in fns {
            apply(&mut options)?;
        }
        options.validate()?;
        Ok(options)
    }

    /// Check the options are consistent.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a zero timeout.
    pub fn validate(&self) -> Result<()> {
        if self.timeout == Some(Duration::ZERO) {
            return Err(HeraldError::validation("timeout must be positive"));
        }
        Ok(())
    }
}

/// Request synchronous (acknowledged) delivery.
#[must_use]
pub fn with_sync(sync: bool) -> OptionFn {
    Arc::new(move |o: &mut Options| -> Result<()> {
        o.sync = sync;
        Ok(())
    })
}

/// Bound each item's backend call by `timeout`.
#[must_use]
pub fn with_timeout(timeout: Duration) -> OptionFn {
    Arc::new(move |o: &mut Options| -> Result<()> {
        if timeout.is_zero() {
            return Err(HeraldError::validation("timeout must be positive"));
        }
        o.timeout = Some(timeout);
        Ok(())
    })
}
