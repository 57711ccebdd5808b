//! Internal helpers shared by the components

use faultline_common::lifecycle::LifecycleState;
use faultline_domain::{FaultlineError, Result};

/// Fail with `NotInitialized` unless `state` is running
pub(crate) fn require_running(state: &LifecycleState, component: &str) -> Result<()> {
    if state.is_running() {
        Ok(())
    } else {
        Err(FaultlineError::not_initialized(component))
    }
}
