//! Content-based court classification: signal extraction, then scoring.

pub mod classifier;
pub mod signals;

pub use classifier::*;
pub use signals::*;

use crate::config::RouterSettings;
use crate::models::{Classification, CourtRegistry};

/// Score every enabled court for one file and classify the result.
pub fn route(
    input: &SignalInput<'_>,
    registry: &CourtRegistry,
    settings: &RouterSettings,
) -> Classification {
    let signals = extract_signals(input, registry.all().map(|c| c.as_ref()), settings);
    classify(signals, registry, settings)
}
