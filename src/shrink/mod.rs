//! Target resolution and the size-bounded strategy chain

mod chain;
mod target;

pub use chain::{pages_to_keep, truncate, ShrinkChain, ShrinkOutcome, Strategy, KEEP_PERCENTAGES};
pub use target::{SizeUnit, TargetSpec, TargetValue};
