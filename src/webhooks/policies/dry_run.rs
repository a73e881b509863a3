//! Dry-run policy.
//!
//! Dry-run admission calls never persist anything, so forwarding them would
//! report changes that did not happen.

use super::{DropReason, FilterContext, FilterResult};

/// Drop dry-run requests
pub fn evaluate(ctx: &FilterContext<'_>) -> FilterResult {
    if ctx.fields.dry_run {
        return FilterResult::dropped(DropReason::DryRun);
    }
    FilterResult::forward()
}
