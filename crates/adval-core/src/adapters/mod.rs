//! Provider adapters.
//!
//! Each adapter wraps one external verification service and normalizes
//! its proprietary response into [`crate::NormalizedResult`]. Adapters
//! never raise to their caller: every failure mode resolves into a
//! result that is either a confident rejection or service-unavailable.

mod google;
mod smarty;
mod usps;

pub use google::GoogleAdapter;
pub use smarty::{SmartyAdapter, SmartyCredentials};
pub use usps::{UspsAdapter, UspsCredentials};

use std::time::Instant;

pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Weighted 0-100 confidence heuristic shared by the adapters.
///
/// Only the shape (0-100, higher = more certain) is part of the contract;
/// the weights are internal.
pub(crate) fn confidence_score(
    delivery_confirmed: bool,
    has_zip4: bool,
    secondary_confirmed: bool,
    no_unconfirmed_components: bool,
) -> u8 {
    let mut score = 0u8;
    if delivery_confirmed {
        score += 55;
    }
    if has_zip4 {
        score += 20;
    }
    if secondary_confirmed {
        score += 10;
    }
    if no_unconfirmed_components {
        score += 15;
    }
    score.min(100)
}
