//! Rate Limiting
//!
//! Two distinct mechanisms, deliberately not unified:
//!
//! - [`SlidingWindowLimiter`] counts events in a continuously rolling
//!   interval, so a client cannot bank `2×max` events by straddling a
//!   fixed-window edge. The prune/count/insert/expire steps run as one
//!   atomic store operation.
//! - [`DailyQuota`] is a plain counter that resets at a fixed UTC
//!   midnight boundary, for quotas shown to users as "N left today".
//!
//! A backing-store outage surfaces as `LimiterUnavailable`; it is never
//! silently folded into allowed or denied. The cast path fails closed,
//! read-only quota display may fail open, by configuration.

pub(crate) mod daily;
mod sliding;

pub use daily::{DailyQuota, QuotaStatus};
pub use sliding::{LimiterDecision, SlidingWindowLimiter};
