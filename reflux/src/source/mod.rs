//! Factory sources

pub(crate) mod empty;
pub(crate) mod interval;
pub(crate) mod iter;

pub use empty::ErrorTiming;
