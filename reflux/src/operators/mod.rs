//! Operators wrapping one or more upstream publishers

pub(crate) mod concat;
pub(crate) mod filter;
pub(crate) mod flat_map;
pub(crate) mod map;
pub(crate) mod peek;
pub(crate) mod take;

pub use flat_map::DEFAULT_PREFETCH;
