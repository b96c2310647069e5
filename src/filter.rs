//! Stateful per-frame filters.

mod cluster;

pub use cluster::{Cluster, Epog, StabilizationConfig, StabilizationFilter};

/// A filter consuming a stream of values of type `V`.
pub trait Filter<V> {
    /// The filter's per-value result.
    type Output;

    /// Adds a new value to the filter, returning the filtered result.
    fn push(&mut self, value: V) -> Self::Output;

    /// Resets the accumulated history and state of the filter to be identical to the state just
    /// after construction.
    fn reset(&mut self);
}
