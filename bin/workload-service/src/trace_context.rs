//! Per-request trace identifiers.

use rand::{
    distr::{Distribution, StandardUniform},
    Rng,
};

/// Identifiers for the span tree of a single request.
#[derive(Clone, Copy, Debug)]
pub struct TraceContext {
    /// The 128-bit trace ID, shared by every span of the request.
    pub trace_id: u128,

    /// The 64-bit span ID for the current span.
    pub span_id: u64,

    /// The parent span ID (None for the request's root span).
    pub parent_span_id: Option<u64>,
}

impl TraceContext {
    /// Creates a new root trace context.
    pub fn new_root(rng: &mut impl Rng) -> Self {
        Self {
            trace_id: random_non_zero(rng),
            span_id: random_non_zero(rng),
            parent_span_id: None,
        }
    }

    /// Creates a child context from this context.
    ///
    /// The child shares the trace ID, and has a new span ID with this context's span ID as its parent.
    pub fn child(&self, rng: &mut impl Rng) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: random_non_zero(rng),
            parent_span_id: Some(self.span_id),
        }
    }

    /// Returns the trace ID as 32 lowercase hexadecimal digits.
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Returns the span ID as 16 lowercase hexadecimal digits.
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }

    /// Returns the parent span ID as 16 lowercase hexadecimal digits, if there is one.
    pub fn parent_span_id_hex(&self) -> Option<String> {
        self.parent_span_id.map(|id| format!("{:016x}", id))
    }
}

/// Draws a random identifier. All-zero identifiers are invalid, so zero is never returned.
fn random_non_zero<T>(rng: &mut impl Rng) -> T
where
    StandardUniform: Distribution<T>,
    T: Default + PartialEq,
{
    loop {
        let value = rng.random::<T>();
        if value != T::default() {
            return value;
        }
    }
}
