/// Classification for retry policy.
///
/// Used by the upstream client to decide whether a failed attempt may be
/// repeated.
///
/// | Class | Retried? | Typical source |
/// |-------|----------|----------------|
/// | `Never` | No | guard rejections, 4xx, malformed bodies |
/// | `WithBackoff` | Yes, until the attempt cap | timeouts, resets, 5xx, 429 |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the request is deterministically rejected.
    Never,

    /// Retry after an exponentially growing delay.
    ///
    /// An upstream `Retry-After` hint replaces the computed delay.
    WithBackoff,
}
