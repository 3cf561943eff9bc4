//! Per-minibatch training statistics

/// Statistics recorded after every minibatch optimization step
///
/// Buffered between telemetry flushes and reported as histograms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    /// Global L2 norm of the gradient before clipping
    pub grad_norm: f64,

    /// Policy loss term
    pub policy_loss: f64,

    /// Value loss term
    pub value_loss: f64,
}
