//! Observability for the Voice Controller.
//!
//! Health endpoints for Kubernetes probes, plus Prometheus metrics.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit safe-field
//! allow-listing. Metric labels are bounded to prevent cardinality
//! explosion:
//! - `actor_type`: 2 values (controller, call)
//! - `operation`: bounded by the actor message enums (~14 values)
//! - `event`: bounded by the signal vocabulary (10 values)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `vc_sessions_active` | Gauge | none | Current live call sessions |
//! | `vc_participants_active` | Gauge | none | Participants across live sessions |
//! | `vc_actor_mailbox_depth` | Gauge | `actor_type` | Backpressure indicator per actor type |
//! | `vc_operation_duration_seconds` | Histogram | `operation` | Call operation processing latency |
//! | `vc_signals_published_total` | Counter | `event` | Signal events fanned out to rooms |
//! | `vc_sessions_expired_total` | Counter | none | Pending calls expired unanswered |
//! | `vc_actor_panics_total` | Counter | `actor_type` | Actor panics (alert on any) |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_actor_panic, record_operation_duration,
    record_session_expired, record_signal_published, set_actor_mailbox_depth,
    set_participants_active, set_sessions_active,
};
