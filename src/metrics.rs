use tracing::trace;

// Trace-level metric events; the Prometheus recorder in main serves /metrics.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "hermes.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn step_elapsed(step: &'static str, elapsed_ms: u128) {
    trace!(
        target = "hermes.metrics",
        step = step,
        elapsed_ms = elapsed_ms as u64,
        "step_elapsed"
    );
}

pub fn step_fallback(step: &'static str) {
    trace!(target = "hermes.metrics", step = step, "step_fallback_total_inc");
}

pub fn generation_finished(status: &'static str, elapsed_ms: u64) {
    trace!(
        target = "hermes.metrics",
        status = status,
        elapsed_ms = elapsed_ms,
        "generation_finished"
    );
}
