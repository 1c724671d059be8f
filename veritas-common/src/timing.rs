//! Stage-latency instrumentation macros.

/// Measures execution time of a synchronous block and logs it via
/// `tracing::info!` as `operation`/`elapsed_ms`. Returns the block's value.
#[macro_export]
macro_rules! measure_time {
    ($label:expr, $block:block) => {{
        let __start = std::time::Instant::now();
        let __result = $block;
        let __elapsed = __start.elapsed();
        ::tracing::info!(
            operation = $label,
            elapsed_ms = __elapsed.as_millis() as u64,
            "operation completed"
        );
        __result
    }};
}

/// Async counterpart to [`measure_time`].
#[macro_export]
macro_rules! measure_time_async {
    ($label:expr, $block:expr) => {{
        let __start = std::time::Instant::now();
        let __result = $block.await;
        let __elapsed = __start.elapsed();
        ::tracing::info!(
            operation = $label,
            elapsed_ms = __elapsed.as_millis() as u64,
            "operation completed"
        );
        __result
    }};
}
