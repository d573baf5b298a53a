// src/db/monitoring.rs

use log::{debug, error};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::future::Future;
use std::time::Instant;

/// Количество операций хранилища (успешных и нет) по типу операции.
pub static STORE_OPERATION_COUNTER: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "store_operation_total",
        "Total number of store operations executed",
        &["operation"]
    )
    .expect("Failed to create STORE_OPERATION_COUNTER")
});

pub static STORE_OPERATION_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "store_operation_errors_total",
        "Number of store operations that returned an error",
        &["operation"]
    )
    .expect("Failed to create STORE_OPERATION_ERRORS")
});

pub static STORE_OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "store_operation_duration_seconds",
        "Duration of store operations in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to create STORE_OPERATION_DURATION")
});

/// Обёртка над операцией хранилища: считает вызовы, ошибки и длительность.
pub async fn measure_store_operation<F, T, E>(operation: &str, f: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let start = Instant::now();
    let result = f.await;
    let secs = start.elapsed().as_secs_f64();

    STORE_OPERATION_COUNTER.with_label_values(&[operation]).inc();
    STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(secs);
    if result.is_err() {
        STORE_OPERATION_ERRORS.with_label_values(&[operation]).inc();
    }

    debug!("store operation {} took {:.4} seconds", operation, secs);
    result
}

/// Метрики в текстовом формате Prometheus.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_measure_counts_errors() {
        let ok: Result<u8, String> = measure_store_operation("test_ok", async { Ok(1) }).await;
        assert_eq!(ok, Ok(1));
        let err: Result<u8, String> =
            measure_store_operation("test_err", async { Err("boom".to_string()) }).await;
        assert!(err.is_err());

        assert_eq!(STORE_OPERATION_ERRORS.with_label_values(&["test_err"]).get(), 1);
        assert_eq!(STORE_OPERATION_ERRORS.with_label_values(&["test_ok"]).get(), 0);
        assert!(gather_metrics().contains("store_operation_total"));
    }
}
