//! Metriche di performance del load client
//!
//! Contatori atomici per successi/fallimenti/connessioni, latenze dei
//! messaggi completati, bucket di throughput da 10 secondi ed export CSV.

use crate::dtos::ChatMessage;
use chrono::Utc;
use dashmap::DashMap;
use std::io::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

const THROUGHPUT_BUCKET_MS: i64 = 10_000;

/// Un invio completato con successo.
#[derive(Debug, Clone)]
pub struct CompletedSend {
    pub room_id: i32,
    pub message_type: String,
    pub latency_ms: u64,
    pub completed_at_ms: i64,
    pub retries: u32,
}

#[derive(Default)]
pub struct PerformanceMetrics {
    success: AtomicU64,
    failed: AtomicU64,
    connections: AtomicU64,
    reconnections: AtomicU64,
    room_counts: DashMap<i32, u64>,
    type_counts: DashMap<String, u64>,
    throughput_buckets: DashMap<i64, u64>,
    completed: Mutex<Vec<CompletedSend>>,
    started_at_ms: AtomicI64,
    ended_at_ms: AtomicI64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, message: &ChatMessage, latency: Duration, retries: u32) {
        let completed_at_ms = Utc::now().timestamp_millis();
        self.success.fetch_add(1, Ordering::Relaxed);
        *self.room_counts.entry(message.room_id).or_insert(0) += 1;
        *self
            .type_counts
            .entry(message.message_type.clone())
            .or_insert(0) += 1;
        *self
            .throughput_buckets
            .entry(completed_at_ms / THROUGHPUT_BUCKET_MS)
            .or_insert(0) += 1;

        let record = CompletedSend {
            room_id: message.room_id,
            message_type: message.message_type.clone(),
            latency_ms: latency.as_millis() as u64,
            completed_at_ms,
            retries,
        };
        self.completed
            .lock()
            .expect("metrics lock poisoned")
            .push(record);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mark_started(&self) {
        self.started_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn mark_ended(&self) {
        self.ended_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn connection_count(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Report finale su log strutturato.
    pub fn print_report(&self) {
        let success = self.success_count();
        let failed = self.failed_count();
        let total = success + failed;
        let success_rate = if total > 0 {
            success as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        info!(
            total,
            success,
            failed,
            success_rate_pct = success_rate,
            connections = self.connections.load(Ordering::Relaxed),
            reconnections = self.reconnections.load(Ordering::Relaxed),
            "load test results"
        );

        let mut latencies: Vec<u64> = {
            let completed = self.completed.lock().expect("metrics lock poisoned");
            completed.iter().map(|c| c.latency_ms).collect()
        };
        if !latencies.is_empty() {
            latencies.sort_unstable();
            let mean = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
            info!(
                min_ms = latencies[0],
                mean_ms = mean,
                median_ms = percentile(&latencies, 50.0),
                p95_ms = percentile(&latencies, 95.0),
                p99_ms = percentile(&latencies, 99.0),
                max_ms = latencies[latencies.len() - 1],
                "latency statistics"
            );
        }

        let wall_ms =
            self.ended_at_ms.load(Ordering::Relaxed) - self.started_at_ms.load(Ordering::Relaxed);
        if wall_ms > 0 {
            info!(
                duration_secs = wall_ms as f64 / 1000.0,
                throughput_msg_s = success as f64 * 1000.0 / wall_ms as f64,
                "throughput"
            );
        }

        for entry in self.type_counts.iter() {
            info!(message_type = %entry.key(), count = *entry.value(), "per-type count");
        }
    }

    /// Esporta i messaggi completati, una riga per invio.
    pub fn write_csv(&self, path: &str) -> std::io::Result<()> {
        let completed = self.completed.lock().expect("metrics lock poisoned");
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "timestamp,messageType,latency,status,roomId,retries")?;
        for record in completed.iter() {
            writeln!(
                file,
                "{},{},{},OK,{},{}",
                record.completed_at_ms,
                record.message_type,
                record.latency_ms,
                record.room_id,
                record.retries
            )?;
        }
        info!(path, rows = completed.len(), "metrics written");
        Ok(())
    }
}

/// Percentile nearest-rank su una slice già ordinata.
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_nearest_rank() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&sorted, 50.0), 51);
        assert_eq!(percentile(&sorted, 95.0), 95);
        assert_eq!(percentile(&sorted, 99.0), 99);
        assert_eq!(percentile(&sorted, 100.0), 100);
    }

    #[test]
    fn test_percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 99.0), 0);
    }

    #[test]
    fn test_record_success_updates_all_views() {
        let metrics = PerformanceMetrics::new();
        let msg = ChatMessage {
            user_id: 1,
            username: "abc".to_string(),
            message: "hi".to_string(),
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            message_type: "TEXT".to_string(),
            room_id: 4,
        };

        metrics.record_success(&msg, Duration::from_millis(12), 1);
        metrics.record_failure();

        assert_eq!(metrics.success_count(), 1);
        assert_eq!(metrics.failed_count(), 1);
        assert_eq!(*metrics.room_counts.get(&4).unwrap(), 1);
        assert_eq!(*metrics.type_counts.get("TEXT").unwrap(), 1);
        assert_eq!(metrics.completed.lock().unwrap().len(), 1);
    }
}
