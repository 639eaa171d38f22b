//! Partition manager - garantisce le partizioni mensili di `messages`
//!
//! La tabella è partizionata per `created_at`: all'avvio e poi una volta al
//! giorno vengono create, se mancano, la partizione del mese corrente e
//! quella del mese successivo.

use chrono::{Datelike, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};

const CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Crea (se mancano) le partizioni per il mese corrente e il successivo.
pub async fn ensure_partitions(pool: &PgPool) -> Result<(), sqlx::Error> {
    let now = Utc::now();
    let mut year = now.year();
    let mut month = now.month();

    for _ in 0..2 {
        let (from, to) = month_bounds(year, month);
        let partition = format!("messages_{:04}_{:02}", year, month);
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} PARTITION OF messages FOR VALUES FROM ('{}') TO ('{}')",
            partition, from, to
        );
        sqlx::query(&ddl).execute(pool).await?;
        info!(partition = %partition, from = %from, to = %to, "partition ensured");

        (year, month) = next_month(year, month);
    }

    Ok(())
}

/// Tick giornaliero; gli errori vengono loggati e ritentati al giro dopo.
pub async fn run_partition_manager(pool: PgPool) {
    let mut tick = tokio::time::interval(CHECK_INTERVAL);
    tick.tick().await; // l'avvio ha già fatto la prima ensure
    loop {
        tick.tick().await;
        if let Err(e) = ensure_partitions(&pool).await {
            warn!(error = %e, "partition check failed, will retry tomorrow");
        }
    }
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn month_bounds(year: i32, month: u32) -> (String, String) {
    let (next_year, next) = next_month(year, month);
    (
        format!("{:04}-{:02}-01", year, month),
        format!("{:04}-{:02}-01", next_year, next),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_bounds_mid_year() {
        let (from, to) = month_bounds(2025, 7);
        assert_eq!(from, "2025-07-01");
        assert_eq!(to, "2025-08-01");
    }

    #[test]
    fn test_month_bounds_december_rolls_over() {
        let (from, to) = month_bounds(2025, 12);
        assert_eq!(from, "2025-12-01");
        assert_eq!(to, "2026-01-01");
    }

    #[test]
    fn test_next_month() {
        assert_eq!(next_month(2025, 1), (2025, 2));
        assert_eq!(next_month(2025, 12), (2026, 1));
    }
}
