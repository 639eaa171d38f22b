//! Interfacce dei repository
//!
//! Lo storage è un collaboratore esterno: la pipeline di scrittura consuma
//! solo questa interfaccia di batch-insert, così i writer restano
//! verificabili senza un database vivo.

use crate::dtos::QueuedMessage;
use std::future::Future;

/// Interfaccia di batch-insert consumata dal writer asincrono.
pub trait MessageStore: Send + Sync {
    /// Inserisce un batch in un'unica istruzione. Ritorna quante righe sono
    /// state scritte davvero: i conflitti su `(message_id, created_at)`
    /// sono no-op e non contano.
    fn batch_insert(
        &self,
        batch: &[QueuedMessage],
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}
