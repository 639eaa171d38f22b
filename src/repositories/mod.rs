//! Repositories - Accesso allo storage relazionale

pub mod message;
pub mod partitions;
pub mod traits;

pub use message::MessageRepository;
pub use partitions::{ensure_partitions, run_partition_manager};
pub use traits::MessageStore;
