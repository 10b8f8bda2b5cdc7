//! Transaction management.

use serde::{Deserialize, Serialize};

/// Transaction mode. Predictions and refinements run read-write; graph
/// lookups run read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// Transaction trait that all snapshot stores must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;

    fn is_read_only(&self) -> bool {
        self.mode() == TxMode::ReadOnly
    }
}
