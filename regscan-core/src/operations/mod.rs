pub mod reconcile;

pub use reconcile::{
    BlobRecord, DEFAULT_LINK_FETCH_CONCURRENCY, ReconcileOperation, ReconcileOperationRequest,
    ReconcileOperationResult, ReconcileStats, ReconciliationResult, reconcile,
};
