// ============================================================================
// COLLECTION
// ============================================================================
// One collection pass over every configured source:
// - named services first, then raw directories
// - per-file values come from a pluggable FileMetricsDeriver
// - per-source failures are counted and aggregated, never propagated
// ============================================================================

mod cycle;
mod derive;

pub use cycle::{CollectionCycle, CycleResult, CycleRunner};
pub use derive::{FileEstimate, FileMetricsDeriver, Severity, SimulatedDeriver};
