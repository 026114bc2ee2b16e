pub mod average;
pub mod quality;
pub mod stabilize;

pub use average::{average_burst, AverageError};
pub use quality::{QualityAssessor, QualityReport};
pub use stabilize::{AbortReason, GateEvent, GatePhase, StabilizationGate};
