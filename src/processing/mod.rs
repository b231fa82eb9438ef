//! Production-data processing
//!
//! Router -> queue -> pipeline (rate calculator, record builder, store).

pub mod pipeline;
pub mod rate;
pub mod record;
pub mod router;

pub use pipeline::{PipelineOutcome, ProductionPipeline};
pub use rate::{compute_rate, Baseline, RateCalculator, RateState};
pub use record::build_record;
pub use router::{DispatchOutcome, TopicRouter};
