pub mod outlet_flow;
pub mod topic_tracking;

pub use outlet_flow::{FlowOutcome, OutletFlow};
