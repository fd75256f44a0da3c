pub mod model;
pub mod resolver;
pub mod service;

pub use model::{CandidateSource, StartProcessModel, TaskCompleteModel, WorkflowContext};
pub use resolver::{GroupCandidateResolver, PassthroughCandidateResolver, TaskCandidateResolver};
pub use service::{AssignmentFailure, AssignmentOutcome, AssignmentReport, CompleteOutcome, WorkflowService};
