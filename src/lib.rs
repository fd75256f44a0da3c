pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod workflow;

pub use config::TaskdeskConfig;
pub use engine::ProcessEngine;
pub use engine::memory::InMemoryEngine;
pub use error::{ErrorKind, WorkflowError};
pub use query::{EntityKind, Page, PagedQueryService, QueryRegistry};
pub use workflow::WorkflowService;
