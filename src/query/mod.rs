pub mod binding;
pub mod criteria;
pub mod paged;
pub mod registry;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::fmt::Debug;

use crate::engine::ProcessEngine;

pub use binding::{BindError, BindReport, Binding, QueryBindings, bind};
pub use criteria::{
    HistoricActivityCriteria, HistoricTaskCriteria, ProcessDefinitionCriteria, TaskCriteria,
};
pub use paged::{Page, PagedQueryService};
pub use registry::{EntityKind, QueryFactory, QueryRegistry, Queryable};

/// Offset/limit slice requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

/// A predicate set the engine knows how to count and list.
#[async_trait]
pub trait Criteria: Clone + Default + Debug + Send + Sync + 'static {
    type Record: Clone + Debug + Send + Sync + 'static;

    async fn count(&self, engine: &ProcessEngine) -> Result<u64>;

    async fn list(&self, engine: &ProcessEngine, window: Option<PageWindow>) -> Result<Vec<Self::Record>>;
}

/// Stateful query builder bound to an engine.
///
/// Every terminal operation takes `self`, so a query executes at most once;
/// count and page fetch each need a freshly built query.
#[derive(Clone)]
pub struct Query<C: Criteria> {
    engine: ProcessEngine,
    criteria: C,
}

impl<C: Criteria> Query<C> {
    pub fn new(engine: ProcessEngine) -> Self {
        Self {
            engine,
            criteria: C::default(),
        }
    }

    pub fn criteria(&self) -> &C {
        &self.criteria
    }

    pub fn criteria_mut(&mut self) -> &mut C {
        &mut self.criteria
    }

    /// Chains predicate methods on the underlying criteria.
    pub fn filter(mut self, f: impl FnOnce(C) -> C) -> Self {
        self.criteria = f(self.criteria);
        self
    }

    pub async fn count(self) -> Result<u64> {
        self.criteria.count(&self.engine).await
    }

    pub async fn list(self) -> Result<Vec<C::Record>> {
        self.criteria.list(&self.engine, None).await
    }

    pub async fn list_page(self, offset: usize, limit: usize) -> Result<Vec<C::Record>> {
        self.criteria
            .list(&self.engine, Some(PageWindow { offset, limit }))
            .await
    }

    /// Fails when more than one record matches.
    pub async fn single_result(self) -> Result<Option<C::Record>> {
        let mut records = self
            .criteria
            .list(&self.engine, Some(PageWindow { offset: 0, limit: 2 }))
            .await?;
        if records.len() > 1 {
            return Err(anyhow!(
                "Query returned more than one result for {:?}",
                self.criteria
            ));
        }
        Ok(records.pop())
    }
}
