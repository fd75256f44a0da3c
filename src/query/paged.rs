use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::config::QueryConfig;
use crate::error::WorkflowError;
use crate::query::binding::{Binding, bind, normalize_field_name};
use crate::query::registry::{QueryRegistry, Queryable};
use crate::query::Query;

/// One page of transformed records plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: u64,
    pub current: usize,
    pub size: usize,
    pub records: Vec<T>,
}

type Transform<R, T> = Arc<dyn Fn(R) -> T + Send + Sync>;

/// Count, page and key lookups for one entity kind, driven by loosely typed filters.
pub struct PagedQueryService<R: Queryable, T = R> {
    registry: Arc<QueryRegistry>,
    transform: Transform<R, T>,
    max_page_size: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: Queryable> PagedQueryService<R, R> {
    pub fn new(registry: Arc<QueryRegistry>) -> Self {
        Self::with_transform(registry, |record| record)
    }
}

impl<R: Queryable, T> PagedQueryService<R, T> {
    pub fn with_transform(
        registry: Arc<QueryRegistry>,
        transform: impl Fn(R) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            registry,
            transform: Arc::new(transform),
            max_page_size: QueryConfig::default().max_page_size,
            _record: PhantomData,
        }
    }

    pub fn max_page_size(mut self, max_page_size: usize) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// A fresh query of this kind with every applicable filter field bound.
    pub fn bound_query<F>(&self, filter: &F) -> Result<Query<R::Criteria>, WorkflowError>
    where
        F: Serialize + ?Sized,
    {
        let factory = self.registry.supplier_for::<R>()?;
        let mut query = factory.create();
        let report = bind(query.criteria_mut(), factory.bindings(), filter);
        debug!(
            kind = %R::KIND,
            applied = ?report.applied,
            skipped = report.skipped.len(),
            "Bound filter to query"
        );
        Ok(query)
    }

    pub async fn count<F>(&self, filter: &F) -> Result<u64, WorkflowError>
    where
        F: Serialize + ?Sized,
    {
        let query = self.bound_query(filter)?;
        Ok(query.count().await?)
    }

    /// Records of page `page_number` (1-based); empty without a fetch when
    /// nothing matches.
    pub async fn page<F>(&self, filter: &F, page_number: usize, page_size: usize) -> Result<Vec<T>, WorkflowError>
    where
        F: Serialize + ?Sized,
    {
        Ok(self.page_with_total(filter, page_number, page_size).await?.records)
    }

    pub async fn page_with_total<F>(
        &self,
        filter: &F,
        page_number: usize,
        page_size: usize,
    ) -> Result<Page<T>, WorkflowError>
    where
        F: Serialize + ?Sized,
    {
        self.check_page(page_number, page_size)?;

        let total = self.count(filter).await?;
        let mut page = Page {
            total,
            current: page_number,
            size: page_size,
            records: Vec::new(),
        };
        if total == 0 {
            return Ok(page);
        }

        let offset = (page_number - 1).saturating_mul(page_size);
        let records = self.bound_query(filter)?.list_page(offset, page_size).await?;
        page.records = records.into_iter().map(|r| (self.transform)(r)).collect();
        Ok(page)
    }

    /// Looks a single record up through the one-argument binding named
    /// `key_field`, normalized the same way filter fields are. A missing
    /// binding is an integration mistake and fails loudly.
    pub async fn get_by_key<K>(&self, key: &K, key_field: &str) -> Result<T, WorkflowError>
    where
        K: Serialize + ?Sized,
    {
        let factory = self.registry.supplier_for::<R>()?;
        let not_found = || WorkflowError::KeyQueryMethodNotFound {
            kind: R::KIND,
            field: key_field.to_string(),
        };

        let key = serde_json::to_value(key).map_err(|_| not_found())?;
        let Some(Binding::Value(apply)) = factory.bindings().get(&normalize_field_name(key_field)) else {
            return Err(not_found());
        };

        let mut query = factory.create();
        apply(query.criteria_mut(), &key).map_err(|_| not_found())?;

        match query.single_result().await? {
            Some(record) => Ok((self.transform)(record)),
            None => Err(WorkflowError::RecordNotFound {
                kind: R::KIND,
                field: key_field.to_string(),
                key: render_key(&key),
            }),
        }
    }

    fn check_page(&self, page_number: usize, page_size: usize) -> Result<(), WorkflowError> {
        if page_number == 0 {
            return Err(WorkflowError::InvalidPage(
                "page number starts at 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > self.max_page_size {
            return Err(WorkflowError::InvalidPage(format!(
                "page size must be between 1 and {}, got {}",
                self.max_page_size, page_size
            )));
        }
        Ok(())
    }
}

fn render_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
