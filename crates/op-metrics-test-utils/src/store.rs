//! In-memory host resource.
//!
//! `MemoryStore` is a tiny table store whose operations all run through an
//! [`OperationPipeline`], the way a data-access library runs statements
//! through its callback chain. Install instrumentation once, then share the
//! store (e.g. in an `Arc`) across threads.

use op_metrics::errors::OpMetricsError;
use op_metrics::operation::OperationError;
use op_metrics::{ActionKind, Instrumentation, InvocationContext, Operation, OperationPipeline};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: u64,
    pub fields: BTreeMap<String, String>,
}

impl Row {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    RecordNotFound,

    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("operation aborted: {0}")]
    Aborted(String),
}

type Tables = HashMap<String, Vec<Row>>;

/// Table store executing every operation through a hook pipeline.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
    pipeline: OperationPipeline,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with `instrumentation` installed on its pipeline.
    pub fn instrumented(instrumentation: &Instrumentation) -> Self {
        let mut store = Self::new();
        store
            .instrument(instrumentation)
            .expect("instrumentation should install on a fresh store");
        store
    }

    /// Install instrumentation hooks.
    pub fn instrument(&mut self, instrumentation: &Instrumentation) -> Result<(), OpMetricsError> {
        instrumentation.install(&mut self.pipeline)
    }

    pub fn pipeline(&self) -> &OperationPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut OperationPipeline {
        &mut self.pipeline
    }

    /// Create an empty table (not instrumented).
    pub fn migrate(&self, table: &str) {
        self.tables
            .write()
            .expect("store lock poisoned")
            .entry(table.to_string())
            .or_default();
    }

    /// Insert a row and return its id.
    pub fn create(
        &self,
        ctx: &InvocationContext,
        table: &str,
        fields: &[(&str, &str)],
    ) -> Result<u64, StoreError> {
        let fields: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        self.run(ActionKind::Create, ctx, table, &[], |tables| {
            let rows = table_mut(tables, table)?;
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            rows.push(Row { id, fields });
            Ok(id)
        })
    }

    /// First row (lowest id) of a table, optionally joined with relations.
    pub fn first(
        &self,
        ctx: &InvocationContext,
        table: &str,
        joins: &[&str],
    ) -> Result<Row, StoreError> {
        self.run(ActionKind::Query, ctx, table, joins, |tables| {
            for relation in joins {
                table_mut(tables, relation)?;
            }
            table_mut(tables, table)?
                .iter()
                .min_by_key(|r| r.id)
                .cloned()
                .ok_or(StoreError::RecordNotFound)
        })
    }

    /// All rows of a table.
    pub fn find(
        &self,
        ctx: &InvocationContext,
        table: &str,
        joins: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        self.run(ActionKind::Query, ctx, table, joins, |tables| {
            for relation in joins {
                table_mut(tables, relation)?;
            }
            Ok(table_mut(tables, table)?.clone())
        })
    }

    /// Set one field of a row.
    pub fn update(
        &self,
        ctx: &InvocationContext,
        table: &str,
        id: u64,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.run(ActionKind::Update, ctx, table, &[], |tables| {
            let row = table_mut(tables, table)?
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or(StoreError::RecordNotFound)?;
            row.fields.insert(field.to_string(), value.to_string());
            Ok(())
        })
    }

    /// Remove a row.
    pub fn delete(&self, ctx: &InvocationContext, table: &str, id: u64) -> Result<(), StoreError> {
        self.run(ActionKind::Delete, ctx, table, &[], |tables| {
            let rows = table_mut(tables, table)?;
            let before = rows.len();
            rows.retain(|r| r.id != id);
            if rows.len() == before {
                return Err(StoreError::RecordNotFound);
            }
            Ok(())
        })
    }

    /// Number of rows in a table.
    pub fn count(&self, ctx: &InvocationContext, table: &str) -> Result<usize, StoreError> {
        self.run(ActionKind::Row, ctx, table, &[], |tables| {
            Ok(table_mut(tables, table)?.len())
        })
    }

    /// Execute a raw statement. Only `TRUNCATE <table>` is understood.
    ///
    /// Raw statements carry no target, so they are labeled with the
    /// unknown model.
    pub fn raw(&self, ctx: &InvocationContext, statement: &str) -> Result<(), StoreError> {
        self.run(ActionKind::Raw, ctx, "", &[], |tables| {
            let mut words = statement.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some(verb), Some(table), None) if verb.eq_ignore_ascii_case("truncate") => {
                    table_mut(tables, table)?.clear();
                    Ok(())
                }
                _ => Err(StoreError::UnsupportedStatement(statement.to_string())),
            }
        })
    }

    fn run<T, F>(
        &self,
        action: ActionKind,
        ctx: &InvocationContext,
        table: &str,
        joins: &[&str],
        work: F,
    ) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<T, StoreError>,
    {
        let mut operation = Operation::new(ctx.clone(), table);
        operation.joins = joins.iter().map(|j| (*j).to_string()).collect();

        let mut output = None;
        self.pipeline.execute(action, &mut operation, |_| {
            let mut tables = self.tables.write().expect("store lock poisoned");
            output = Some(work(&mut tables)?);
            Ok(())
        });

        match (operation.take_error(), output) {
            (Some(e), _) => Err(into_store_error(e)),
            (None, Some(value)) => Ok(value),
            (None, None) => Err(StoreError::Aborted("work did not run".to_string())),
        }
    }
}

fn table_mut<'a>(tables: &'a mut Tables, table: &str) -> Result<&'a mut Vec<Row>, StoreError> {
    tables
        .get_mut(table)
        .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))
}

fn into_store_error(e: OperationError) -> StoreError {
    match e.downcast::<StoreError>() {
        Ok(store_error) => *store_error,
        Err(other) => StoreError::Aborted(other.to_string()),
    }
}
