//! Pull-based executors over the plan tree.
//!
//! Every executor yields tuples one at a time through `next()`; pulling
//! from the root drains the whole pipeline. SeqScan keeps a cursor into
//! the shared table store, so mutating consumers must read through a
//! Collect barrier; mutating under an open scan is undefined.

use crate::expr::{evaluate, evaluate_predicate, Expr};
use crate::plan::Plan;
use crate::storage::MemTable;
use crate::value::{Schema, Tuple, Value};
use marrow_common::{MarrowError, Result};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// A tuple source supporting the iterator model.
pub trait Executor {
    /// Produces the next tuple, or None when exhausted.
    fn next(&mut self) -> Result<Option<Tuple>>;
}

/// Cursor over the rows of one table.
pub struct SeqScanExecutor {
    storage: Rc<RefCell<MemTable>>,
    table: String,
    cursor: usize,
}

impl SeqScanExecutor {
    pub fn new(storage: Rc<RefCell<MemTable>>, table: &str) -> Result<Self> {
        if !storage.borrow().has_table(table) {
            return Err(MarrowError::TableNotFound(table.to_string()));
        }
        Ok(Self {
            storage,
            table: table.to_string(),
            cursor: 0,
        })
    }
}

impl Executor for SeqScanExecutor {
    fn next(&mut self) -> Result<Option<Tuple>> {
        let storage = self.storage.borrow();
        let rows = storage
            .rows(&self.table)
            .ok_or_else(|| MarrowError::TableNotFound(self.table.clone()))?;
        if self.cursor >= rows.len() {
            return Ok(None);
        }
        let tuple = rows[self.cursor].clone();
        self.cursor += 1;
        Ok(Some(tuple))
    }
}

/// Passes through tuples satisfying a predicate.
pub struct FilterExecutor {
    child: Box<dyn Executor>,
    predicate: Expr,
    columns: Vec<String>,
}

impl FilterExecutor {
    pub fn new(child: Box<dyn Executor>, predicate: Expr, columns: Vec<String>) -> Self {
        Self {
            child,
            predicate,
            columns,
        }
    }
}

impl Executor for FilterExecutor {
    fn next(&mut self) -> Result<Option<Tuple>> {
        loop {
            let tuple = match self.child.next()? {
                Some(tuple) => tuple,
                None => return Ok(None),
            };
            if evaluate_predicate(&self.predicate, &tuple, &self.columns)? {
                return Ok(Some(tuple));
            }
        }
    }
}

/// Maps input tuples through a list of projection expressions.
pub struct ProjectExecutor {
    child: Box<dyn Executor>,
    projections: Vec<Expr>,
    columns: Vec<String>,
}

impl ProjectExecutor {
    pub fn new(child: Box<dyn Executor>, projections: Vec<Expr>, columns: Vec<String>) -> Self {
        Self {
            child,
            projections,
            columns,
        }
    }
}

impl Executor for ProjectExecutor {
    fn next(&mut self) -> Result<Option<Tuple>> {
        let tuple = match self.child.next()? {
            Some(tuple) => tuple,
            None => return Ok(None),
        };

        let mut output = Vec::with_capacity(self.projections.len());
        for projection in &self.projections {
            output.push(evaluate(projection, &tuple, &self.columns)?);
        }
        Ok(Some(output))
    }
}

/// Materialization barrier: drains its child fully at construction, then
/// replays the buffered rows. Decouples downstream consumers from cursors
/// into mutable storage.
pub struct CollectExecutor {
    rows: std::vec::IntoIter<Tuple>,
}

impl CollectExecutor {
    pub fn new(mut child: Box<dyn Executor>) -> Result<Self> {
        let mut rows = Vec::new();
        while let Some(tuple) = child.next()? {
            rows.push(tuple);
        }
        Ok(Self {
            rows: rows.into_iter(),
        })
    }
}

impl Executor for CollectExecutor {
    fn next(&mut self) -> Result<Option<Tuple>> {
        Ok(self.rows.next())
    }
}

/// Sorts the (materialized) input by a list of key expressions.
pub struct SortExecutor {
    rows: std::vec::IntoIter<Tuple>,
}

impl SortExecutor {
    pub fn new(
        mut child: Box<dyn Executor>,
        order_by: Vec<Expr>,
        columns: Vec<String>,
    ) -> Result<Self> {
        let mut keyed: Vec<(Vec<Value>, Tuple)> = Vec::new();
        while let Some(tuple) = child.next()? {
            let mut keys = Vec::with_capacity(order_by.len());
            for expr in &order_by {
                keys.push(evaluate(expr, &tuple, &columns)?);
            }
            keyed.push((keys, tuple));
        }

        keyed.sort_by(|(a, _), (b, _)| compare_key_lists(a, b));

        let rows: Vec<Tuple> = keyed.into_iter().map(|(_, tuple)| tuple).collect();
        Ok(Self {
            rows: rows.into_iter(),
        })
    }
}

fn compare_key_lists(a: &[Value], b: &[Value]) -> Ordering {
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        let ordering = match (lhs, rhs) {
            (Value::Int(x), Value::Int(y)) => x.cmp(y),
            (Value::Str(x), Value::Str(y)) => x.cmp(y),
            (Value::Int(_), Value::Str(_)) => Ordering::Less,
            (Value::Str(_), Value::Int(_)) => Ordering::Greater,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl Executor for SortExecutor {
    fn next(&mut self) -> Result<Option<Tuple>> {
        Ok(self.rows.next())
    }
}

/// Yields one literal row, then ends.
pub struct ValuesExecutor {
    values: Vec<Expr>,
    done: bool,
}

impl ValuesExecutor {
    pub fn new(values: Vec<Expr>) -> Self {
        Self {
            values,
            done: false,
        }
    }
}

impl Executor for ValuesExecutor {
    fn next(&mut self) -> Result<Option<Tuple>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut tuple = Vec::with_capacity(self.values.len());
        for expr in &self.values {
            tuple.push(evaluate(expr, &vec![], &[])?);
        }
        Ok(Some(tuple))
    }
}

/// Recursively builds the executor tree matching a plan tree.
pub fn build_executor(
    plan: &Plan,
    storage: &Rc<RefCell<MemTable>>,
    schema: &Schema,
) -> Result<Box<dyn Executor>> {
    match plan {
        Plan::SeqScan { table } => Ok(Box::new(SeqScanExecutor::new(storage.clone(), table)?)),
        Plan::Filter { predicate, source } => {
            let child = build_executor(source, storage, schema)?;
            let columns = resolve_columns(source, schema);
            Ok(Box::new(FilterExecutor::new(
                child,
                predicate.clone(),
                columns,
            )))
        }
        Plan::Project {
            projections,
            source,
        } => {
            let child = build_executor(source, storage, schema)?;
            let columns = resolve_columns(source, schema);
            Ok(Box::new(ProjectExecutor::new(
                child,
                projections.clone(),
                columns,
            )))
        }
        Plan::Collect { source } => {
            let child = build_executor(source, storage, schema)?;
            Ok(Box::new(CollectExecutor::new(child)?))
        }
        Plan::Sort { order_by, source } => {
            // Sorting consumes its whole input; the planner must have put a
            // Collect barrier underneath so no live cursor is held.
            if !matches!(**source, Plan::Collect { .. }) {
                return Err(MarrowError::PlanError(
                    "sort source must be materialized through a collect node".to_string(),
                ));
            }
            let child = build_executor(source, storage, schema)?;
            let columns = resolve_columns(source, schema);
            Ok(Box::new(SortExecutor::new(
                child,
                order_by.clone(),
                columns,
            )?))
        }
        Plan::Values { values } => Ok(Box::new(ValuesExecutor::new(values.clone()))),
        Plan::Insert { .. } | Plan::Update { .. } | Plan::Delete { .. } => Err(
            MarrowError::PlanError(format!("unsupported plan node: {}", plan.kind())),
        ),
    }
}

/// Column names of the base table a plan reads from; empty when there is
/// no base table.
fn resolve_columns(plan: &Plan, schema: &Schema) -> Vec<String> {
    plan.base_table()
        .and_then(|table| schema.get(table))
        .cloned()
        .unwrap_or_default()
}

/// Builds the executor tree for a plan and drains it into a tuple list.
pub fn execute_plan(
    plan: &Plan,
    storage: Rc<RefCell<MemTable>>,
    schema: &Schema,
) -> Result<Vec<Tuple>> {
    let mut root = build_executor(plan, &storage, schema)?;
    let mut results = Vec::new();
    while let Some(tuple) = root.next()? {
        results.push(tuple);
    }
    Ok(results)
}
