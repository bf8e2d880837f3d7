//! Query plan tree.
//!
//! One enum case per node kind; the executor factory dispatches by matching
//! on the tag. The planner that produces these trees lives outside this
//! crate, but its one load-bearing convention is honored here: a Collect
//! node (materialization barrier) must sit between a cursor-based source
//! and any consumer that would otherwise observe cursor invalidation.

use crate::expr::Expr;

/// A node in the query plan tree.
#[derive(Debug, Clone)]
pub enum Plan {
    /// Sequential scan over a named table.
    SeqScan { table: String },
    /// Predicate over a child plan.
    Filter { predicate: Expr, source: Box<Plan> },
    /// Expression projection over a child plan.
    Project {
        projections: Vec<Expr>,
        source: Box<Plan>,
    },
    /// Ordered output; requires a materialized source.
    Sort {
        order_by: Vec<Expr>,
        source: Box<Plan>,
    },
    /// Row insertion (not executable in this pipeline).
    Insert {
        table: String,
        columns: Vec<String>,
        source: Box<Plan>,
    },
    /// Row update (not executable in this pipeline).
    Update {
        table: String,
        assignments: Vec<(String, Expr)>,
        source: Box<Plan>,
    },
    /// Row deletion (not executable in this pipeline).
    Delete { table: String, source: Box<Plan> },
    /// Materialization barrier: drains its source fully before yielding.
    Collect { source: Box<Plan> },
    /// A single literal row.
    Values { values: Vec<Expr> },
}

impl Plan {
    /// Node kind name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Plan::SeqScan { .. } => "SeqScan",
            Plan::Filter { .. } => "Filter",
            Plan::Project { .. } => "Project",
            Plan::Sort { .. } => "Sort",
            Plan::Insert { .. } => "Insert",
            Plan::Update { .. } => "Update",
            Plan::Delete { .. } => "Delete",
            Plan::Collect { .. } => "Collect",
            Plan::Values { .. } => "Values",
        }
    }

    /// Walks down to the base table this plan reads from, if any.
    ///
    /// Column names for expression evaluation resolve against this table.
    pub fn base_table(&self) -> Option<&str> {
        match self {
            Plan::SeqScan { table } => Some(table),
            Plan::Filter { source, .. }
            | Plan::Project { source, .. }
            | Plan::Sort { source, .. }
            | Plan::Collect { source } => source.base_table(),
            Plan::Insert { .. } | Plan::Update { .. } | Plan::Delete { .. } => None,
            Plan::Values { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, Expr};

    #[test]
    fn test_base_table_walks_through_wrappers() {
        let plan = Plan::Project {
            projections: vec![Expr::ident("name")],
            source: Box::new(Plan::Sort {
                order_by: vec![Expr::ident("name")],
                source: Box::new(Plan::Collect {
                    source: Box::new(Plan::Filter {
                        predicate: Expr::binary(
                            BinaryOp::Gt,
                            Expr::ident("age"),
                            Expr::Number(18),
                        ),
                        source: Box::new(Plan::SeqScan {
                            table: "users".to_string(),
                        }),
                    }),
                }),
            }),
        };

        assert_eq!(plan.base_table(), Some("users"));
    }

    #[test]
    fn test_base_table_absent_for_values() {
        let plan = Plan::Values {
            values: vec![Expr::Number(1)],
        };
        assert_eq!(plan.base_table(), None);
    }

    #[test]
    fn test_kind_names() {
        let scan = Plan::SeqScan {
            table: "t".to_string(),
        };
        assert_eq!(scan.kind(), "SeqScan");
        assert_eq!(
            Plan::Collect {
                source: Box::new(scan)
            }
            .kind(),
            "Collect"
        );
    }
}
