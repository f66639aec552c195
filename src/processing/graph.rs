//! Computation graph behind [`super::Frame`].
//!
//! Nodes are polars expressions, stored in creation order so a node's parent always has a
//! smaller id. A pass turns the nodes the pending actions depend on into one lazy query over the
//! source frame:
//!
//! - a define becomes a column, null on rows its branch filtered out
//! - a filter becomes a boolean mask column, `parent mask & predicate`
//!
//! The collected masks and columns are then folded into the booked actions chunk by chunk.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use polars::prelude::*;

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{self, DataSet, Value};

use super::histogram::{Hist1D, Hist3D, HistModel1D, HistModel3D};
use super::report::{CutFlowReport, CutInfo};

pub(crate) type NodeId = usize;

pub(crate) const SOURCE: NodeId = 0;

const PREDICATE_CHECK: &str = "__predicate";

fn mask_name(node: NodeId) -> String {
    format!("__mask_{node}")
}

enum NodeKind {
    Source,
    Define { column: String, expr: Expr },
    Filter { name: String, predicate: Expr },
}

struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
    /// Zero-row frame holding exactly the columns visible at this node.
    scope: LazyFrame,
    schema: SchemaRef,
}

pub(crate) enum ActionKind {
    Count,
    Histo1D { model: HistModel1D, x: String },
    Histo3D { model: HistModel3D, axes: [String; 3] },
    Snapshot { columns: Vec<String> },
    Report,
}

struct Action {
    node: NodeId,
    kind: ActionKind,
}

/// Materialized result of one booked action.
#[derive(Debug, Clone)]
pub enum ActionOutput {
    Count(u64),
    Hist1D(Hist1D),
    Hist3D(Hist3D),
    Snapshot(DataSet),
    Report(CutFlowReport),
}

pub(crate) struct Graph {
    nodes: Vec<Node>,
    defined: Vec<String>,
    actions: Vec<Action>,
    results: Vec<Option<ActionOutput>>,
}

impl Graph {
    pub(crate) fn new(source: &DataFrame) -> AnalysisResult<Self> {
        let mut scope = source.clear().lazy();
        let schema = scope.collect_schema()?;
        Ok(Self {
            nodes: vec![Node {
                parent: None,
                kind: NodeKind::Source,
                scope,
                schema,
            }],
            defined: Vec::new(),
            actions: Vec::new(),
            results: Vec::new(),
        })
    }

    /// Add a derived column. `expr` may only read columns visible from `parent`.
    pub(crate) fn add_define(&mut self, parent: NodeId, column: &str, expr: Expr) -> AnalysisResult<NodeId> {
        if self.nodes[SOURCE].schema.contains(column) || self.defined.iter().any(|c| c == column) {
            return Err(AnalysisError::DuplicateColumn {
                name: column.to_string(),
            });
        }
        let mut scope = self.nodes[parent].scope.clone().with_column(expr.clone().alias(column));
        let schema = scope.collect_schema().map_err(scope_error)?;
        self.defined.push(column.to_string());
        Ok(self.push(
            parent,
            NodeKind::Define {
                column: column.to_string(),
                expr,
            },
            scope,
            schema,
        ))
    }

    /// Add a named filter. `predicate` must be boolean and may only read columns visible from
    /// `parent`. Null predicate values count as failing.
    pub(crate) fn add_filter(&mut self, parent: NodeId, name: &str, predicate: Expr) -> AnalysisResult<NodeId> {
        let scope = self.nodes[parent].scope.clone();
        let checked = scope
            .clone()
            .select([predicate.clone().alias(PREDICATE_CHECK)])
            .collect_schema()
            .map_err(scope_error)?;
        match checked.get(PREDICATE_CHECK) {
            Some(DataType::Boolean) => {}
            other => {
                return Err(AnalysisError::InvalidConfig {
                    message: format!(
                        "filter '{name}' predicate has type {}, expected Boolean",
                        other.map_or_else(|| "unknown".to_string(), |t| t.to_string())
                    ),
                });
            }
        }
        let schema = self.nodes[parent].schema.clone();
        Ok(self.push(
            parent,
            NodeKind::Filter {
                name: name.to_string(),
                predicate,
            },
            scope,
            schema,
        ))
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind, scope: LazyFrame, schema: SchemaRef) -> NodeId {
        self.nodes.push(Node {
            parent: Some(parent),
            kind,
            scope,
            schema,
        });
        self.nodes.len() - 1
    }

    fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(node), move |&id| self.nodes[id].parent)
    }

    /// Nearest filter at or above `node`; its mask tells which rows are alive at `node`.
    fn gate(&self, node: NodeId) -> Option<NodeId> {
        self.ancestors(node)
            .find(|&id| matches!(self.nodes[id].kind, NodeKind::Filter { .. }))
    }

    /// Fails with [`AnalysisError::UnknownColumn`] unless `column` is visible from `node`.
    pub(crate) fn resolve(&self, node: NodeId, column: &str) -> AnalysisResult<String> {
        if self.nodes[node].schema.contains(column) {
            Ok(column.to_string())
        } else {
            Err(AnalysisError::UnknownColumn {
                name: column.to_string(),
            })
        }
    }

    /// Source columns followed by the derived columns on the path to `node`.
    pub(crate) fn visible_columns(&self, node: NodeId) -> Vec<String> {
        self.nodes[node]
            .schema
            .iter_names()
            .map(|n| n.to_string())
            .collect()
    }

    pub(crate) fn book(&mut self, node: NodeId, kind: ActionKind) -> usize {
        self.actions.push(Action { node, kind });
        self.results.push(None);
        self.actions.len() - 1
    }

    pub(crate) fn result(&self, action: usize) -> Option<&ActionOutput> {
        self.results.get(action)?.as_ref()
    }

    /// Plan a pass over every action that has no result yet, or `None` if all are materialized.
    pub(crate) fn plan_pending(&self) -> Option<PassPlan> {
        let actions: Vec<usize> = (0..self.actions.len())
            .filter(|&a| self.results[a].is_none())
            .collect();
        if actions.is_empty() {
            return None;
        }

        let mut needed = vec![false; self.nodes.len()];
        let mut masks = BTreeSet::new();
        let mut numeric = BTreeSet::new();
        let mut listed = BTreeSet::new();
        for &a in &actions {
            let action = &self.actions[a];
            for id in self.ancestors(action.node) {
                needed[id] = true;
            }
            masks.extend(self.gate(action.node));
            match &action.kind {
                ActionKind::Count => {}
                ActionKind::Histo1D { x, .. } => {
                    numeric.insert(x.clone());
                }
                ActionKind::Histo3D { axes, .. } => numeric.extend(axes.iter().cloned()),
                ActionKind::Snapshot { columns } => listed.extend(columns.iter().cloned()),
                ActionKind::Report => {
                    for (filter, parent) in self.filters_on_path(action.node) {
                        masks.insert(filter);
                        masks.extend(self.gate(parent));
                    }
                }
            }
        }
        Some(PassPlan {
            needed,
            actions,
            masks: masks.into_iter().collect(),
            numeric: numeric.into_iter().collect(),
            listed: listed.into_iter().collect(),
        })
    }

    /// `(filter, parent)` pairs from the source down to `node`.
    fn filters_on_path(&self, node: NodeId) -> Vec<(NodeId, NodeId)> {
        let mut out: Vec<(NodeId, NodeId)> = self
            .ancestors(node)
            .filter_map(|id| match (&self.nodes[id].kind, self.nodes[id].parent) {
                (NodeKind::Filter { .. }, Some(parent)) => Some((id, parent)),
                _ => None,
            })
            .collect();
        out.reverse();
        out
    }

    /// The lazy query computing every mask and column `plan` reads.
    fn query(&self, plan: &PassPlan, source: &DataFrame) -> LazyFrame {
        let mut lf = source.clone().lazy();
        for (id, node) in self.nodes.iter().enumerate() {
            if !plan.needed[id] {
                continue;
            }
            match &node.kind {
                NodeKind::Source => {}
                NodeKind::Define { column, expr } => {
                    let value = match self.gate(id) {
                        Some(gate) => when(col(mask_name(gate)))
                            .then(expr.clone())
                            .otherwise(lit(NULL)),
                        None => expr.clone(),
                    };
                    lf = lf.with_column(value.alias(column.as_str()));
                }
                NodeKind::Filter { predicate, .. } => {
                    let pass = predicate.clone().fill_null(lit(false));
                    let mask = match node.parent.and_then(|p| self.gate(p)) {
                        Some(gate) => col(mask_name(gate)).and(pass),
                        None => pass,
                    };
                    lf = lf.with_column(mask.alias(mask_name(id)));
                }
            }
        }
        let columns: BTreeSet<&String> = plan.numeric.iter().chain(&plan.listed).collect();
        let outputs: Vec<Expr> = plan
            .masks
            .iter()
            .map(|&m| col(mask_name(m)))
            .chain(columns.into_iter().map(|c| col(c.as_str())))
            .collect();
        lf.select(outputs)
    }

    /// Evaluate the expressions of `plan` over `source` in one collect.
    pub(crate) fn collect(&self, plan: &PassPlan, source: &DataFrame) -> AnalysisResult<PassData> {
        let mut data = PassData {
            rows: source.height(),
            ..Default::default()
        };
        if plan.masks.is_empty() && plan.numeric.is_empty() && plan.listed.is_empty() {
            return Ok(data);
        }

        let df = self.query(plan, source).collect()?;
        for &m in &plan.masks {
            let mask: Vec<bool> = df
                .column(&mask_name(m))?
                .bool()?
                .into_iter()
                .map(|v| v.unwrap_or(false))
                .collect();
            data.masks.insert(m, mask);
        }
        for name in &plan.numeric {
            let values = df.column(name)?.cast(&DataType::Float64)?;
            data.numbers.insert(name.clone(), values.f64()?.into_iter().collect());
        }
        for name in &plan.listed {
            data.values.insert(name.clone(), snapshot_values(name, df.column(name)?)?);
        }
        Ok(data)
    }

    pub(crate) fn new_state(&self, plan: &PassPlan, data: &PassData) -> PassState {
        let accumulators = plan
            .actions
            .iter()
            .map(|&a| match &self.actions[a].kind {
                ActionKind::Count | ActionKind::Report => Accumulator::Count(0),
                ActionKind::Histo1D { model, .. } => Accumulator::Hist1D(Hist1D::new(model)),
                ActionKind::Histo3D { model, .. } => Accumulator::Hist3D(Hist3D::new(model)),
                ActionKind::Snapshot { columns } => {
                    let fields = columns
                        .iter()
                        .map(|c| {
                            let data_type = data.values.get(c).map_or(types::DataType::Float64, |(t, _)| *t);
                            types::Field::new(c.as_str(), data_type)
                        })
                        .collect();
                    Accumulator::Rows(DataSet::new(types::Schema::new(fields), Vec::new()))
                }
            })
            .collect();
        PassState {
            rows: 0,
            alive: vec![0; plan.masks.len()],
            accumulators,
        }
    }

    /// Fold the rows in `range` of `data` into a fresh [`PassState`].
    pub(crate) fn process_chunk(&self, plan: &PassPlan, data: &PassData, range: Range<usize>) -> AnalysisResult<PassState> {
        let mut state = self.new_state(plan, data);
        let masks: Vec<&[bool]> = plan.masks.iter().map(|&m| data.mask(m)).collect::<AnalysisResult<_>>()?;
        let inputs: Vec<Inputs<'_>> = plan
            .actions
            .iter()
            .map(|&a| self.inputs(a, data))
            .collect::<AnalysisResult<_>>()?;

        for row in range {
            state.rows += 1;
            for (alive, mask) in state.alive.iter_mut().zip(&masks) {
                if mask[row] {
                    *alive += 1;
                }
            }
            for (acc, input) in state.accumulators.iter_mut().zip(&inputs) {
                if input.gate.is_some_and(|gate| !gate[row]) {
                    continue;
                }
                acc.feed(&input.bound, row)?;
            }
        }
        Ok(state)
    }

    fn inputs<'a>(&'a self, action: usize, data: &'a PassData) -> AnalysisResult<Inputs<'a>> {
        let action = &self.actions[action];
        let gate = self.gate(action.node).map(|g| data.mask(g)).transpose()?;
        let bound = match &action.kind {
            ActionKind::Count | ActionKind::Report => Bound::Count,
            ActionKind::Histo1D { x, .. } => Bound::Numbers(vec![data.numbers(x)?]),
            ActionKind::Histo3D { axes, .. } => Bound::Numbers(
                axes.iter()
                    .map(|c| data.numbers(c))
                    .collect::<AnalysisResult<_>>()?,
            ),
            ActionKind::Snapshot { columns } => Bound::Values(
                columns
                    .iter()
                    .map(|c| data.values(c))
                    .collect::<AnalysisResult<_>>()?,
            ),
        };
        Ok(Inputs { gate, bound })
    }

    /// Turn the merged state of a finished pass into memoized results.
    pub(crate) fn store_results(&mut self, plan: &PassPlan, state: PassState) {
        let PassState {
            rows,
            alive,
            accumulators,
        } = state;
        let count = |mask: Option<NodeId>| match mask {
            None => rows,
            Some(m) => plan
                .masks
                .iter()
                .position(|&x| x == m)
                .map_or(0, |slot| alive[slot]),
        };
        for (acc, &a) in accumulators.into_iter().zip(&plan.actions) {
            let action = &self.actions[a];
            let out = match (&action.kind, acc) {
                (ActionKind::Report, _) => ActionOutput::Report(self.cut_flow(action.node, &count)),
                (_, Accumulator::Count(n)) => ActionOutput::Count(n),
                (_, Accumulator::Hist1D(h)) => ActionOutput::Hist1D(h),
                (_, Accumulator::Hist3D(h)) => ActionOutput::Hist3D(h),
                (_, Accumulator::Rows(ds)) => ActionOutput::Snapshot(ds),
            };
            self.results[a] = Some(out);
        }
    }

    fn cut_flow(&self, node: NodeId, count: &dyn Fn(Option<NodeId>) -> u64) -> CutFlowReport {
        let cuts = self
            .filters_on_path(node)
            .into_iter()
            .filter_map(|(filter, parent)| match &self.nodes[filter].kind {
                NodeKind::Filter { name, .. } => Some(CutInfo {
                    name: name.clone(),
                    pass: count(Some(filter)),
                    all: count(self.gate(parent)),
                }),
                _ => None,
            })
            .collect();
        CutFlowReport::new(cuts)
    }
}

/// Map expression errors found while checking a new node to the crate's column errors.
fn scope_error(e: PolarsError) -> AnalysisError {
    match e {
        PolarsError::ColumnNotFound(msg) => AnalysisError::UnknownColumn {
            name: missing_column(&msg.to_string()),
        },
        PolarsError::Context { error, .. } => scope_error(*error),
        other => AnalysisError::Polars(other),
    }
}

/// The quoted column name in a polars "not found" message, or the whole message.
fn missing_column(message: &str) -> String {
    message
        .split('"')
        .nth(1)
        .map_or_else(|| message.to_string(), str::to_string)
}

fn snapshot_values(name: &str, column: &Column) -> AnalysisResult<(types::DataType, Vec<Value>)> {
    let dtype = column.dtype();
    if *dtype == DataType::Boolean {
        let values = column.bool()?.into_iter().map(|v| v.map_or(Value::Null, Value::Bool));
        Ok((types::DataType::Bool, values.collect()))
    } else if dtype.is_integer() {
        let cast = column.cast(&DataType::Int64)?;
        let values = cast.i64()?.into_iter().map(|v| v.map_or(Value::Null, Value::Int64));
        Ok((types::DataType::Int64, values.collect()))
    } else if dtype.is_float() {
        let cast = column.cast(&DataType::Float64)?;
        let values = cast.f64()?.into_iter().map(|v| v.map_or(Value::Null, Value::Float64));
        Ok((types::DataType::Float64, values.collect()))
    } else {
        Err(AnalysisError::SchemaMismatch {
            message: format!("column '{name}' has type {dtype}, only numbers and booleans can be snapshotted"),
        })
    }
}

/// Masks and columns `plan` reads, collected from the source.
#[derive(Default)]
pub(crate) struct PassData {
    rows: usize,
    masks: HashMap<NodeId, Vec<bool>>,
    numbers: HashMap<String, Vec<Option<f64>>>,
    values: HashMap<String, (types::DataType, Vec<Value>)>,
}

impl PassData {
    pub(crate) fn row_count(&self) -> usize {
        self.rows
    }

    fn mask(&self, node: NodeId) -> AnalysisResult<&[bool]> {
        self.masks
            .get(&node)
            .map(Vec::as_slice)
            .ok_or_else(|| missing_input(&mask_name(node)))
    }

    fn numbers<'a>(&'a self, column: &'a str) -> AnalysisResult<(&'a str, &'a [Option<f64>])> {
        self.numbers
            .get(column)
            .map(|v| (column, v.as_slice()))
            .ok_or_else(|| missing_input(column))
    }

    fn values(&self, column: &str) -> AnalysisResult<&[Value]> {
        self.values
            .get(column)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| missing_input(column))
    }
}

fn missing_input(column: &str) -> AnalysisError {
    AnalysisError::InvalidConfig {
        message: format!("column '{column}' was not collected for this pass"),
    }
}

/// Nodes to evaluate, actions to fill, and what to collect for them in one pass.
pub(crate) struct PassPlan {
    needed: Vec<bool>,
    actions: Vec<usize>,
    masks: Vec<NodeId>,
    numeric: Vec<String>,
    listed: Vec<String>,
}

impl PassPlan {
    pub(crate) fn action_count(&self) -> usize {
        self.actions.len()
    }
}

struct Inputs<'a> {
    gate: Option<&'a [bool]>,
    bound: Bound<'a>,
}

enum Bound<'a> {
    Count,
    Numbers(Vec<(&'a str, &'a [Option<f64>])>),
    Values(Vec<&'a [Value]>),
}

fn number(columns: &[(&str, &[Option<f64>])], axis: usize, row: usize) -> AnalysisResult<f64> {
    let (name, values) = columns[axis];
    values[row].ok_or_else(|| AnalysisError::RowEvaluation {
        row,
        node: name.to_string(),
        message: "value is null".to_string(),
    })
}

#[derive(Debug)]
pub(crate) enum Accumulator {
    Count(u64),
    Hist1D(Hist1D),
    Hist3D(Hist3D),
    Rows(DataSet),
}

impl Accumulator {
    fn feed(&mut self, bound: &Bound<'_>, row: usize) -> AnalysisResult<()> {
        match (self, bound) {
            (Accumulator::Count(n), _) => *n += 1,
            (Accumulator::Hist1D(h), Bound::Numbers(cols)) => h.fill(number(cols, 0, row)?),
            (Accumulator::Hist3D(h), Bound::Numbers(cols)) => {
                h.fill(number(cols, 0, row)?, number(cols, 1, row)?, number(cols, 2, row)?)
            }
            (Accumulator::Rows(ds), Bound::Values(cols)) => {
                ds.rows.push(cols.iter().map(|c| c[row].clone()).collect());
            }
            _ => {
                return Err(AnalysisError::InvalidConfig {
                    message: "accumulator does not match its action".to_string(),
                });
            }
        }
        Ok(())
    }

    fn merge(&mut self, other: Accumulator) {
        match (self, other) {
            (Accumulator::Count(a), Accumulator::Count(b)) => *a += b,
            (Accumulator::Hist1D(a), Accumulator::Hist1D(b)) => a.merge(&b),
            (Accumulator::Hist3D(a), Accumulator::Hist3D(b)) => a.merge(&b),
            (Accumulator::Rows(a), Accumulator::Rows(b)) => a.rows.extend(b.rows),
            _ => {}
        }
    }
}

/// Row and mask counters plus per-action accumulators of (part of) a pass.
#[derive(Debug)]
pub(crate) struct PassState {
    rows: u64,
    alive: Vec<u64>,
    accumulators: Vec<Accumulator>,
}

impl PassState {
    /// Fold `other` into `self`. Row-ordered accumulators append, so merge chunks in order.
    pub(crate) fn merge(&mut self, other: PassState) {
        self.rows += other.rows;
        for (a, b) in self.alive.iter_mut().zip(other.alive) {
            *a += b;
        }
        for (a, b) in self.accumulators.iter_mut().zip(other.accumulators) {
            a.merge(b);
        }
    }

    pub(crate) fn rows_seen(&self) -> u64 {
        self.rows
    }
}
