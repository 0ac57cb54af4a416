/*
    Physical operators and the pull protocol they share. An operator is an immutable node of the
    operator tree, everything that changes while a query runs lives in an OperatorState tree
    that mirrors the operator tree and is created by `get_operator_state`. The same operator tree
    can therefore be executed several times, each execution owning its own states.

    Callers pull with `get_chunk` until it hands back an empty chunk. Operators implement
    `get_chunk_internal` and only return zero rows once they are completely exhausted, the
    wrapper takes care of resetting the output, cancellation, verification, profiling and the
    finished flag.
 */

use std::{fmt::Write, time::{Duration, Instant}};

use crate::{chunk::DataChunk, error::Result, types::LogicalType};

use super::context::ExecutionContext;

pub mod aggregate;
pub mod chunk_scan;
pub mod cross_product;
pub mod filter;
pub mod hash_join;
pub mod limit;
pub mod order;
pub mod projection;
pub mod scan;
pub mod top_n;
pub mod union;

pub use self::{aggregate::{AggregateExpression, AggregateKind, SimpleAggregate}, chunk_scan::ChunkScan,
    cross_product::CrossProduct, filter::Filter, hash_join::{HashJoin, JoinCondition}, limit::Limit,
    order::{BoundOrderByNode, Order}, projection::Projection, scan::TableScan, top_n::TopN, union::Union};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatorProfile {
    pub chunks: usize,
    pub rows: usize,
    // Includes the time spent in children
    pub elapsed: Duration,
}

// Operator specific progress, one variant per operator that keeps any
pub enum LocalState {
    None,
    Scan(scan::ScanState),
    ChunkScan { chunk_index: usize },
    Limit { current_offset: usize },
    Order(order::OrderState),
    TopN(top_n::TopNState),
    HashJoin(hash_join::HashJoinState),
    CrossProduct(cross_product::CrossProductState),
    Union { active_child: usize },
    Aggregate { done: bool },
}

pub struct OperatorState {
    pub finished: bool,
    // Output buffer for the first child, reused across pulls
    pub child_chunk: DataChunk,
    pub child_states: Vec<OperatorState>,
    pub local: LocalState,
    pub profile: OperatorProfile,
}

pub trait PhysicalOperator {
    fn name(&self) -> &'static str;

    fn types(&self) -> &[LogicalType];

    fn children(&self) -> &[Box<dyn PhysicalOperator>];

    fn get_chunk_internal(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()>;

    fn local_state(&self) -> LocalState {
        LocalState::None
    }

    fn get_operator_state(&self) -> OperatorState {
        let child_chunk = match self.children().first() {
            Some(child) => child.initialize_chunk(),
            None => DataChunk::new(),
        };
        OperatorState {
            finished: false,
            child_chunk,
            child_states: self.children().iter().map(|child| child.get_operator_state()).collect(),
            local: self.local_state(),
            profile: OperatorProfile::default(),
        }
    }

    fn get_chunk(&self, context: &ExecutionContext, chunk: &mut DataChunk, state: &mut OperatorState) -> Result<()> {
        chunk.reset();
        if state.finished {
            return Ok(());
        }
        context.check_interrupt()?;
        let start = context.config.profile.then(Instant::now);
        let result = self.get_chunk_internal(context, chunk, state).and_then(|_| {
            if context.config.verify { chunk.verify() } else { Ok(()) }
        });
        if let Err(err) = result {
            chunk.reset();
            return Err(err);
        }
        if let Some(start) = start {
            state.profile.chunks += 1;
            state.profile.rows += chunk.size();
            state.profile.elapsed += start.elapsed();
        }
        if chunk.size() == 0 {
            state.finished = true;
            tracing::debug!(operator = self.name(), "operator exhausted");
        } else {
            tracing::trace!(operator = self.name(), rows = chunk.size(), "produced chunk");
        }
        Ok(())
    }

    // Planning hint only
    fn estimate_cardinality(&self) -> usize {
        self.children().iter().map(|child| child.estimate_cardinality()).max().unwrap_or(0)
    }

    fn initialize_chunk(&self) -> DataChunk {
        DataChunk::with_types(self.types())
    }

    fn extra_render_information(&self) -> String {
        String::new()
    }
}

/*
    Renders the operator tree, one operator per line, indented by depth. With a state tree the
    profiling counters gathered during execution are appended.
 */
pub fn render_tree(operator: &dyn PhysicalOperator, state: Option<&OperatorState>) -> String {
    let mut out = String::new();
    render_node(operator, state, 0, &mut out);
    out
}

fn render_node(operator: &dyn PhysicalOperator, state: Option<&OperatorState>, depth: usize, out: &mut String) {
    let _ = write!(out, "{}{}", "  ".repeat(depth), operator.name());
    let extra = operator.extra_render_information();
    if !extra.is_empty() {
        let _ = write!(out, " [{}]", extra);
    }
    if let Some(state) = state {
        let profile = &state.profile;
        let _ = write!(out, " (chunks: {}, rows: {}, time: {:?})", profile.chunks, profile.rows, profile.elapsed);
    }
    out.push('\n');
    for (i, child) in operator.children().iter().enumerate() {
        render_node(child.as_ref(), state.and_then(|state| state.child_states.get(i)), depth + 1, out);
    }
}

// Pulls an operator to exhaustion and gathers everything it produced
#[cfg(test)]
pub(crate) fn collect_all(operator: &dyn PhysicalOperator, context: &ExecutionContext) -> Result<crate::chunk::ChunkCollection> {
    let mut state = operator.get_operator_state();
    let mut chunk = operator.initialize_chunk();
    let mut result = crate::chunk::ChunkCollection::new();
    result.set_types(operator.types().to_vec());
    loop {
        operator.get_chunk(context, &mut chunk, &mut state)?;
        if chunk.size() == 0 {
            break;
        }
        result.append(&chunk)?;
    }
    // Exhausted operators keep answering with empty chunks
    operator.get_chunk(context, &mut chunk, &mut state)?;
    assert_eq!(chunk.size(), 0);
    assert!(state.finished);
    Ok(result)
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::rc::Rc;

    use crate::{chunk::ChunkCollection, config::ExecutionConfig, execution::context::ExecutionContext, types::{LogicalType, Value}};

    use super::ChunkScan;

    pub fn context() -> ExecutionContext {
        ExecutionContext::new(ExecutionConfig { verify: true, profile: true })
    }

    pub fn collection(types: Vec<LogicalType>, rows: impl IntoIterator<Item = Vec<Value>>) -> ChunkCollection {
        let mut collection = ChunkCollection::new();
        collection.set_types(types);
        for row in rows {
            collection.append_row(&row).unwrap();
        }
        collection
    }

    pub fn source(types: Vec<LogicalType>, rows: impl IntoIterator<Item = Vec<Value>>) -> Box<ChunkScan> {
        Box::new(ChunkScan::new(Rc::new(collection(types, rows))))
    }

    pub fn rows(collection: &ChunkCollection) -> Vec<Vec<Value>> {
        (0..collection.count()).map(|i| collection.get_row(i).unwrap()).collect()
    }
}
