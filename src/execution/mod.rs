/*
    Everything needed to run a physical plan: the expression evaluator, the physical operators
    with their pull protocol and the engine that builds operator trees from plans and drives them.
 */

pub mod context;
pub mod engine;
pub mod expression;
pub mod operators;
pub mod plan;
