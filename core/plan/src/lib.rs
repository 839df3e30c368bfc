//! Counter-plan building.
//!
//! Given a fact, selects the applicable counter definitions, assembles their
//! aggregation pipelines, substitutes per-fact parameters, and groups the
//! result by index type so counters sharing an index type can later run as
//! one facet aggregation over the same set of relevant facts.

mod builder;
mod predicate;
mod substitute;

pub use builder::CounterPipelines;
pub use builder::CounterPlan;
pub use builder::applicable_counters;
pub use builder::build_plan;
pub use builder::build_plan_at;
pub use predicate::matches_conditions;
pub use substitute::substitute_params;
