pub mod graph;
pub mod purge;
