/// Domain filter compiler.
///
/// Translates the wire-level filter expression language (ordered clause
/// triples with prefix boolean markers) into a predicate tree the entity
/// store evaluates. Operators are strictly whitelisted.
pub mod compiler;
/// Predicate tree and record matching.
pub mod predicate;

pub use compiler::{compile_domain, search_predicate};
pub use predicate::{CmpOp, Predicate};
