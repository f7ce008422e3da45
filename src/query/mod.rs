//! Query criteria: field predicates, sort order and pagination bounds,
//! independent of any storage backend.

pub mod command;
pub mod criteria;

pub use command::{COMMAND_PREFIX, Command, is_command};
pub use criteria::{Bounds, Criteria, Predicate, SortDirection, ValuePath};
