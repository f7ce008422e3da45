pub mod comparison;
pub mod in_list;
pub mod near;
