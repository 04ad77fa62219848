pub mod ai;
pub mod trigger;
