pub mod batch;
pub mod core_alignment;
pub mod snippy_core;
