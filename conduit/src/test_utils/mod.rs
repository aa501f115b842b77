pub mod collect;
pub mod sequences;
