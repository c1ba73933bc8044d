pub mod barrier;
pub mod document_collection;

pub use barrier::{BarrierKind, BarrierList};
pub use document_collection::DocumentCollection;
