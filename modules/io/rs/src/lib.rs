pub mod compression;
pub mod fasta;
pub mod reactivity;
mod traits;

pub use traits::{ReadRecord, WriteRecord};
