pub mod nuc;
pub mod parallelism;
