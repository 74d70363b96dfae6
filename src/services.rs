pub mod disk;
pub mod health;
pub mod node;
pub mod sdn;
pub mod storage;
pub mod task;
pub mod vm;
