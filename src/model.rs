pub mod disk;
pub mod format;
pub mod health;
pub mod image;
pub mod node;
pub mod sdn;
pub mod vm;
