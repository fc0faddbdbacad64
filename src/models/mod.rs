pub mod data_root;
pub mod migration;
pub mod records;
pub mod relocation;

pub use data_root::*;
pub use migration::*;
pub use records::*;
pub use relocation::*;
