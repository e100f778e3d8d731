pub mod inventory;
pub mod proxy;

pub use inventory::*;
pub use proxy::*;
