pub mod config_manager;
pub mod error;
pub mod memory;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use memory::*;
pub use types::*;
