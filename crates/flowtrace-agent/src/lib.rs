pub mod batch;
pub mod orchestrator;
pub mod prompts;
pub mod reply;

pub use batch::*;
pub use orchestrator::*;
pub use reply::*;
