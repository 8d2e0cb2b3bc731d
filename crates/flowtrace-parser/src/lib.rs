pub mod arkts;
pub mod file_collect;
pub mod language;
pub mod locator;
pub mod visitor;

pub use file_collect::*;
pub use language::*;
pub use locator::*;
pub use visitor::*;
