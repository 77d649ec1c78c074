pub mod bounds;
pub mod errors;
pub mod evaluation;

pub use bounds::*;
pub use errors::*;
pub use evaluation::*;
