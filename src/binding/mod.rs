//! Binding definitions, and the weaver turning them into generated methods

mod driver;
mod model;

pub use driver::*;
pub use model::*;
