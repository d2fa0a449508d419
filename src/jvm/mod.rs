mod access_flags;
pub mod class_file;
mod class_model;
pub mod code;
mod descriptors;
mod errors;
mod java_lib;
mod member;
mod names;
mod registry;
mod resolve;

pub use access_flags::*;
pub use class_model::*;
pub use descriptors::*;
pub use errors::*;
pub use java_lib::RUNTIME_PACKAGE;
pub use member::*;
pub use names::*;
pub use registry::*;
pub use resolve::method_descriptor;
