//! Compile-time bytecode weaver for XML data binding
//!
//! Given binding definitions and a set of compiled class files, this generates marshal and
//! unmarshal methods straight into the class files (or, when a class can't be changed, into a
//! subclass or a shared adapter class).

pub mod binding;
pub mod jvm;
pub mod munge;
pub mod session;
pub mod settings;
pub mod util;

pub use session::Session;
pub use settings::Settings;
