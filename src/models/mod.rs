// src/models/mod.rs
pub mod driver;
pub mod location;
pub mod messages;
pub mod ride;

pub use driver::*;
pub use location::*;
pub use ride::*;
