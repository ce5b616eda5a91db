pub mod content;
pub mod core;
pub mod setup;
pub mod topics;
