// Typed URL sync shared type definitions
// Each submodule defines types used across the application.

pub mod errors;
pub mod history;
pub mod merge;
pub mod settings;
pub mod specifics;
