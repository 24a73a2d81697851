//! Middle end of the compiler. Typed HIR comes in from the frontend, and what
//! comes out is one [`middle::module::Module`] of LIR per class, ready for a
//! backend.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod index;
pub mod middle;
pub mod pipeline;
pub mod span;

pub use config::Config;
pub use error::{CompileError, Result};
pub use pipeline::{compile_module, compile_program};
