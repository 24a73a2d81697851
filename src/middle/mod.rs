//! Everything between type checked HIR and the backend. HIR is lowered to
//! LIR, which is then optimized, instrumented with reference counts and
//! verified.

pub mod cfg;
pub mod hir;
pub mod lir;
pub mod module;
pub mod optimization;
pub mod primitive;
pub mod refcount;
pub mod ty;
pub mod verify;
