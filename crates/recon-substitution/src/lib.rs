//! Template substitution engine.
//!
//! Renders `{{...}}` expressions against a runtime context, feature-pack
//! properties and a set of built-in helpers: jq queries, nested action
//! execution, sandboxed script evaluation, symbol sanitizing and time
//! functions.

pub mod engine;
pub mod error;
mod functions;
pub mod jq;
pub mod runner;
pub mod script;

pub use engine::{SubstitutionEngine, FP_CTX_VAR};
pub use error::{SubstitutionError, SubstitutionResult};
pub use runner::ActionRunner;
pub use script::ScriptEvaluator;
