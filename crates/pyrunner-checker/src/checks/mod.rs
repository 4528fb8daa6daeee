//! Evaluators, one per check type
//!
//! - `var` - last assignment to a name
//! - `call` - last call of a function and its arguments
//! - `output` - captured stdout
//! - `contains` - raw source snippet

pub mod call;
pub mod contains;
pub mod output;
pub mod var;

pub use self::call::call;
pub use self::contains::contains;
pub use self::output::output;
pub use self::var::var;
