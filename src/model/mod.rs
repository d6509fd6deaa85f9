//! Model assembly core: canonical variable keys, the variable registry,
//! symbolic endpoint resolution, dependency binding, the constraint
//! pattern library, result harvesting and the run orchestration.

pub mod binder;
pub mod boundary;
pub mod driver;
pub mod error;
pub mod harvest;
pub mod key;
pub mod patterns;
pub mod registry;

pub use binder::*;
pub use boundary::*;
pub use driver::*;
pub use error::*;
pub use harvest::*;
pub use key::*;
pub use registry::*;
