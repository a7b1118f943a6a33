mod core;
mod decoration;
pub mod markdown;
mod ops;
mod plugin;
mod serde_value;

pub use crate::core::*;
pub use crate::decoration::*;
pub use crate::ops::*;
pub use crate::plugin::*;
pub use crate::serde_value::*;
