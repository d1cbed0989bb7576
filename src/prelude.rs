//! # Prelude
//!
//! Contains definitions that are useful to
//! have global
//!
//! ## Examples
//!
//! ```
//! use gentrees::prelude::*;
//! ```

pub use crate::fs::*;
pub use crate::newtypes::*;
pub use crate::tables::*;
pub use crate::traits::*;
pub use crate::trees::*;
pub use crate::variants::*;
