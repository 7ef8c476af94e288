//! # tron-tools
//!
//! The `TronTool` trait every agent-callable tool implements, plus the
//! parameter-validation helpers shared by tool implementations. Concrete
//! tools live in `dork-tools`, which re-exposes the Relay/Pulse/Mesh
//! services behind this trait.

#![deny(unsafe_code)]

pub mod errors;
pub mod traits;
pub mod utils;

pub use errors::ToolError;
pub use traits::{ToolContext, TronTool};
