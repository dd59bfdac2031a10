//! Remote dispatch endpoint: decodes a task request, runs the allow-listed
//! operation against a fresh connection context and returns the outcome.

pub mod diagnostics;
pub mod dispatch;
pub mod endpoint;
pub mod server;

pub use dispatch::{DispatchError, dispatch};
pub use endpoint::{Endpoint, KILL_SWITCH_MESSAGE};
pub use server::{router, serve};
