//! Remote fan-out for sqlfan.
//!
//! [`fan_out`] sends up to [`MAX_FAN_OUT`] allow-listed operations to the
//! dispatch endpoint at once and returns a [`TaskIter`] over the collected
//! results. [`RemoteClient`] runs single operations remotely through the
//! same [`Transport`].

mod client;
mod error;
mod fanout;
mod transport;
mod wrappers;

#[cfg(test)]
pub(crate) mod testing;

pub use client::RemoteClient;
pub use error::FanOutError;
pub use fanout::{MAX_FAN_OUT, TaskDescriptor, TaskIter, TaskResult, TaskStep, fan_out};
pub use transport::{Delivery, HttpTransport, Transport};
