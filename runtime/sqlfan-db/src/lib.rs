//! Query compilation, connection management and bulk loading for sqlfan.
//!
//! The crate is organised leaves-first: [`value`] classifies cells,
//! [`compile`] turns filters into dialect SQL, [`reader`] and [`loader`]
//! execute against a [`driver::Connection`] obtained from a
//! [`ConnectionManager`], and [`Database`] exposes the allow-listed
//! operations on top of all of it.

mod config;
mod database;
mod error;
mod manager;

pub mod compile;
pub mod driver;
pub mod filter;
pub mod loader;
pub mod reader;
pub mod settings;
pub mod value;
pub mod wire;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use compile::Select;
pub use config::{CloudInstance, ConnectionConfig, ConnectionContext, Credentials, Dialect};
pub use database::{Database, ReadOptions};
pub use driver::{BatchStatement, Connection, Driver, Param, RowSet};
pub use error::{DbError, DriverError, LoadError};
pub use filter::{Condition, Filter, Filters, SortDirection};
pub use loader::{LoadCell, LoadOptions};
pub use manager::ConnectionManager;
pub use reader::{QueryOutput, ReadShape};
pub use settings::{JsonFileSettings, MemorySettings, RemoteSettings, SettingsError, SettingsStore};
pub use value::{Cell, Kind, TypedValue, Value, classify};
pub use wire::{Operation, TaskRequest, TaskResponse, UnknownOperation};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use sqlite::SqliteDriver;
