// src/lib.rs

pub mod types;
pub mod storage;
pub mod ledger;
pub mod command;
pub mod dispatcher;
pub mod query;
pub mod runtime;
pub mod config;

pub use command::{Command, Envelope};
pub use dispatcher::{CommandResult, Dispatcher};
pub use ledger::{Ledger, LedgerError};
pub use query::QueryService;
pub use runtime::{GenesisAccount, Runtime, RuntimeError};
pub use storage::{CacheStorage, MemoryStorage, SledStorage, Storage};
pub use types::{Address, Coin, Coins};
