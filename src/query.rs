use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ledger::{Ledger, LedgerError};
use crate::storage::Storage;
use crate::types::{Address, Coins};

pub const QUERY_BALANCE: &str = "balance";
pub const QUERY_LOCKED: &str = "locked";

/// Payload returned by path queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: Coins,
}

impl fmt::Display for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.token, f)
    }
}

/// Read-only view over the ledger, keyed by hex address text.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryService {
    ledger: Ledger,
}

impl QueryService {
    pub fn new(ledger: Ledger) -> Self {
        QueryService { ledger }
    }

    pub fn balance(&self, store: &dyn Storage, address: &str) -> Result<Coins, LedgerError> {
        let address: Address = address.parse()?;
        self.ledger.balance(store, &address)
    }

    pub fn locked(&self, store: &dyn Storage, address: &str) -> Result<Coins, LedgerError> {
        let address: Address = address.parse()?;
        self.ledger.locked_balance(store, &address)
    }

    /// Path interface: `["balance", <hex>]` or `["locked", <hex>]`, answered
    /// with an indented JSON [`TokenResponse`].
    pub fn query(&self, store: &dyn Storage, path: &[&str]) -> Result<Vec<u8>, LedgerError> {
        let token = match path {
            [QUERY_BALANCE, address] => self.balance(store, address)?,
            [QUERY_LOCKED, address] => self.locked(store, address)?,
            _ => return Err(LedgerError::UnknownQuery(path.join("/"))),
        };
        serde_json::to_vec_pretty(&TokenResponse { token })
            .map_err(|e| LedgerError::SerializationError(e.to_string()))
    }
}
