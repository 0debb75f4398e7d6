use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::command::{Command, Envelope};
use crate::dispatcher::{CommandResult, Dispatcher};
use crate::ledger::{Ledger, LedgerError};
use crate::query::QueryService;
use crate::storage::{CacheStorage, Storage, StorageError};
use crate::types::{Address, Coins};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
    #[error("Ledger error: {0}")]
    LedgerError(#[from] LedgerError),
    #[error("Failed to decode command: {0}")]
    DecodeError(#[from] serde_json::Error),
    #[error("Genesis entry {index} rejected: {source}")]
    GenesisRejected {
        index: usize,
        #[source]
        source: LedgerError,
    },
    #[error("Runtime lock poisoned")]
    LockPoisoned,
}

/// Initial free balance credited when the ledger is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: Address,
    pub coins: Coins,
}

/// Counters over every command handed to [`Runtime::deliver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub committed: u64,
    pub rejected: u64,
}

/// Host execution context for the ledger.
///
/// Commands are applied strictly one at a time. Each runs against a
/// [`CacheStorage`] over the committed store; its writes are flushed as one
/// batch when it succeeds and dropped when it fails.
pub struct Runtime<S: Storage> {
    storage: Arc<S>,
    dispatcher: Dispatcher,
    queries: QueryService,
    stats: Mutex<DeliveryStats>,
}

impl<S: Storage> Runtime<S> {
    pub fn new(storage: S) -> Self {
        Self::with_shared(Arc::new(storage))
    }

    pub fn with_shared(storage: Arc<S>) -> Self {
        let ledger = Ledger::default();
        Runtime {
            storage,
            dispatcher: Dispatcher::new(ledger),
            queries: QueryService::new(ledger),
            stats: Mutex::new(DeliveryStats::default()),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Apply one command with commit-or-discard semantics.
    pub fn deliver(&self, command: &Command) -> Result<CommandResult, RuntimeError> {
        // Held for the whole command: one command in flight at a time.
        let mut stats = self.stats.lock().map_err(|_| RuntimeError::LockPoisoned)?;
        stats.delivered += 1;

        let cache = CacheStorage::new(self.storage.as_ref());
        let result = match self.dispatcher.dispatch(&cache, command) {
            Ok(result) => result,
            Err(err) => {
                stats.rejected += 1;
                if err.is_fatal() {
                    error!(kind = command.kind(), owner = %command.body().owner, error = %err, "command failed on store");
                } else {
                    warn!(kind = command.kind(), owner = %command.body().owner, error = %err, "command rejected");
                }
                return Err(err.into());
            }
        };

        let writes = cache.write().map_err(|err| {
            stats.rejected += 1;
            error!(kind = command.kind(), error = %err, "commit failed");
            err
        })?;
        stats.committed += 1;
        info!(kind = %result.kind, owner = %result.owner, amount = %result.amount, writes, "command committed");
        Ok(result)
    }

    pub fn deliver_envelope(&self, envelope: Envelope) -> Result<CommandResult, RuntimeError> {
        match Command::from_envelope(envelope) {
            Ok(command) => self.deliver(&command),
            Err(err) => {
                let mut stats = self.stats.lock().map_err(|_| RuntimeError::LockPoisoned)?;
                stats.delivered += 1;
                stats.rejected += 1;
                warn!(error = %err, "command rejected");
                Err(err.into())
            }
        }
    }

    /// Decode a JSON [`Envelope`] and deliver it. Undecodable input counts
    /// as a delivered, rejected command.
    pub fn deliver_json(&self, bytes: &[u8]) -> Result<CommandResult, RuntimeError> {
        match serde_json::from_slice::<Envelope>(bytes) {
            Ok(envelope) => self.deliver_envelope(envelope),
            Err(err) => {
                let mut stats = self.stats.lock().map_err(|_| RuntimeError::LockPoisoned)?;
                stats.delivered += 1;
                stats.rejected += 1;
                warn!(error = %err, bytes = bytes.len(), "undecodable command rejected");
                Err(err.into())
            }
        }
    }

    /// Mint every genesis balance in a single commit. If any entry is
    /// rejected, none are applied.
    pub fn apply_genesis(&self, accounts: &[GenesisAccount]) -> Result<(), RuntimeError> {
        let _guard = self.stats.lock().map_err(|_| RuntimeError::LockPoisoned)?;
        let cache = CacheStorage::new(self.storage.as_ref());
        for (index, account) in accounts.iter().enumerate() {
            let command = Command::mint(account.address.clone(), account.coins.clone());
            self.dispatcher
                .dispatch(&cache, &command)
                .map_err(|source| RuntimeError::GenesisRejected { index, source })?;
        }
        let writes = cache.write()?;
        info!(accounts = accounts.len(), writes, "genesis applied");
        Ok(())
    }

    pub fn balance(&self, address: &str) -> Result<Coins, RuntimeError> {
        Ok(self.queries.balance(self.storage.as_ref(), address)?)
    }

    pub fn locked(&self, address: &str) -> Result<Coins, RuntimeError> {
        Ok(self.queries.locked(self.storage.as_ref(), address)?)
    }

    pub fn query(&self, path: &[&str]) -> Result<Vec<u8>, RuntimeError> {
        Ok(self.queries.query(self.storage.as_ref(), path)?)
    }

    pub fn stats(&self) -> Result<DeliveryStats, RuntimeError> {
        Ok(*self.stats.lock().map_err(|_| RuntimeError::LockPoisoned)?)
    }
}
