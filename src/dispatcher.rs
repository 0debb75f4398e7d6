use serde::{Deserialize, Serialize};

use crate::command::{Command, Envelope};
use crate::ledger::{Ledger, LedgerError};
use crate::storage::Storage;
use crate::types::{Address, Coins};

/// Outcome of a command that was applied to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub kind: String,
    pub owner: Address,
    pub amount: Coins,
}

/// Routes commands to the matching ledger operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    ledger: Ledger,
}

impl Dispatcher {
    pub fn new(ledger: Ledger) -> Self {
        Dispatcher { ledger }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Validate `command` and apply it. A command that fails validation
    /// never reaches the ledger.
    pub fn dispatch(&self, store: &dyn Storage, command: &Command) -> Result<CommandResult, LedgerError> {
        command.validate_basic()?;

        let body = command.body();
        match command {
            Command::Mint(_) => self.ledger.mint(store, &body.owner, &body.amount)?,
            Command::Burn(_) => self.ledger.burn(store, &body.owner, &body.amount)?,
            Command::Lock(_) => self.ledger.lock(store, &body.owner, &body.amount)?,
            Command::Unlock(_) => self.ledger.unlock(store, &body.owner, &body.amount)?,
        }

        Ok(CommandResult {
            kind: command.kind().to_string(),
            owner: body.owner.clone(),
            amount: body.amount.clone(),
        })
    }

    /// Resolve a wire envelope and dispatch it. Unknown routes or kinds
    /// fail with [`LedgerError::UnrecognizedCommand`].
    pub fn dispatch_envelope(&self, store: &dyn Storage, envelope: Envelope) -> Result<CommandResult, LedgerError> {
        let command = Command::from_envelope(envelope)?;
        self.dispatch(store, &command)
    }
}
