//! Commands accepted by the ledger and their stateless validation.
//!
//! A [`Command`] is the closed set of mutations the ledger understands.
//! Hosts usually receive commands in the [`Envelope`] wire form, which
//! names its kind as a string and is converted with
//! [`Command::from_envelope`].

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;
use crate::types::{Address, Coins};

/// Route under which every ledger command is delivered.
pub const ROUTE: &str = "tokenledger";

pub const MINT: &str = "mint";
pub const BURN: &str = "burn";
pub const LOCK: &str = "lock";
pub const UNLOCK: &str = "unlock";

/// The target and amount shared by every command kind.
///
/// Fields are declared in JSON key order; signing bytes rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBody {
    pub amount: Coins,
    pub owner: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Command {
    Mint(CommandBody),
    Burn(CommandBody),
    Lock(CommandBody),
    Unlock(CommandBody),
}

impl Command {
    pub fn mint(owner: Address, amount: Coins) -> Self {
        Command::Mint(CommandBody { owner, amount })
    }

    pub fn burn(owner: Address, amount: Coins) -> Self {
        Command::Burn(CommandBody { owner, amount })
    }

    pub fn lock(owner: Address, amount: Coins) -> Self {
        Command::Lock(CommandBody { owner, amount })
    }

    pub fn unlock(owner: Address, amount: Coins) -> Self {
        Command::Unlock(CommandBody { owner, amount })
    }

    pub fn body(&self) -> &CommandBody {
        match self {
            Command::Mint(body) | Command::Burn(body) | Command::Lock(body) | Command::Unlock(body) => body,
        }
    }

    pub fn route(&self) -> &'static str {
        ROUTE
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::Mint(_) => MINT,
            Command::Burn(_) => BURN,
            Command::Lock(_) => LOCK,
            Command::Unlock(_) => UNLOCK,
        }
    }

    /// Stateless checks run before a command may touch the store.
    pub fn validate_basic(&self) -> Result<(), LedgerError> {
        let body = self.body();
        body.owner.validate()?;
        if !body.amount.is_all_positive() {
            return Err(LedgerError::NonPositiveAmount);
        }
        Ok(())
    }

    /// Addresses whose signatures the host must verify.
    pub fn signers(&self) -> Vec<Address> {
        vec![self.body().owner.clone()]
    }

    /// Canonical bytes to sign: JSON with object keys sorted.
    ///
    /// Written straight from the types, whose fields are declared in sorted
    /// order. Going through `serde_json::Value` would cap amounts at 64 bits.
    pub fn sign_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        serde_json::to_vec(self).map_err(|e| LedgerError::SerializationError(e.to_string()))
    }

    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind().to_string();
        let body = match self {
            Command::Mint(body) | Command::Burn(body) | Command::Lock(body) | Command::Unlock(body) => body,
        };
        Envelope {
            route: ROUTE.to_string(),
            kind,
            owner: body.owner,
            amount: body.amount,
        }
    }

    /// Resolve a wire envelope into a command by route and kind.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, LedgerError> {
        if envelope.route != ROUTE {
            return Err(LedgerError::UnrecognizedCommand(format!(
                "unknown route {:?}",
                envelope.route
            )));
        }
        let body = CommandBody {
            owner: envelope.owner,
            amount: envelope.amount,
        };
        match envelope.kind.as_str() {
            MINT => Ok(Command::Mint(body)),
            BURN => Ok(Command::Burn(body)),
            LOCK => Ok(Command::Lock(body)),
            UNLOCK => Ok(Command::Unlock(body)),
            other => Err(LedgerError::UnrecognizedCommand(format!(
                "unrecognized {ROUTE} command type: {other}"
            ))),
        }
    }
}

/// A command as delivered on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub route: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub owner: Address,
    pub amount: Coins,
}

impl TryFrom<Envelope> for Command {
    type Error = LedgerError;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        Command::from_envelope(envelope)
    }
}
