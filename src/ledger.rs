use thiserror::Error;
use tracing::{debug, error};

use crate::storage::{Namespace, Storage, StorageError};
use crate::types::{Account, Address, AddressError, AmountError, Coins};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Amounts must be positive")]
    NonPositiveAmount,
    #[error("Insufficient balance for {0}")]
    InsufficientBalance(String),
    #[error("Insufficient locked balance for {0}")]
    InsufficientLockedBalance(String),
    #[error("Unrecognized command: {0}")]
    UnrecognizedCommand(String),
    #[error("Malformed {kind} record for {owner}: {reason}")]
    MalformedRecord {
        kind: &'static str,
        owner: String,
        reason: String,
    },
    #[error("Invalid coins: {0}")]
    InvalidCoins(String),
    #[error("Amount overflow in denomination {0}")]
    AmountOverflow(String),
    #[error("Unknown query endpoint: {0}")]
    UnknownQuery(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl LedgerError {
    /// Errors that indicate a broken store rather than a bad command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::MalformedRecord { .. } | LedgerError::StorageError(_)
        )
    }
}

impl From<AddressError> for LedgerError {
    fn from(err: AddressError) -> Self {
        LedgerError::InvalidAddress(err.to_string())
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        match err {
            AmountError::Overflow(denom) => LedgerError::AmountOverflow(denom),
            other => LedgerError::InvalidCoins(other.to_string()),
        }
    }
}

/// Free and locked balances per address.
///
/// The ledger holds only the namespaces of its two record stores; the store
/// itself is passed to every call, so the caller decides which view (a
/// staged cache, a committed database) an operation runs against.
///
/// `lock` and `unlock` write both records without an internal rollback.
/// Callers must run each command against a store whose writes are committed
/// or discarded as a unit (see [`crate::storage::CacheStorage`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ledger {
    accounts: Namespace,
    locked: Namespace,
}

impl Default for Ledger {
    fn default() -> Self {
        Ledger::new(Namespace::Accounts, Namespace::Locked)
    }
}

impl Ledger {
    pub fn new(accounts: Namespace, locked: Namespace) -> Self {
        Ledger { accounts, locked }
    }

    /// Credit `amount` to the free balance. Minting rights are checked upstream.
    pub fn mint(&self, store: &dyn Storage, addr: &Address, amount: &Coins) -> Result<(), LedgerError> {
        if !changes_balance(addr, amount)? {
            return Ok(());
        }
        let mut account = self.account(store, addr)?;
        account.balance = account.balance.checked_add(amount)?;
        self.set_account(store, &account)?;
        debug!(owner = %addr, amount = %amount, balance = %account.balance, "minted");
        Ok(())
    }

    pub fn burn(&self, store: &dyn Storage, addr: &Address, amount: &Coins) -> Result<(), LedgerError> {
        if !changes_balance(addr, amount)? {
            return Ok(());
        }
        let mut account = self.account(store, addr)?;
        account.balance = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance(addr.to_hex()))?;
        self.set_account(store, &account)?;
        debug!(owner = %addr, amount = %amount, balance = %account.balance, "burned");
        Ok(())
    }

    /// Move `amount` from the free balance into the locked balance.
    pub fn lock(&self, store: &dyn Storage, addr: &Address, amount: &Coins) -> Result<(), LedgerError> {
        if !changes_balance(addr, amount)? {
            return Ok(());
        }
        let mut account = self.account(store, addr)?;
        let locked = self.locked_balance(store, addr)?;

        // Both new values are computed before the first write.
        let free = account
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance(addr.to_hex()))?;
        let locked = locked.checked_add(amount)?;

        self.set_locked(store, addr, &locked)?;
        account.balance = free;
        self.set_account(store, &account)?;
        debug!(owner = %addr, amount = %amount, locked = %locked, "locked");
        Ok(())
    }

    /// Return `amount` from the locked balance to the free balance.
    pub fn unlock(&self, store: &dyn Storage, addr: &Address, amount: &Coins) -> Result<(), LedgerError> {
        if !changes_balance(addr, amount)? {
            return Ok(());
        }
        let mut account = self.account(store, addr)?;
        let locked = self
            .locked_balance(store, addr)?
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientLockedBalance(addr.to_hex()))?;
        let free = account.balance.checked_add(amount)?;

        self.set_locked(store, addr, &locked)?;
        account.balance = free;
        self.set_account(store, &account)?;
        debug!(owner = %addr, amount = %amount, locked = %locked, "unlocked");
        Ok(())
    }

    /// Current free balance; empty when the address has no record.
    pub fn balance(&self, store: &dyn Storage, addr: &Address) -> Result<Coins, LedgerError> {
        Ok(self.account(store, addr)?.balance)
    }

    /// Current locked balance; empty when the address has no record.
    pub fn locked_balance(&self, store: &dyn Storage, addr: &Address) -> Result<Coins, LedgerError> {
        match store.get(self.locked, addr.as_bytes())? {
            None => Ok(Coins::new()),
            Some(encoded) => bincode::deserialize(&encoded).map_err(|e| malformed("locked", addr, e)),
        }
    }

    fn account(&self, store: &dyn Storage, addr: &Address) -> Result<Account, LedgerError> {
        match store.get(self.accounts, addr.as_bytes())? {
            None => Ok(Account::new(addr.clone())),
            Some(encoded) => bincode::deserialize(&encoded).map_err(|e| malformed("account", addr, e)),
        }
    }

    fn set_account(&self, store: &dyn Storage, account: &Account) -> Result<(), LedgerError> {
        account.owner.validate()?;
        let encoded = bincode::serialize(account).map_err(|e| LedgerError::SerializationError(e.to_string()))?;
        store.set(self.accounts, account.owner.as_bytes(), &encoded)?;
        Ok(())
    }

    fn set_locked(&self, store: &dyn Storage, addr: &Address, locked: &Coins) -> Result<(), LedgerError> {
        addr.validate()?;
        let encoded = bincode::serialize(locked).map_err(|e| LedgerError::SerializationError(e.to_string()))?;
        store.set(self.locked, addr.as_bytes(), &encoded)?;
        Ok(())
    }
}

/// Checks shared by every mutation. Negative entries are refused so no
/// balance can go below zero; an all-zero amount is a no-op and writes
/// nothing.
fn changes_balance(addr: &Address, amount: &Coins) -> Result<bool, LedgerError> {
    addr.validate()?;
    if amount.is_any_negative() {
        return Err(LedgerError::NonPositiveAmount);
    }
    Ok(!amount.is_zero())
}

fn malformed(kind: &'static str, owner: &Address, err: bincode::Error) -> LedgerError {
    error!(kind, owner = %owner, error = %err, "undecodable record in store");
    LedgerError::MalformedRecord {
        kind,
        owner: owner.to_hex(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::ADDRESS_LEN;

    fn addr(byte: u8) -> Address {
        Address::new(vec![byte; ADDRESS_LEN])
    }

    fn coins(text: &str) -> Coins {
        text.parse().unwrap()
    }

    #[test]
    fn test_lock_unlock_scenario() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(1);

        assert!(ledger.balance(&store, &a).unwrap().is_zero());

        ledger.mint(&store, &a, &coins("100coin")).unwrap();
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("100coin"));

        ledger.lock(&store, &a, &coins("60coin")).unwrap();
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("40coin"));
        assert_eq!(ledger.locked_balance(&store, &a).unwrap(), coins("60coin"));

        ledger.unlock(&store, &a, &coins("60coin")).unwrap();
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("100coin"));
        let locked = ledger.locked_balance(&store, &a).unwrap();
        assert!(locked.is_zero());
        assert_eq!(locked.amount_of("coin"), 0);
        // The emptied locked record stays in the store
        assert!(store.has(Namespace::Locked, a.as_bytes()).unwrap());
    }

    #[test]
    fn test_burn_insufficient_leaves_state() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(2);
        ledger.mint(&store, &a, &coins("40coin")).unwrap();

        let err = ledger.burn(&store, &a, &coins("50coin")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("40coin"));
        assert!(ledger.locked_balance(&store, &a).unwrap().is_zero());
    }

    #[test]
    fn test_burn_checks_every_denomination() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(3);
        ledger.mint(&store, &a, &coins("100coin,5atom")).unwrap();

        let err = ledger.burn(&store, &a, &coins("10coin,6atom")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("100coin,5atom"));
    }

    #[test]
    fn test_mint_then_burn_round_trip() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(4);
        ledger.mint(&store, &a, &coins("7atom")).unwrap();
        let before = ledger.balance(&store, &a).unwrap();

        ledger.mint(&store, &a, &coins("30coin,3atom")).unwrap();
        ledger.burn(&store, &a, &coins("30coin,3atom")).unwrap();
        assert_eq!(ledger.balance(&store, &a).unwrap(), before);
    }

    #[test]
    fn test_lock_without_funds_creates_no_record() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let b = addr(5);

        let err = ledger.lock(&store, &b, &coins("1000coin")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance(_)));
        assert!(!store.has(Namespace::Locked, b.as_bytes()).unwrap());
        assert!(!store.has(Namespace::Accounts, b.as_bytes()).unwrap());
    }

    #[test]
    fn test_unlock_more_than_locked() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(6);
        ledger.mint(&store, &a, &coins("10coin")).unwrap();
        ledger.lock(&store, &a, &coins("4coin")).unwrap();

        let err = ledger.unlock(&store, &a, &coins("5coin")).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientLockedBalance(_)));
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("6coin"));
        assert_eq!(ledger.locked_balance(&store, &a).unwrap(), coins("4coin"));
    }

    #[test]
    fn test_reads_do_not_materialize_records() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        ledger.balance(&store, &addr(7)).unwrap();
        ledger.locked_balance(&store, &addr(7)).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_writes_for_invalid_address_are_rejected() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();

        let err = ledger.mint(&store, &Address::default(), &coins("1coin")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
        let err = ledger.mint(&store, &Address::new(vec![1, 2, 3]), &coins("1coin")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_malformed_record_is_fatal() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(8);
        store.set(Namespace::Accounts, a.as_bytes(), &[0xff, 0x01]).unwrap();

        let err = ledger.balance(&store, &a).unwrap_err();
        assert!(matches!(err, LedgerError::MalformedRecord { kind: "account", .. }));
        assert!(err.is_fatal());
        assert!(!LedgerError::NonPositiveAmount.is_fatal());
    }

    #[test]
    fn test_negative_amounts_are_refused() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(10);

        let err = ledger.mint(&store, &a, &coins("-5coin")).unwrap_err();
        assert!(matches!(err, LedgerError::NonPositiveAmount));
        assert!(store.is_empty().unwrap());

        ledger.mint(&store, &a, &coins("10coin")).unwrap();
        for amount in ["-3coin", "2coin,-1atom"] {
            let err = ledger.mint(&store, &a, &coins(amount)).unwrap_err();
            assert!(matches!(err, LedgerError::NonPositiveAmount), "{amount}");
            let err = ledger.burn(&store, &a, &coins(amount)).unwrap_err();
            assert!(matches!(err, LedgerError::NonPositiveAmount), "{amount}");
            let err = ledger.unlock(&store, &a, &coins(amount)).unwrap_err();
            assert!(matches!(err, LedgerError::NonPositiveAmount), "{amount}");
        }
        assert_eq!(ledger.balance(&store, &a).unwrap(), coins("10coin"));
        assert!(!store.has(Namespace::Locked, a.as_bytes()).unwrap());
    }

    #[test]
    fn test_zero_amounts_write_nothing() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(11);

        ledger.mint(&store, &a, &Coins::new()).unwrap();
        ledger.mint(&store, &a, &coins("0coin")).unwrap();
        ledger.lock(&store, &a, &coins("0coin")).unwrap();
        ledger.unlock(&store, &a, &Coins::new()).unwrap();
        ledger.burn(&store, &a, &coins("0atom")).unwrap();
        assert!(store.is_empty().unwrap());

        // Still an invalid target even when nothing would be written
        let err = ledger.mint(&store, &Address::default(), &Coins::new()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAddress(_)));
    }

    #[test]
    fn test_mint_overflow_is_rejected_before_write() {
        let store = MemoryStorage::new();
        let ledger = Ledger::default();
        let a = addr(9);
        let max = Coins::single("coin", i128::MAX).unwrap();
        ledger.mint(&store, &a, &max).unwrap();

        let err = ledger.mint(&store, &a, &coins("1coin")).unwrap_err();
        assert!(matches!(err, LedgerError::AmountOverflow(_)));
        assert_eq!(ledger.balance(&store, &a).unwrap(), max);
    }
}
