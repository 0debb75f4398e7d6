//! Core type definitions for the token ledger.
//!
//! This module contains the value types shared by every layer of the
//! ledger: account addresses, multi-denomination amounts, and the records
//! persisted for each address.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length in bytes of a well-formed address.
pub const ADDRESS_LEN: usize = 20;

/// Errors produced while constructing or parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,
    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
    #[error("address is not valid hex: {0}")]
    InvalidHex(String),
}

/// Errors produced by amount parsing and arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("invalid denomination: {0:?}")]
    InvalidDenom(String),
    #[error("invalid coin expression: {0:?}")]
    InvalidCoin(String),
    #[error("duplicate denomination: {0}")]
    DuplicateDenom(String),
    #[error("amount overflow in denomination {0}")]
    Overflow(String),
}

/// Raw address bytes identifying an account.
///
/// An `Address` may hold any byte string so that malformed input can reach
/// the command validator and be rejected there. Use [`Address::validate`]
/// before trusting it as a store key.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(Vec<u8>);

impl Address {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Address(bytes.into())
    }

    /// Derive an address from an ed25519 public key: the first
    /// [`ADDRESS_LEN`] bytes of its SHA-256 digest.
    pub fn from_public_key(key: &VerifyingKey) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Address(digest[..ADDRESS_LEN].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), AddressError> {
        match self.0.len() {
            0 => Err(AddressError::Empty),
            ADDRESS_LEN => Ok(()),
            n => Err(AddressError::InvalidLength(n)),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        let bytes = hex::decode(s).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
        let address = Address(bytes);
        address.validate()?;
        Ok(address)
    }
}

// Hex text in human-readable formats (JSON), raw bytes otherwise (bincode).
impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
            Ok(Address(bytes))
        } else {
            Vec::<u8>::deserialize(deserializer).map(Address)
        }
    }
}

/// A single denomination and its quantity.
///
/// Fields are declared in JSON key order; signing bytes rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub amount: i128,
    pub denom: String,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: i128) -> Self {
        Coin {
            denom: denom.into(),
            amount,
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Denominations are 3 to 16 characters: a lowercase letter followed by
/// lowercase letters or digits.
pub fn validate_denom(denom: &str) -> Result<(), AmountError> {
    let mut chars = denom.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if leading_ok && rest_ok && (3..=16).contains(&denom.len()) {
        Ok(())
    } else {
        Err(AmountError::InvalidDenom(denom.to_string()))
    }
}

/// A multi-denomination amount (the "amount set").
///
/// Arithmetic is componentwise over the union of denominations, with a
/// missing denomination read as zero. Results of [`Coins::checked_add`] and
/// [`Coins::checked_sub`] are normalized: zero entries are dropped, so an
/// all-zero result equals [`Coins::new`].
///
/// Values built from external input keep zero and negative entries as
/// given; they are rejected by command validation, not here. Equality
/// ignores that difference: `{coin: 0}` equals the empty set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(BTreeMap<String, i128>);

impl Coins {
    pub fn new() -> Self {
        Coins(BTreeMap::new())
    }

    /// Build from a list of coins, rejecting bad denominations and
    /// duplicates. Amounts are taken verbatim.
    pub fn from_coins(coins: impl IntoIterator<Item = Coin>) -> Result<Self, AmountError> {
        let mut map = BTreeMap::new();
        for coin in coins {
            validate_denom(&coin.denom)?;
            if map.contains_key(&coin.denom) {
                return Err(AmountError::DuplicateDenom(coin.denom));
            }
            map.insert(coin.denom, coin.amount);
        }
        Ok(Coins(map))
    }

    pub fn single(denom: impl Into<String>, amount: i128) -> Result<Self, AmountError> {
        Self::from_coins([Coin::new(denom, amount)])
    }

    pub fn amount_of(&self, denom: &str) -> i128 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    /// True when no denomination is present at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when every denomination is zero (including the empty set).
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|amount| *amount == 0)
    }

    pub fn is_any_negative(&self) -> bool {
        self.0.values().any(|amount| *amount < 0)
    }

    /// True when the set is non-empty and every entry is strictly positive.
    pub fn is_all_positive(&self) -> bool {
        !self.0.is_empty() && self.0.values().all(|amount| *amount > 0)
    }

    /// Componentwise `self >= other` over the union of denominations.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        self.denoms_with(other)
            .all(|denom| self.amount_of(denom) >= other.amount_of(denom))
    }

    pub fn checked_add(&self, other: &Coins) -> Result<Coins, AmountError> {
        let mut result = BTreeMap::new();
        for denom in self.denoms_with(other) {
            let sum = self
                .amount_of(denom)
                .checked_add(other.amount_of(denom))
                .ok_or_else(|| AmountError::Overflow(denom.to_string()))?;
            if sum != 0 {
                result.insert(denom.to_string(), sum);
            }
        }
        Ok(Coins(result))
    }

    /// Subtract `other`, or `None` if any denomination would go negative.
    /// Nothing is partially applied.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut result = BTreeMap::new();
        for denom in self.denoms_with(other) {
            let diff = self.amount_of(denom).checked_sub(other.amount_of(denom))?;
            if diff < 0 {
                return None;
            }
            if diff != 0 {
                result.insert(denom.to_string(), diff);
            }
        }
        Some(Coins(result))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i128)> {
        self.0.iter().map(|(denom, amount)| (denom.as_str(), *amount))
    }

    fn denoms_with<'a>(&'a self, other: &'a Coins) -> impl Iterator<Item = &'a str> {
        let mut denoms: Vec<&str> = self.0.keys().chain(other.0.keys()).map(String::as_str).collect();
        denoms.sort_unstable();
        denoms.dedup();
        denoms.into_iter()
    }
}

impl PartialEq for Coins {
    fn eq(&self, other: &Coins) -> bool {
        self.denoms_with(other)
            .all(|denom| self.amount_of(denom) == other.amount_of(denom))
    }
}

impl Eq for Coins {}

impl TryFrom<Vec<Coin>> for Coins {
    type Error = AmountError;

    fn try_from(coins: Vec<Coin>) -> Result<Self, Self::Error> {
        Coins::from_coins(coins)
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins
            .0
            .into_iter()
            .map(|(denom, amount)| Coin { denom, amount })
            .collect()
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .iter()
            .map(|(denom, amount)| format!("{amount}{denom}"))
            .collect();
        f.write_str(&parts.join(","))
    }
}

/// Parses the comma separated form used on the command line,
/// e.g. `"100coin,5atom"`. The empty string parses to an empty set.
impl FromStr for Coins {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Coins::new());
        }
        let coins = s
            .split(',')
            .map(|part| parse_coin(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Coins::from_coins(coins)
    }
}

/// One `<amount><denom>` term. The amount is a plain decimal integer with
/// an optional leading `-`.
fn parse_coin(text: &str) -> Result<Coin, AmountError> {
    let invalid = || AmountError::InvalidCoin(text.to_string());
    let digits_from = usize::from(text.starts_with('-'));
    let split = text[digits_from..]
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| i + digits_from)
        .ok_or_else(invalid)?;
    let (amount, denom) = text.split_at(split);
    let denom = denom.trim_start();

    // `1e5coin` is exponent notation, not one unit of `e5coin`.
    let mut chars = denom.chars();
    if matches!(chars.next(), Some('e' | 'E'))
        && chars.next().is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-')
    {
        return Err(invalid());
    }

    let amount: i128 = amount.parse().map_err(|_| invalid())?;
    validate_denom(denom)?;
    Ok(Coin::new(denom, amount))
}

/// The free-balance record stored under an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub owner: Address,
    pub balance: Coins,
}

impl Account {
    /// A fresh, zero-balance account. Never written until it changes.
    pub fn new(owner: Address) -> Self {
        Account {
            owner,
            balance: Coins::new(),
        }
    }
}
