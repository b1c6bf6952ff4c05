//! Account tiers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Priority tier of a monitored account.
///
/// Serialized as its number (`1` or `2`).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum AccountTier {
    /// Highest value accounts
    #[display("1")]
    Primary,
    /// Everything else
    #[default]
    #[display("2")]
    Secondary,
}

impl AccountTier {
    /// Numeric tier.
    pub fn number(self) -> u8 {
        match self {
            Self::Primary => 1,
            Self::Secondary => 2,
        }
    }
}

impl From<AccountTier> for u8 {
    fn from(tier: AccountTier) -> Self {
        tier.number()
    }
}

impl TryFrom<u8> for AccountTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Primary),
            2 => Ok(Self::Secondary),
            other => Err(format!("account tier must be 1 or 2, got {}", other)),
        }
    }
}

/// Case-insensitive map from account handle to tier.
///
/// Accounts not in the map are [`AccountTier::Secondary`].
///
/// # Examples
///
/// ```
/// use vigil_core::{AccountTier, AccountTierMap};
///
/// let tiers = AccountTierMap::from_lists(["VitalikButerin"], ["AzFlin"]);
/// assert_eq!(tiers.tier_of("vitalikbuterin"), AccountTier::Primary);
/// assert_eq!(tiers.tier_of("someone_else"), AccountTier::Secondary);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountTierMap {
    tiers: HashMap<String, AccountTier>,
}

impl AccountTierMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from tier-1 and tier-2 handle lists.
    ///
    /// A handle listed in both keeps tier 1.
    pub fn from_lists<P, S>(primary: P, secondary: S) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let mut map = Self::new();
        for handle in secondary {
            map.insert(handle.as_ref(), AccountTier::Secondary);
        }
        for handle in primary {
            map.insert(handle.as_ref(), AccountTier::Primary);
        }
        map
    }

    /// Assign a tier to a handle.
    pub fn insert(&mut self, handle: &str, tier: AccountTier) {
        self.tiers.insert(handle.to_lowercase(), tier);
    }

    /// Tier of a handle.
    pub fn tier_of(&self, handle: &str) -> AccountTier {
        self.tiers
            .get(&handle.to_lowercase())
            .copied()
            .unwrap_or_default()
    }

    /// True when the handle has an explicit tier.
    pub fn contains(&self, handle: &str) -> bool {
        self.tiers.contains_key(&handle.to_lowercase())
    }

    /// Number of mapped handles.
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    /// True when no handle is mapped.
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}
