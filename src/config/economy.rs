//! Economy tuning: bonus ranges, payouts, shop catalog and admin list.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EconomyError;
use crate::ledger::{StatusKind, UserId};

/// Errors that can occur while loading or validating an economy config.
#[derive(Debug, Error)]
pub enum EconomyConfigError {
    #[error("Daily bonus range is invalid: min {min} > max {max} or negative")]
    InvalidBonusRange { min: i64, max: i64 },

    #[error("{field} must be positive (got {value})")]
    NonPositive { field: String, value: i64 },

    #[error("No stake tiers configured")]
    NoStakeTiers,

    #[error("Duplicate shop item ID found: {id}")]
    DuplicateItem { id: String },

    #[error("Shop item {id} has an invalid lootbox range: {min}..={max}")]
    InvalidLootbox { id: String, min: i64, max: i64 },

    #[error("Shop item {id} grants a status for zero days")]
    ZeroDuration { id: String },

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Inclusive range the daily base bonus is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusRange {
    pub min: i64,
    pub max: i64,
}

/// Coins credited when a referred user registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralBonus {
    pub inviter: i64,
    pub invited: i64,
}

/// Experience granted per activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XpAwards {
    pub daily: u64,
    pub promo: u64,
    pub purchase: u64,
    pub game_win: u64,
    pub game_loss: u64,
}

impl Default for XpAwards {
    fn default() -> Self {
        Self {
            daily: 20,
            promo: 10,
            purchase: 25,
            game_win: 15,
            game_loss: 5,
        }
    }
}

/// What buying a shop item does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Activates a status flag for a number of days.
    Status { status: StatusKind, days: u32 },
    /// Credits a random amount from an inclusive range.
    Lootbox { min: i64, max: i64 },
    /// Activates a status flag permanently.
    Cosmetic { status: StatusKind },
}

/// A purchasable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    pub effect: ItemEffect,
}

impl ShopItem {
    fn new(id: &str, name: &str, description: &str, price: i64, effect: ItemEffect) -> Self {
        Self {
            id: id.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
            price,
            effect,
        }
    }
}

/// Immutable economy configuration shared by every engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// Balance of a freshly registered account.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: i64,

    #[serde(default = "default_daily_bonus")]
    pub daily_bonus: BonusRange,

    #[serde(default = "default_referral")]
    pub referral: ReferralBonus,

    #[serde(default)]
    pub xp: XpAwards,

    /// Stakes offered by the front-end. The engine accepts any positive stake.
    #[serde(default = "default_stake_tiers")]
    pub stake_tiers: Vec<i64>,

    #[serde(default = "default_shop")]
    pub shop: Vec<ShopItem>,

    /// Users allowed to run admin operations.
    #[serde(default)]
    pub admins: Vec<UserId>,
}

fn default_starting_balance() -> i64 {
    100
}

fn default_daily_bonus() -> BonusRange {
    BonusRange { min: 50, max: 200 }
}

fn default_referral() -> ReferralBonus {
    ReferralBonus {
        inviter: 150,
        invited: 100,
    }
}

fn default_stake_tiers() -> Vec<i64> {
    vec![10, 50, 100, 250, 500, 1000]
}

fn default_shop() -> Vec<ShopItem> {
    vec![
        ShopItem::new(
            "vip",
            "VIP Status",
            "VIP status for 30 days",
            5000,
            ItemEffect::Status { status: StatusKind::Vip, days: 30 },
        ),
        ShopItem::new(
            "premium",
            "Premium Status",
            "Premium status for 30 days",
            10000,
            ItemEffect::Status { status: StatusKind::Premium, days: 30 },
        ),
        ShopItem::new(
            "lootbox",
            "Lootbox",
            "Random prize from 100 to 1000 coins",
            500,
            ItemEffect::Lootbox { min: 100, max: 1000 },
        ),
        ShopItem::new(
            "nickname_color",
            "Colored Nickname",
            "Unique colored nickname in your profile",
            2000,
            ItemEffect::Cosmetic { status: StatusKind::ColorNick },
        ),
        ShopItem::new(
            "double_daily",
            "Double Bonus",
            "Doubled daily bonus for 7 days",
            3000,
            ItemEffect::Status { status: StatusKind::DoubleBonus, days: 7 },
        ),
    ]
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            daily_bonus: default_daily_bonus(),
            referral: default_referral(),
            xp: XpAwards::default(),
            stake_tiers: default_stake_tiers(),
            shop: default_shop(),
            admins: Vec::new(),
        }
    }
}

impl EconomyConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, EconomyConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), EconomyConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Creates an example configuration with the stock catalog.
    #[must_use]
    pub fn example() -> Self {
        Self {
            admins: vec![UserId(123_456_789)],
            ..Self::default()
        }
    }

    /// Adds admins not already listed.
    #[must_use]
    pub fn with_admins(mut self, admins: impl IntoIterator<Item = UserId>) -> Self {
        for admin in admins {
            if !self.admins.contains(&admin) {
                self.admins.push(admin);
            }
        }
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), EconomyConfigError> {
        self.validate_all().into_iter().next().map_or(Ok(()), Err)
    }

    /// Returns every validation problem in the configuration.
    #[must_use]
    pub fn validate_all(&self) -> Vec<EconomyConfigError> {
        let mut errors = Vec::new();

        let BonusRange { min, max } = self.daily_bonus;
        if min < 0 || min > max {
            errors.push(EconomyConfigError::InvalidBonusRange { min, max });
        }

        let amounts = [
            ("starting_balance", self.starting_balance),
            ("referral.inviter", self.referral.inviter),
            ("referral.invited", self.referral.invited),
        ];
        for (field, value) in amounts {
            if value < 0 {
                errors.push(EconomyConfigError::NonPositive {
                    field: field.to_owned(),
                    value,
                });
            }
        }

        if self.stake_tiers.is_empty() {
            errors.push(EconomyConfigError::NoStakeTiers);
        }
        for &tier in &self.stake_tiers {
            if tier <= 0 {
                errors.push(EconomyConfigError::NonPositive {
                    field: "stake_tiers".to_owned(),
                    value: tier,
                });
            }
        }

        let mut seen_ids = HashSet::new();
        for item in &self.shop {
            if !seen_ids.insert(item.id.as_str()) {
                errors.push(EconomyConfigError::DuplicateItem { id: item.id.clone() });
            }
            if item.price <= 0 {
                errors.push(EconomyConfigError::NonPositive {
                    field: format!("shop.{}.price", item.id),
                    value: item.price,
                });
            }
            match item.effect {
                ItemEffect::Lootbox { min, max } if min <= 0 || min > max => {
                    errors.push(EconomyConfigError::InvalidLootbox {
                        id: item.id.clone(),
                        min,
                        max,
                    });
                }
                ItemEffect::Status { days: 0, .. } => {
                    errors.push(EconomyConfigError::ZeroDuration { id: item.id.clone() });
                }
                _ => {}
            }
        }

        errors
    }

    /// Whether `user` may run admin operations.
    #[must_use]
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admins.contains(&user)
    }

    /// Fails with `Forbidden` unless `actor` is an admin.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for non-admin actors.
    pub fn authorize(&self, actor: UserId) -> Result<(), EconomyError> {
        if self.is_admin(actor) {
            Ok(())
        } else {
            Err(EconomyError::Forbidden)
        }
    }

    /// Looks up a shop item by id.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&ShopItem> {
        self.shop.iter().find(|item| item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_stock_economy() {
        let config = EconomyConfig::default();
        assert_eq!(config.starting_balance, 100);
        assert_eq!(config.daily_bonus, BonusRange { min: 50, max: 200 });
        assert_eq!(config.stake_tiers, vec![10, 50, 100, 250, 500, 1000]);
        assert_eq!(config.shop.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_shop_item() {
        let mut config = EconomyConfig::default();
        let dup = config.shop[0].clone();
        config.shop.push(dup);
        assert!(matches!(
            config.validate(),
            Err(EconomyConfigError::DuplicateItem { .. })
        ));
    }

    #[test]
    fn test_inverted_bonus_range() {
        let config = EconomyConfig {
            daily_bonus: BonusRange { min: 300, max: 200 },
            ..EconomyConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EconomyConfigError::InvalidBonusRange { .. })
        ));
    }

    #[test]
    fn test_validate_all_collects_every_problem() {
        let mut config = EconomyConfig {
            stake_tiers: Vec::new(),
            ..EconomyConfig::default()
        };
        config.shop[2].effect = ItemEffect::Lootbox { min: 10, max: 5 };
        config.shop[0].price = 0;
        assert_eq!(config.validate_all().len(), 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EconomyConfig =
            serde_json::from_str(r#"{"starting_balance": 250, "admins": [42]}"#).unwrap();
        assert_eq!(config.starting_balance, 250);
        assert_eq!(config.shop.len(), 5);
        assert!(config.is_admin(UserId(42)));
    }

    #[test]
    fn test_authorize() {
        let config = EconomyConfig::default().with_admins([UserId(1), UserId(1)]);
        assert_eq!(config.admins, vec![UserId(1)]);
        assert!(config.authorize(UserId(1)).is_ok());
        assert_eq!(config.authorize(UserId(2)), Err(EconomyError::Forbidden));
    }

    #[test]
    fn test_item_lookup() {
        let config = EconomyConfig::default();
        assert_eq!(config.item("lootbox").map(|i| i.price), Some(500));
        assert!(config.item("rocket").is_none());
    }
}
