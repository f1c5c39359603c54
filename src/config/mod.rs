//! Configuration module for the economy service.
//!
//! Handles loading and validation of the economy tuning file and the
//! process settings taken from the environment.

mod economy;
mod settings;

pub use economy::{
    BonusRange, EconomyConfig, EconomyConfigError, ItemEffect, ReferralBonus, ShopItem, XpAwards,
};
pub use settings::{BotSettings, ConfigError, parse_admin_ids};

/// Length of the daily bonus cooldown in seconds.
pub const DAILY_COOLDOWN_SECS: i64 = 24 * 3600;
