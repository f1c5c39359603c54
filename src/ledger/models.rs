//! Persisted entities of the economy ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EconomyError;

/// Externally issued chat user identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| EconomyError::invalid(format!("'{s}' is not a user id")))
    }
}

/// Display profile supplied by the chat front-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Profile {
    /// Creates a profile with only a first name.
    #[must_use]
    pub fn named(first_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            ..Self::default()
        }
    }
}

/// A boolean status paired with an optional expiry.
///
/// `until = None` on an active flag means it never expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlag {
    pub active: bool,
    pub until: Option<DateTime<Utc>>,
}

impl StatusFlag {
    /// An active flag that expires at `until`.
    #[must_use]
    pub const fn until(until: DateTime<Utc>) -> Self {
        Self {
            active: true,
            until: Some(until),
        }
    }

    /// An active flag that never expires.
    #[must_use]
    pub const fn permanent() -> Self {
        Self {
            active: true,
            until: None,
        }
    }

    /// Whether the flag is in effect at `now`.
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.until.is_none_or(|until| until > now)
    }
}

/// Status flags an account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Vip,
    Premium,
    DoubleBonus,
    ColorNick,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vip => "VIP",
            Self::Premium => "Premium",
            Self::DoubleBonus => "double bonus",
            Self::ColorNick => "color nick",
        };
        f.write_str(name)
    }
}

/// Result of granting experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    /// Whether at least one promotion happened.
    pub leveled_up: bool,
    /// Level after the grant.
    pub level: u32,
}

/// Rank titles by minimum level, ascending.
const RANKS: [(u32, &str); 8] = [
    (1, "Newbie"),
    (5, "Warrior"),
    (10, "Knight"),
    (20, "King"),
    (30, "Legend"),
    (50, "Mythic"),
    (75, "Divine"),
    (100, "Creator"),
];

/// A user's persistent economic state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub profile: Profile,
    pub balance: i64,
    pub xp: u64,
    pub level: u32,
    pub referrer: Option<UserId>,
    pub referral_count: u32,
    pub games_played: u64,
    pub games_won: u64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub vip: StatusFlag,
    pub premium: StatusFlag,
    pub double_bonus: StatusFlag,
    pub color_nick: StatusFlag,
    pub last_daily: Option<DateTime<Utc>>,
    pub banned: bool,
    pub notifications: bool,
    pub registered_at: DateTime<Utc>,
}

impl Account {
    /// Creates a fresh level-1 account.
    #[must_use]
    pub fn new(
        id: UserId,
        profile: Profile,
        referrer: Option<UserId>,
        starting_balance: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            profile,
            balance: starting_balance,
            xp: 0,
            level: 1,
            referrer,
            referral_count: 0,
            games_played: 0,
            games_won: 0,
            total_earned: 0,
            total_spent: 0,
            vip: StatusFlag::default(),
            premium: StatusFlag::default(),
            double_bonus: StatusFlag::default(),
            color_nick: StatusFlag::default(),
            last_daily: None,
            banned: false,
            notifications: true,
            registered_at: now,
        }
    }

    /// XP needed to leave the current level.
    #[must_use]
    pub const fn xp_for_next_level(&self) -> u64 {
        self.level as u64 * 100
    }

    /// Adds experience and promotes while the current level's cost is covered.
    ///
    /// Each promotion consumes `level * 100` XP, so levels are never skipped.
    pub fn grant_experience(&mut self, amount: u64) -> LevelUp {
        let start = self.level;
        self.xp = self.xp.saturating_add(amount);
        while self.xp >= self.xp_for_next_level() {
            self.xp -= self.xp_for_next_level();
            self.level += 1;
        }
        LevelUp {
            leveled_up: self.level > start,
            level: self.level,
        }
    }

    /// Rank title for the current level.
    #[must_use]
    pub fn rank(&self) -> &'static str {
        RANKS
            .iter()
            .rev()
            .find(|(min, _)| self.level >= *min)
            .map_or(RANKS[0].1, |&(_, title)| title)
    }

    #[must_use]
    pub const fn status(&self, kind: StatusKind) -> &StatusFlag {
        match kind {
            StatusKind::Vip => &self.vip,
            StatusKind::Premium => &self.premium,
            StatusKind::DoubleBonus => &self.double_bonus,
            StatusKind::ColorNick => &self.color_nick,
        }
    }

    pub fn status_mut(&mut self, kind: StatusKind) -> &mut StatusFlag {
        match kind {
            StatusKind::Vip => &mut self.vip,
            StatusKind::Premium => &mut self.premium,
            StatusKind::DoubleBonus => &mut self.double_bonus,
            StatusKind::ColorNick => &mut self.color_nick,
        }
    }
}

/// Typed partial update of an account.
///
/// Balance only moves through ledger entries, so it has no field here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountPatch {
    pub profile: Option<Profile>,
    pub notifications: Option<bool>,
    pub banned: Option<bool>,
    pub games_played: Option<u64>,
    pub games_won: Option<u64>,
    pub referral_count: Option<u32>,
    pub last_daily: Option<Option<DateTime<Utc>>>,
    pub status: Vec<(StatusKind, StatusFlag)>,
}

impl AccountPatch {
    /// Applies every set field to `account`.
    pub fn apply(self, account: &mut Account) {
        if let Some(profile) = self.profile {
            account.profile = profile;
        }
        if let Some(notifications) = self.notifications {
            account.notifications = notifications;
        }
        if let Some(banned) = self.banned {
            account.banned = banned;
        }
        if let Some(played) = self.games_played {
            account.games_played = played;
        }
        if let Some(won) = self.games_won {
            account.games_won = won;
        }
        if let Some(count) = self.referral_count {
            account.referral_count = count;
        }
        if let Some(last_daily) = self.last_daily {
            account.last_daily = last_daily;
        }
        for (kind, flag) in self.status {
            *account.status_mut(kind) = flag;
        }
    }
}

/// Immutable ledger entry for one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub account: UserId,
    pub amount: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Redeemable code with a global usage cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoCode {
    /// Normalized upper-case code.
    pub code: String,
    pub reward: i64,
    pub max_uses: u32,
    pub current_uses: u32,
    pub created_by: UserId,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PromoCode {
    /// Normalizes raw user input into the stored code form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for empty codes or codes containing whitespace.
    pub fn normalize(raw: &str) -> Result<String, EconomyError> {
        let code = raw.trim();
        if code.is_empty() {
            return Err(EconomyError::invalid("promo code is empty"));
        }
        if code.chars().any(char::is_whitespace) {
            return Err(EconomyError::invalid("promo code must be a single word"));
        }
        Ok(code.to_uppercase())
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| now > expires)
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.current_uses >= self.max_uses
    }
}

/// Record of one account redeeming one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoRedemption {
    pub account: UserId,
    pub code: String,
    pub used_at: DateTime<Utc>,
}

/// One purchased shop item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub account: UserId,
    pub item_id: String,
    pub item_name: String,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

/// Support request from a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: u64,
    pub account: UserId,
    pub message: String,
    pub status: TicketStatus,
    pub admin_reply: Option<String>,
    pub created_at: DateTime<Utc>,
    pub replied_at: Option<DateTime<Utc>>,
}

/// Leaderboard ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopOrder {
    Balance,
    Level,
    GamesWon,
    Referrals,
}

impl FromStr for TopOrder {
    type Err = EconomyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "balance" => Ok(Self::Balance),
            "level" => Ok(Self::Level),
            "games" | "games_won" => Ok(Self::GamesWon),
            "referrals" => Ok(Self::Referrals),
            other => Err(EconomyError::invalid(format!("unknown leaderboard '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn account() -> Account {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Account::new(UserId(1), Profile::named("Ann"), None, 100, now)
    }

    #[test]
    fn test_grant_experience_consumes_per_level_cost() {
        let mut acc = account();
        let result = acc.grant_experience(250);
        // 1->2 costs 100, 2->3 would cost 200
        assert_eq!(result, LevelUp { leveled_up: true, level: 2 });
        assert_eq!(acc.xp, 150);
    }

    #[test]
    fn test_grant_experience_exact_thresholds() {
        let mut acc = account();
        let result = acc.grant_experience(300);
        assert_eq!(result.level, 3);
        assert_eq!(acc.xp, 0);
    }

    #[test]
    fn test_grant_experience_large_amount_never_skips() {
        let mut acc = account();
        // sum of 100 * (1..=9) = 4500 reaches level 10
        let result = acc.grant_experience(4500 + 999);
        assert_eq!(result.level, 10);
        assert_eq!(acc.xp, 999);
    }

    #[test]
    fn test_grant_experience_without_promotion() {
        let mut acc = account();
        let result = acc.grant_experience(99);
        assert!(!result.leveled_up);
        assert_eq!(result.level, 1);
    }

    #[test]
    fn test_rank_thresholds() {
        let mut acc = account();
        assert_eq!(acc.rank(), "Newbie");
        acc.level = 5;
        assert_eq!(acc.rank(), "Warrior");
        acc.level = 49;
        assert_eq!(acc.rank(), "Legend");
        acc.level = 120;
        assert_eq!(acc.rank(), "Creator");
    }

    #[test]
    fn test_status_flag_expiry() {
        let now = Utc::now();
        assert!(!StatusFlag::default().is_active_at(now));
        assert!(StatusFlag::permanent().is_active_at(now));
        assert!(StatusFlag::until(now + Duration::hours(1)).is_active_at(now));
        assert!(!StatusFlag::until(now).is_active_at(now));
    }

    #[test]
    fn test_patch_applies_only_set_fields() {
        let mut acc = account();
        let patch = AccountPatch {
            banned: Some(true),
            status: vec![(StatusKind::ColorNick, StatusFlag::permanent())],
            ..AccountPatch::default()
        };
        patch.apply(&mut acc);
        assert!(acc.banned);
        assert!(acc.color_nick.active);
        assert!(acc.notifications);
        assert_eq!(acc.balance, 100);
    }

    #[test]
    fn test_promo_code_normalize() {
        assert_eq!(PromoCode::normalize("  bonus500 ").unwrap(), "BONUS500");
        assert!(PromoCode::normalize("   ").is_err());
        assert!(PromoCode::normalize("two words").is_err());
    }

    #[test]
    fn test_user_id_parse() {
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert!(matches!(
            "abc".parse::<UserId>(),
            Err(EconomyError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_top_order_parse() {
        assert_eq!("games".parse::<TopOrder>().unwrap(), TopOrder::GamesWon);
        assert!("xp".parse::<TopOrder>().is_err());
    }
}
