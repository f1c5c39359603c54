//! Chance-based mini-games with fixed payout tables.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ensure_active;
use super::random::SharedRandom;
use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::ledger::{LedgerStore, LevelUp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinSide {
    Heads,
    Tails,
}

impl CoinSide {
    const fn from_draw(draw: i64) -> Self {
        if draw == 0 { Self::Heads } else { Self::Tails }
    }
}

/// A game together with the player's choice, where the game has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    Dice,
    Coin(CoinSide),
    Slots,
    NumberGuess(u8),
    Darts,
    Football,
    Basketball,
    Bowling,
}

impl GameKind {
    /// Inclusive draw domain.
    const fn domain(self) -> (i64, i64) {
        match self {
            Self::Coin(_) => (0, 1),
            Self::Slots => (1, 64),
            Self::NumberGuess(_) => (1, 10),
            Self::Dice | Self::Darts | Self::Football | Self::Basketball | Self::Bowling => (1, 6),
        }
    }

    fn validate(self) -> Result<(), EconomyError> {
        match self {
            Self::NumberGuess(guess) if !(1..=10).contains(&guess) => Err(EconomyError::invalid(
                format!("guess must be between 1 and 10, got {guess}"),
            )),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dice => "dice",
            Self::Coin(_) => "coin",
            Self::Slots => "slots",
            Self::NumberGuess(_) => "number guess",
            Self::Darts => "darts",
            Self::Football => "football",
            Self::Basketball => "basketball",
            Self::Bowling => "bowling",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeTier {
    Jackpot,
    Win,
    Bullseye,
    Strike,
    Hit,
    Lose,
}

/// One resolved round before settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub draw: i64,
    pub won: bool,
    /// Zero on a loss.
    pub multiplier: i64,
    pub tier: OutcomeTier,
}

impl Resolution {
    const fn win(draw: i64, tier: OutcomeTier, multiplier: i64) -> Self {
        Self {
            draw,
            won: true,
            multiplier,
            tier,
        }
    }

    const fn lose(draw: i64) -> Self {
        Self {
            draw,
            won: false,
            multiplier: 0,
            tier: OutcomeTier::Lose,
        }
    }
}

/// Maps a draw onto the payout table of `kind`.
#[must_use]
pub fn payout(kind: GameKind, draw: i64) -> Resolution {
    use OutcomeTier::{Bullseye, Hit, Jackpot, Strike, Win};

    match kind {
        GameKind::Dice if draw >= 4 => Resolution::win(draw, Win, 2),
        GameKind::Coin(guess) if CoinSide::from_draw(draw) == guess => Resolution::win(draw, Win, 2),
        GameKind::Slots if draw == 64 => Resolution::win(draw, Jackpot, 10),
        GameKind::Slots if matches!(draw, 1 | 22 | 43) => Resolution::win(draw, Win, 5),
        GameKind::NumberGuess(guess) if i64::from(guess) == draw => Resolution::win(draw, Win, 5),
        GameKind::Darts if draw == 6 => Resolution::win(draw, Bullseye, 5),
        GameKind::Darts if draw >= 4 => Resolution::win(draw, Hit, 2),
        GameKind::Football if (3..=5).contains(&draw) => Resolution::win(draw, Win, 2),
        GameKind::Basketball if (4..=5).contains(&draw) => Resolution::win(draw, Win, 2),
        GameKind::Bowling if draw == 6 => Resolution::win(draw, Strike, 3),
        GameKind::Bowling if draw >= 4 => Resolution::win(draw, Hit, 2),
        _ => Resolution::lose(draw),
    }
}

/// Draws from `random` over the domain of `kind` and resolves the round.
#[must_use]
pub fn resolve(kind: GameKind, random: &SharedRandom) -> Resolution {
    let (low, high) = kind.domain();
    payout(kind, random.draw(low, high))
}

/// Settled round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetOutcome {
    pub kind: GameKind,
    pub stake: i64,
    pub draw: i64,
    pub tier: OutcomeTier,
    pub won: bool,
    pub multiplier: i64,
    /// Amount credited on a win, zero otherwise.
    pub winnings: i64,
    pub balance: i64,
    pub level_up: LevelUp,
}

/// Game engine.
#[derive(Debug, Clone)]
pub struct GameEngine {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
    random: SharedRandom,
}

impl GameEngine {
    #[must_use]
    pub const fn new(store: Arc<LedgerStore>, config: Arc<EconomyConfig>, random: SharedRandom) -> Self {
        Self {
            store,
            config,
            random,
        }
    }

    /// Stakes offered to players.
    #[must_use]
    pub fn stake_tiers(&self) -> &[i64] {
        &self.config.stake_tiers
    }

    /// Plays one round.
    ///
    /// The stake is debited as its own entry; winnings are a separate
    /// credit. Everything is committed together or not at all.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a non-positive stake or out-of-range guess,
    /// `InsufficientFunds` when the stake exceeds the balance, `Forbidden`
    /// for banned accounts and `NotFound` for unknown ones.
    pub async fn place_bet(&self, id: UserId, kind: GameKind, stake: i64) -> Result<BetOutcome, EconomyError> {
        if stake <= 0 {
            return Err(EconomyError::invalid(format!("stake must be positive, got {stake}")));
        }
        kind.validate()?;
        let xp = self.config.xp;

        let outcome = self
            .store
            .transact(id, |tx| {
                ensure_active(tx.account())?;
                tx.require_funds(stake)?;
                let mut balance = tx.apply_delta(-stake, format!("stake: {kind}"))?;

                let resolution = resolve(kind, &self.random);
                debug!("{} rolled {} on {}", id, resolution.draw, kind);
                tx.record_game(resolution.won);

                let mut winnings = 0;
                let level_up = if resolution.won {
                    winnings = stake
                        .checked_mul(resolution.multiplier)
                        .ok_or_else(|| EconomyError::invalid("winnings overflow"))?;
                    balance = tx.apply_delta(winnings, format!("winnings: {kind}"))?;
                    tx.grant_experience(xp.game_win)
                } else {
                    tx.grant_experience(xp.game_loss)
                };

                Ok(BetOutcome {
                    kind,
                    stake,
                    draw: resolution.draw,
                    tier: resolution.tier,
                    won: resolution.won,
                    multiplier: resolution.multiplier,
                    winnings,
                    balance,
                    level_up,
                })
            })
            .await?;

        info!(
            "Game {}: {} staked {} and {} ({:?}, balance {})",
            outcome.kind,
            id,
            stake,
            if outcome.won { "won" } else { "lost" },
            outcome.tier,
            outcome.balance
        );
        Ok(outcome)
    }
}
