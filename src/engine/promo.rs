//! Promo code creation and one-time-per-account redemption.

use std::sync::Arc;

use chrono::Duration;
use tracing::info;

use super::ensure_active;
use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::ledger::{LedgerStore, LevelUp, PromoCode, UserId};

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoRedeemed {
    pub code: String,
    pub reward: i64,
    pub balance: i64,
    pub level_up: LevelUp,
}

/// Promo code engine.
#[derive(Debug, Clone)]
pub struct PromoEngine {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
}

impl PromoEngine {
    #[must_use]
    pub const fn new(store: Arc<LedgerStore>, config: Arc<EconomyConfig>) -> Self {
        Self { store, config }
    }

    /// Redeems `raw_code` for the account.
    ///
    /// The code lock is held for the whole check-and-mutate sequence, so the
    /// usage cap holds under concurrent redemptions from many accounts.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for malformed codes, `NotFound` for unknown or inactive
    /// codes, then `Expired`, `ExhaustedUses` and `AlreadyRedeemed` in that
    /// order. Rejections change nothing.
    pub async fn redeem(&self, id: UserId, raw_code: &str) -> Result<PromoRedeemed, EconomyError> {
        let code = PromoCode::normalize(raw_code)?;
        let xp = self.config.xp.promo;

        let redeemed = self
            .store
            .redeem_with(&code, id, |promo, tx| {
                ensure_active(tx.account())?;
                if !promo.active {
                    return Err(EconomyError::not_found(format!("promo code {code}")));
                }
                if promo.is_expired_at(tx.now()) {
                    return Err(EconomyError::Expired);
                }
                if promo.is_exhausted() {
                    return Err(EconomyError::ExhaustedUses);
                }
                if tx.has_redeemed(&code) {
                    return Err(EconomyError::AlreadyRedeemed);
                }

                promo.current_uses += 1;
                tx.record_promo_redemption(&code);
                let balance = tx.apply_delta(promo.reward, code.as_str())?;
                let level_up = tx.grant_experience(xp);

                Ok(PromoRedeemed {
                    code: code.clone(),
                    reward: promo.reward,
                    balance,
                    level_up,
                })
            })
            .await?;

        info!("Promo {} redeemed by {} for {}", redeemed.code, id, redeemed.reward);
        Ok(redeemed)
    }

    /// Creates a promo code. `expires_in_hours = None` never expires.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `InvalidInput` for malformed values and
    /// `AlreadyExists` for a duplicate code.
    pub async fn create(
        &self,
        actor: UserId,
        raw_code: &str,
        reward: i64,
        max_uses: u32,
        expires_in_hours: Option<u32>,
    ) -> Result<PromoCode, EconomyError> {
        self.config.authorize(actor)?;
        let code = PromoCode::normalize(raw_code)?;
        if reward <= 0 {
            return Err(EconomyError::invalid("reward must be positive"));
        }
        if max_uses == 0 {
            return Err(EconomyError::invalid("max uses must be positive"));
        }
        if expires_in_hours == Some(0) {
            return Err(EconomyError::invalid("expiry must be at least one hour"));
        }

        let now = self.store.now();
        let promo = PromoCode {
            code,
            reward,
            max_uses,
            current_uses: 0,
            created_by: actor,
            active: true,
            created_at: now,
            expires_at: expires_in_hours.map(|h| now + Duration::hours(i64::from(h))),
        };
        self.store.create_promo(promo.clone()).await?;
        info!("Promo {} created by {} ({} x{})", promo.code, actor, reward, max_uses);
        Ok(promo)
    }

    /// Deletes a code unconditionally. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins and `InvalidInput` for malformed codes.
    pub async fn delete(&self, actor: UserId, raw_code: &str) -> Result<bool, EconomyError> {
        self.config.authorize(actor)?;
        let code = PromoCode::normalize(raw_code)?;
        let existed = self.store.delete_promo(&code).await?;
        info!("Promo {} deleted by {} (existed: {})", code, actor, existed);
        Ok(existed)
    }

    /// Every code, newest first.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins.
    pub async fn list(&self, actor: UserId) -> Result<Vec<PromoCode>, EconomyError> {
        self.config.authorize(actor)?;
        self.store.list_promos().await
    }
}
