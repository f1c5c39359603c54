//! Support tickets.

use std::sync::Arc;

use tracing::info;

use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::ledger::{LedgerStore, SupportTicket, UserId};

/// Ticket desk: users open tickets, admins answer and close them.
#[derive(Debug, Clone)]
pub struct SupportDesk {
    store: Arc<LedgerStore>,
    config: Arc<EconomyConfig>,
}

impl SupportDesk {
    #[must_use]
    pub const fn new(store: Arc<LedgerStore>, config: Arc<EconomyConfig>) -> Self {
        Self { store, config }
    }

    /// Opens a ticket for an existing account.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown accounts and `InvalidInput` for a blank message.
    pub async fn create_ticket(&self, user: UserId, message: &str) -> Result<SupportTicket, EconomyError> {
        let message = non_blank(message, "ticket message")?;
        if !self.store.contains(user).await? {
            return Err(EconomyError::not_found(format!("account {user}")));
        }
        let ticket = self.store.create_ticket(user, message).await?;
        info!("Ticket #{} opened by {}", ticket.id, user);
        Ok(ticket)
    }

    /// # Errors
    ///
    /// `Forbidden` for non-admins.
    pub async fn list_open_tickets(&self, actor: UserId) -> Result<Vec<SupportTicket>, EconomyError> {
        self.config.authorize(actor)?;
        self.store.list_open_tickets().await
    }

    /// Answers and closes a ticket.
    ///
    /// # Errors
    ///
    /// `Forbidden` for non-admins, `NotFound` for unknown tickets and
    /// `InvalidInput` for a blank reply or an already closed ticket.
    pub async fn reply_ticket(&self, actor: UserId, ticket: u64, reply: &str) -> Result<SupportTicket, EconomyError> {
        self.config.authorize(actor)?;
        let reply = non_blank(reply, "reply")?;
        let closed = self.store.close_ticket(ticket, reply).await?;
        info!("Ticket #{} answered by {}", closed.id, actor);
        Ok(closed)
    }
}

fn non_blank(text: &str, what: &str) -> Result<String, EconomyError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EconomyError::invalid(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{ADMIN, Fixture, fixture};
    use crate::ledger::TicketStatus;

    fn desk(fx: &Fixture) -> SupportDesk {
        SupportDesk::new(Arc::clone(&fx.store), Arc::clone(&fx.config))
    }

    #[tokio::test]
    async fn test_ticket_lifecycle() {
        let fx = fixture();
        fx.register(1).await;
        let desk = desk(&fx);

        let ticket = desk.create_ticket(UserId(1), "  lost my coins  ").await.unwrap();
        assert_eq!(ticket.message, "lost my coins");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(desk.list_open_tickets(ADMIN).await.unwrap().len(), 1);

        let closed = desk.reply_ticket(ADMIN, ticket.id, "refunded").await.unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert_eq!(closed.admin_reply.as_deref(), Some("refunded"));
        assert!(closed.replied_at.is_some());
        assert!(desk.list_open_tickets(ADMIN).await.unwrap().is_empty());

        assert!(matches!(
            desk.reply_ticket(ADMIN, ticket.id, "again").await,
            Err(EconomyError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_rejections() {
        let fx = fixture();
        fx.register(1).await;
        let desk = desk(&fx);

        assert!(matches!(
            desk.create_ticket(UserId(1), "   ").await,
            Err(EconomyError::InvalidInput(_))
        ));
        assert!(matches!(
            desk.create_ticket(UserId(42), "hello").await,
            Err(EconomyError::NotFound(_))
        ));
        assert_eq!(
            desk.list_open_tickets(UserId(1)).await.unwrap_err(),
            EconomyError::Forbidden
        );
        assert!(matches!(
            desk.reply_ticket(ADMIN, 77, "hi").await,
            Err(EconomyError::NotFound(_))
        ));
    }
}
