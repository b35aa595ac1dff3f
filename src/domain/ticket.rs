//! Issued tickets and seat assignment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::TicketType;
use super::ids::{EventId, OrderId, TicketId, TicketTypeId, UserId};
use super::token::RedemptionToken;

/// A minted ticket. Once `used` flips to `true` it never flips back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedTicket {
    /// Ticket identifier.
    pub id: TicketId,
    /// Order the ticket was bought in.
    pub order_id: OrderId,
    /// Ticket holder.
    pub owner_id: UserId,
    /// Ticket type it was issued from.
    pub ticket_type_id: TicketTypeId,
    /// Event it admits to.
    pub event_id: EventId,
    /// Seat or pool label.
    pub seat_label: String,
    /// Entry credential.
    pub redemption_token: RedemptionToken,
    /// Whether the ticket has been scanned at entry.
    pub used: bool,
    /// When it was scanned.
    pub used_at: Option<DateTime<Utc>>,
    /// Who scanned it.
    pub used_by: Option<UserId>,
    /// Processor reference of the payment that issued it (`None` for cash).
    pub payment_correlation_id: Option<String>,
    /// Mint time.
    pub issued_at: DateTime<Utc>,
}

/// Mints `count` tickets of `ticket_type` for an order.
///
/// Seat labels continue the ticket type's running count, and
/// `ticket_type.issued_count` is advanced accordingly. Callers must hold the
/// ticket type's row lock for the whole transaction so that two issuances
/// never observe the same count.
#[must_use]
pub fn mint(
    ticket_type: &mut TicketType,
    order_id: OrderId,
    owner_id: UserId,
    count: u32,
    correlation: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<IssuedTicket> {
    let start = ticket_type.issued_count;
    let tickets = (1..=count)
        .map(|n| IssuedTicket {
            id: TicketId::new(),
            order_id,
            owner_id,
            ticket_type_id: ticket_type.id,
            event_id: ticket_type.event_id,
            seat_label: ticket_type
                .seating
                .label(&ticket_type.name, start.saturating_add(n)),
            redemption_token: RedemptionToken::generate(),
            used: false,
            used_at: None,
            used_by: None,
            payment_correlation_id: correlation.map(str::to_string),
            issued_at: now,
        })
        .collect();
    ticket_type.issued_count = start.saturating_add(count);
    tickets
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::domain::catalog::SeatingMode;
    use crate::domain::money::Yen;

    fn ticket_type(seating: SeatingMode) -> TicketType {
        TicketType::new(EventId::new(), UserId::new(), "S席", Yen::new(8_000), 50, seating)
    }

    #[test]
    fn assigned_labels_continue_running_count() {
        let mut tt = ticket_type(SeatingMode::Assigned);
        let first = mint(&mut tt, OrderId::new(), UserId::new(), 2, Some("pi_1"), Utc::now());
        let second = mint(&mut tt, OrderId::new(), UserId::new(), 1, Some("pi_2"), Utc::now());

        let labels: Vec<_> = first
            .iter()
            .chain(second.iter())
            .map(|t| t.seat_label.as_str())
            .collect();
        assert_eq!(labels, vec!["S席-1", "S席-2", "S席-3"]);
        assert_eq!(tt.issued_count, 3);
    }

    #[test]
    fn open_seating_uses_pooled_labels() {
        let mut tt = ticket_type(SeatingMode::Open);
        tt.issued_count = 9;
        let tickets = mint(&mut tt, OrderId::new(), UserId::new(), 1, None, Utc::now());
        assert_eq!(tickets.first().map(|t| t.seat_label.as_str()), Some("GA-10"));
    }

    #[test]
    fn every_ticket_gets_its_own_token() {
        let mut tt = ticket_type(SeatingMode::Assigned);
        let tickets = mint(&mut tt, OrderId::new(), UserId::new(), 5, Some("pi_9"), Utc::now());
        let tokens: HashSet<_> = tickets.iter().map(|t| &t.redemption_token).collect();
        assert_eq!(tokens.len(), 5);
        assert!(tickets.iter().all(|t| !t.used));
        assert!(
            tickets
                .iter()
                .all(|t| t.payment_correlation_id.as_deref() == Some("pi_9"))
        );
    }
}
