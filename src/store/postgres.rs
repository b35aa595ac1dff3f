//! PostgreSQL implementation of [`CommerceStore`].
//!
//! Every check-then-set runs inside one transaction that first takes a
//! `FOR UPDATE` lock on the row it checks. Locks are always taken order
//! first, then catalog unit, so concurrent transactions cannot deadlock.
//! Single-row transitions are conditional `UPDATE ... WHERE status = ...`
//! statements that report whether they matched.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::rows::{
    LineItemRow, ORDER_COLUMNS, OrderRow, ProductRow, TICKET_COLUMNS, TicketRow, TicketTypeRow,
    db_count,
};
use super::{
    CommerceStore, ConfirmationOutcome, OrderDraft, PaymentConfirmation, PlacedOrder,
    TicketRedemption, TokenTarget, UnitSnapshot, admits_entry, build_order, issues_at_checkout,
    releasable,
};
use crate::domain::ticket;
use crate::domain::{
    CancelReason, IssuedTicket, Order, OrderId, OrderKind, OrderStatus, PaymentMethod, Product,
    ProductId, PurchaseItem, RedemptionToken, ShippingAddress, ShippingSnapshot, TicketId,
    TicketType, TicketTypeId, Tracking, UserId, Yen,
};
use crate::error::CommerceError;

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`CommerceError::Persistence`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), CommerceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CommerceError::Persistence(format!("migration failed: {e}")))
    }
}

async fn load_order(
    conn: &mut PgConnection,
    id: OrderId,
    lock: bool,
) -> Result<Option<Order>, CommerceError> {
    let sql = if lock {
        format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE")
    } else {
        format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1")
    };
    let Some(row) = sqlx::query_as::<_, OrderRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?
    else {
        return Ok(None);
    };
    let items = sqlx::query_as::<_, LineItemRow>(
        "SELECT product_id, ticket_type_id, quantity, unit_price, name \
         FROM order_line_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(*id.as_uuid())
    .fetch_all(&mut *conn)
    .await?;
    row.into_order(items).map(Some)
}

async fn lock_ticket_type(
    conn: &mut PgConnection,
    id: TicketTypeId,
) -> Result<Option<TicketType>, CommerceError> {
    sqlx::query_as::<_, TicketTypeRow>(
        "SELECT id, event_id, seller_id, name, price, capacity, remaining, seating, issued_count \
         FROM ticket_types WHERE id = $1 FOR UPDATE",
    )
    .bind(*id.as_uuid())
    .fetch_optional(&mut *conn)
    .await?
    .map(TicketType::try_from)
    .transpose()
}

async fn insert_token(
    conn: &mut PgConnection,
    token: &RedemptionToken,
    order_id: Option<Uuid>,
    ticket_id: Option<Uuid>,
) -> Result<(), CommerceError> {
    sqlx::query("INSERT INTO redemption_tokens (token, order_id, ticket_id) VALUES ($1, $2, $3)")
        .bind(token.as_str())
        .bind(order_id)
        .bind(ticket_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), CommerceError> {
    sqlx::query(
        "INSERT INTO orders (id, buyer_id, seller_id, kind, total, platform_fee, payout, status, \
         payment_method, fulfillment_method, shipping, redemption_token, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(*order.id.as_uuid())
    .bind(*order.buyer_id.as_uuid())
    .bind(*order.seller_id.as_uuid())
    .bind(order.kind.as_str())
    .bind(order.total.get())
    .bind(order.platform_fee.get())
    .bind(order.payout.get())
    .bind(order.status.as_str())
    .bind(order.payment_method.as_str())
    .bind(order.fulfillment_method.as_str())
    .bind(order.shipping.as_ref().map(Json))
    .bind(order.redemption_token.as_ref().map(RedemptionToken::as_str))
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await?;

    for li in &order.line_items {
        sqlx::query(
            "INSERT INTO order_line_items (order_id, product_id, ticket_type_id, quantity, \
             unit_price, name) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(*order.id.as_uuid())
        .bind(li.product_id.map(Uuid::from))
        .bind(li.ticket_type_id.map(Uuid::from))
        .bind(db_count(li.quantity)?)
        .bind(li.unit_price.get())
        .bind(&li.name)
        .execute(&mut *conn)
        .await?;
    }

    if let Some(token) = &order.redemption_token {
        insert_token(conn, token, Some(*order.id.as_uuid()), None).await?;
    }
    Ok(())
}

async fn insert_tickets(
    conn: &mut PgConnection,
    tickets: &[IssuedTicket],
) -> Result<(), CommerceError> {
    for t in tickets {
        sqlx::query(
            "INSERT INTO issued_tickets (id, order_id, owner_id, ticket_type_id, event_id, \
             seat_label, redemption_token, payment_correlation_id, issued_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(*t.id.as_uuid())
        .bind(*t.order_id.as_uuid())
        .bind(*t.owner_id.as_uuid())
        .bind(*t.ticket_type_id.as_uuid())
        .bind(*t.event_id.as_uuid())
        .bind(&t.seat_label)
        .bind(t.redemption_token.as_str())
        .bind(t.payment_correlation_id.as_deref())
        .bind(t.issued_at)
        .execute(&mut *conn)
        .await?;
        insert_token(conn, &t.redemption_token, None, Some(*t.id.as_uuid())).await?;
    }
    Ok(())
}

async fn restock(conn: &mut PgConnection, order: &Order) -> Result<(), CommerceError> {
    for li in &order.line_items {
        let quantity = db_count(li.quantity)?;
        if let Some(pid) = li.product_id {
            sqlx::query("UPDATE products SET stock = stock + $2 WHERE id = $1")
                .bind(*pid.as_uuid())
                .bind(quantity)
                .execute(&mut *conn)
                .await?;
        }
        if let Some(tid) = li.ticket_type_id {
            sqlx::query(
                "UPDATE ticket_types SET remaining = LEAST(capacity, remaining + $2) WHERE id = $1",
            )
            .bind(*tid.as_uuid())
            .bind(quantity)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn set_canceled(
    conn: &mut PgConnection,
    order: &mut Order,
    reason: CancelReason,
) -> Result<(), CommerceError> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE orders SET status = 'canceled', cancel_reason = $2, updated_at = $3 WHERE id = $1",
    )
    .bind(*order.id.as_uuid())
    .bind(reason.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    restock(conn, order).await?;
    order.status = OrderStatus::Canceled;
    order.cancel_reason = Some(reason);
    order.updated_at = now;
    Ok(())
}

/// Reloads the order a conditional `UPDATE ... RETURNING id` matched and
/// commits. `None` means the precondition did not hold.
async fn finish_transition(
    mut tx: Transaction<'_, Postgres>,
    matched: Option<Uuid>,
) -> Result<Option<Order>, CommerceError> {
    let order = match matched {
        Some(id) => load_order(&mut tx, id.into(), false).await?,
        None => None,
    };
    tx.commit().await?;
    Ok(order)
}

#[async_trait]
impl CommerceStore for PostgresStore {
    async fn put_product(&self, product: Product) -> Result<(), CommerceError> {
        sqlx::query(
            "INSERT INTO products (id, seller_id, name, price, stock) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET seller_id = EXCLUDED.seller_id, \
             name = EXCLUDED.name, price = EXCLUDED.price, stock = EXCLUDED.stock",
        )
        .bind(*product.id.as_uuid())
        .bind(*product.seller_id.as_uuid())
        .bind(&product.name)
        .bind(product.price.get())
        .bind(db_count(product.stock)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_ticket_type(&self, tt: TicketType) -> Result<(), CommerceError> {
        sqlx::query(
            "INSERT INTO ticket_types (id, event_id, seller_id, name, price, capacity, remaining, \
             seating, issued_count) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET event_id = EXCLUDED.event_id, \
             seller_id = EXCLUDED.seller_id, name = EXCLUDED.name, price = EXCLUDED.price, \
             capacity = EXCLUDED.capacity, remaining = EXCLUDED.remaining, \
             seating = EXCLUDED.seating, issued_count = EXCLUDED.issued_count",
        )
        .bind(*tt.id.as_uuid())
        .bind(*tt.event_id.as_uuid())
        .bind(*tt.seller_id.as_uuid())
        .bind(&tt.name)
        .bind(tt.price.get())
        .bind(db_count(tt.capacity)?)
        .bind(db_count(tt.remaining)?)
        .bind(tt.seating.as_str())
        .bind(db_count(tt.issued_count)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_product_price(&self, id: ProductId, price: Yen) -> Result<(), CommerceError> {
        let result = sqlx::query("UPDATE products SET price = $2 WHERE id = $1")
            .bind(*id.as_uuid())
            .bind(price.get())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::NotFound("product"));
        }
        Ok(())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, CommerceError> {
        sqlx::query_as::<_, ProductRow>(
            "SELECT id, seller_id, name, price, stock FROM products WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Product::try_from)
        .transpose()
    }

    async fn ticket_type(&self, id: TicketTypeId) -> Result<Option<TicketType>, CommerceError> {
        sqlx::query_as::<_, TicketTypeRow>(
            "SELECT id, event_id, seller_id, name, price, capacity, remaining, seating, \
             issued_count FROM ticket_types WHERE id = $1",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(TicketType::try_from)
        .transpose()
    }

    async fn put_shipping_address(
        &self,
        user_id: UserId,
        address: ShippingAddress,
    ) -> Result<(), CommerceError> {
        sqlx::query(
            "INSERT INTO shipping_addresses (user_id, address, updated_at) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id) DO UPDATE SET address = EXCLUDED.address, \
             updated_at = EXCLUDED.updated_at",
        )
        .bind(*user_id.as_uuid())
        .bind(Json(&address))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn shipping_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<ShippingAddress>, CommerceError> {
        let row = sqlx::query_scalar::<_, Json<ShippingAddress>>(
            "SELECT address FROM shipping_addresses WHERE user_id = $1",
        )
        .bind(*user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(a)| a))
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<PlacedOrder, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let shipping = if draft.fulfillment_method.requires_shipping() {
            let address = sqlx::query_scalar::<_, Json<ShippingAddress>>(
                "SELECT address FROM shipping_addresses WHERE user_id = $1",
            )
            .bind(*draft.buyer_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CommerceError::MissingShippingAddress)?;
            Some(ShippingSnapshot {
                address: address.0,
                captured_at: now,
            })
        } else {
            None
        };
        let quantity = db_count(draft.quantity)?;

        let (order, tickets) = match draft.item {
            PurchaseItem::Product { product_id } => {
                let product: Product = sqlx::query_as::<_, ProductRow>(
                    "SELECT id, seller_id, name, price, stock FROM products \
                     WHERE id = $1 FOR UPDATE",
                )
                .bind(*product_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(CommerceError::NotFound("product"))?
                .try_into()?;
                if product.stock < draft.quantity {
                    return Err(CommerceError::InsufficientStock);
                }
                let unit = UnitSnapshot {
                    seller_id: product.seller_id,
                    name: product.name,
                    price: product.price,
                };
                let order = build_order(&draft, &unit, shipping, now)?;
                sqlx::query("UPDATE products SET stock = stock - $2 WHERE id = $1")
                    .bind(*product_id.as_uuid())
                    .bind(quantity)
                    .execute(&mut *tx)
                    .await?;
                (order, Vec::new())
            }
            PurchaseItem::Ticket { ticket_type_id } => {
                let mut tt = lock_ticket_type(&mut tx, ticket_type_id)
                    .await?
                    .ok_or(CommerceError::NotFound("ticket type"))?;
                if tt.remaining < draft.quantity {
                    return Err(CommerceError::InsufficientStock);
                }
                let unit = UnitSnapshot {
                    seller_id: tt.seller_id,
                    name: tt.name.clone(),
                    price: tt.price,
                };
                let order = build_order(&draft, &unit, shipping, now)?;
                let tickets = if issues_at_checkout(&order) {
                    ticket::mint(&mut tt, order.id, order.buyer_id, draft.quantity, None, now)
                } else {
                    Vec::new()
                };
                sqlx::query(
                    "UPDATE ticket_types SET remaining = remaining - $2, issued_count = $3 \
                     WHERE id = $1",
                )
                .bind(*ticket_type_id.as_uuid())
                .bind(quantity)
                .bind(db_count(tt.issued_count)?)
                .execute(&mut *tx)
                .await?;
                (order, tickets)
            }
        };

        insert_order(&mut tx, &order).await?;
        insert_tickets(&mut tx, &tickets).await?;
        tx.commit().await?;
        Ok(PlacedOrder { order, tickets })
    }

    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        intent_id: &str,
    ) -> Result<(), CommerceError> {
        let result = sqlx::query("UPDATE orders SET payment_intent_id = $2 WHERE id = $1")
            .bind(*order_id.as_uuid())
            .bind(intent_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CommerceError::NotFound("order"));
        }
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, id, false).await
    }

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>, CommerceError> {
        let mut conn = self.pool.acquire().await?;
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM orders WHERE payment_intent_id = $1")
            .bind(intent_id)
            .fetch_optional(&mut *conn)
            .await?;
        match id {
            Some(id) => load_order(&mut conn, id.into(), false).await,
            None => Ok(None),
        }
    }

    async fn tickets_for_order(&self, id: OrderId) -> Result<Vec<IssuedTicket>, CommerceError> {
        let rows = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM issued_tickets WHERE order_id = $1 \
             ORDER BY issued_at, length(seat_label), seat_label"
        ))
        .bind(*id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(IssuedTicket::from).collect())
    }

    async fn release_order(
        &self,
        id: OrderId,
        reason: CancelReason,
    ) -> Result<Option<Order>, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut order) = load_order(&mut tx, id, true).await?.filter(releasable) else {
            return Ok(None);
        };
        set_canceled(&mut tx, &mut order, reason).await?;
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Order>, CommerceError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM orders WHERE status = 'pending' AND payment_method = 'online' \
             AND created_at < $1 ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut conn = self.pool.acquire().await?;
        let mut expired = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = load_order(&mut conn, id.into(), false).await? {
                expired.push(order);
            }
        }
        Ok(expired)
    }

    async fn confirm_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<ConfirmationOutcome, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut order) = load_order(&mut tx, confirmation.order_id, true).await? else {
            return Ok(ConfirmationOutcome::UnknownOrder);
        };
        let now = Utc::now();

        let recorded = sqlx::query(
            "INSERT INTO payment_confirmations (processor_reference, order_id, received_at) \
             VALUES ($1, $2, $3) ON CONFLICT (processor_reference) DO NOTHING",
        )
        .bind(&confirmation.processor_reference)
        .bind(*order.id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            return Ok(ConfirmationOutcome::Duplicate);
        }

        match (order.status, order.payment_method) {
            (OrderStatus::Pending, PaymentMethod::Online) => {}
            (OrderStatus::Canceled, _) => {
                sqlx::query(
                    "UPDATE orders SET processor_reference = $2, updated_at = $3 WHERE id = $1",
                )
                .bind(*order.id.as_uuid())
                .bind(&confirmation.processor_reference)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                order.processor_reference = Some(confirmation.processor_reference);
                order.updated_at = now;
                return Ok(ConfirmationOutcome::LateForReleasedOrder(order));
            }
            (status, _) => return Ok(ConfirmationOutcome::NotPending(status)),
        }

        if let Some(received) = confirmation.amount
            && received != order.total
        {
            return Ok(ConfirmationOutcome::AmountMismatch {
                expected: order.total,
                received,
            });
        }

        let tickets = if order.kind == OrderKind::Ticket {
            let tt_id = order
                .line_items
                .first()
                .and_then(|li| li.ticket_type_id)
                .ok_or_else(|| CommerceError::Internal("ticket order without ticket type".into()))?;
            let mut tt = lock_ticket_type(&mut tx, tt_id)
                .await?
                .ok_or_else(|| CommerceError::Internal(format!("ticket type {tt_id} missing")))?;
            let tickets = ticket::mint(
                &mut tt,
                order.id,
                order.buyer_id,
                order.quantity(),
                Some(&confirmation.processor_reference),
                now,
            );
            sqlx::query("UPDATE ticket_types SET issued_count = $2 WHERE id = $1")
                .bind(*tt_id.as_uuid())
                .bind(db_count(tt.issued_count)?)
                .execute(&mut *tx)
                .await?;
            insert_tickets(&mut tx, &tickets).await?;
            tickets
        } else {
            Vec::new()
        };

        sqlx::query(
            "UPDATE orders SET status = 'paid', processor_reference = $2, updated_at = $3 \
             WHERE id = $1",
        )
        .bind(*order.id.as_uuid())
        .bind(&confirmation.processor_reference)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        order.status = OrderStatus::Paid;
        order.processor_reference = Some(confirmation.processor_reference);
        order.updated_at = now;
        Ok(ConfirmationOutcome::Confirmed { order, tickets })
    }

    async fn resolve_token(
        &self,
        token: &RedemptionToken,
    ) -> Result<Option<TokenTarget>, CommerceError> {
        let mut conn = self.pool.acquire().await?;
        let Some((order_id, ticket_id)) = sqlx::query_as::<_, (Option<Uuid>, Option<Uuid>)>(
            "SELECT order_id, ticket_id FROM redemption_tokens WHERE token = $1",
        )
        .bind(token.as_str())
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        if let Some(order_id) = order_id {
            return Ok(load_order(&mut conn, order_id.into(), false)
                .await?
                .map(TokenTarget::Order));
        }
        let Some(ticket_id) = ticket_id else {
            return Ok(None);
        };
        let Some(ticket) = sqlx::query_as::<_, TicketRow>(&format!(
            "SELECT {TICKET_COLUMNS} FROM issued_tickets WHERE id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };
        let (seller_id, status) = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT seller_id, status FROM orders WHERE id = $1",
        )
        .bind(ticket.order_id)
        .fetch_one(&mut *conn)
        .await?;
        let order_status = OrderStatus::parse(&status).ok_or_else(|| {
            CommerceError::Persistence(format!("invalid status in storage: {status}"))
        })?;
        Ok(Some(TokenTarget::Ticket {
            ticket: ticket.into(),
            seller_id: seller_id.into(),
            order_status,
        }))
    }

    async fn redeem_order(
        &self,
        id: OrderId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let matched = sqlx::query_scalar::<_, Uuid>(
            "UPDATE orders SET status = 'redeemed', redeemed_at = $2, redeemed_by = $3, \
             updated_at = $2 WHERE id = $1 AND ( \
               (status = 'paid' AND fulfillment_method = 'venue') \
               OR status = 'shipped' \
               OR (status = 'pending' AND fulfillment_method = 'venue' \
                   AND payment_method = 'cash') \
             ) RETURNING id",
        )
        .bind(*id.as_uuid())
        .bind(at)
        .bind(*actor.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        finish_transition(tx, matched).await
    }

    async fn redeem_ticket(
        &self,
        id: TicketId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<Option<TicketRedemption>, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let status = sqlx::query_scalar::<_, String>(
            "SELECT o.status FROM orders o JOIN issued_tickets t ON t.order_id = o.id \
             WHERE t.id = $1 FOR UPDATE OF o",
        )
        .bind(*id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        if !status
            .as_deref()
            .and_then(OrderStatus::parse)
            .is_some_and(admits_entry)
        {
            return Ok(None);
        }
        let row = sqlx::query_as::<_, TicketRow>(&format!(
            "UPDATE issued_tickets SET used = TRUE, used_at = $2, used_by = $3 \
             WHERE id = $1 AND NOT used RETURNING {TICKET_COLUMNS}"
        ))
        .bind(*id.as_uuid())
        .bind(at)
        .bind(*actor.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let completed = sqlx::query_scalar::<_, Uuid>(
            "UPDATE orders SET status = 'redeemed', redeemed_at = $2, redeemed_by = $3, \
             updated_at = $2 WHERE id = $1 AND status IN ('pending', 'paid') \
             AND NOT EXISTS (SELECT 1 FROM issued_tickets WHERE order_id = $1 AND NOT used) \
             RETURNING id",
        )
        .bind(row.order_id)
        .bind(at)
        .bind(*actor.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let completed_order = match completed {
            Some(order_id) => load_order(&mut tx, order_id.into(), false).await?,
            None => None,
        };
        tx.commit().await?;
        Ok(Some(TicketRedemption {
            ticket: row.into(),
            completed_order,
        }))
    }

    async fn mark_shipped(
        &self,
        id: OrderId,
        tracking: Tracking,
    ) -> Result<Option<Order>, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let matched = sqlx::query_scalar::<_, Uuid>(
            "UPDATE orders SET status = 'shipped', tracking = $2, updated_at = $3 \
             WHERE id = $1 AND status = 'paid' AND fulfillment_method = 'mail' RETURNING id",
        )
        .bind(*id.as_uuid())
        .bind(Json(&tracking))
        .bind(tracking.shipped_at)
        .fetch_optional(&mut *tx)
        .await?;
        finish_transition(tx, matched).await
    }

    async fn cancel_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let Some(mut order) = load_order(&mut tx, id, true)
            .await?
            .filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Paid))
        else {
            return Ok(None);
        };
        let any_used = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM issued_tickets WHERE order_id = $1 AND used)",
        )
        .bind(*id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        if any_used {
            return Ok(None);
        }
        set_canceled(&mut tx, &mut order, CancelReason::Administrative).await?;
        tx.commit().await?;
        Ok(Some(order))
    }

    async fn refund_order(&self, id: OrderId) -> Result<Option<Order>, CommerceError> {
        let mut tx = self.pool.begin().await?;
        let matched = sqlx::query_scalar::<_, Uuid>(
            "UPDATE orders SET status = 'refunded', updated_at = $2 WHERE id = $1 \
             AND status IN ('paid', 'shipped', 'redeemed', 'canceled') RETURNING id",
        )
        .bind(*id.as_uuid())
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;
        finish_transition(tx, matched).await
    }
}
