//! # Order Repository
//!
//! Atomic persistence of a composed order copy, and hydration of a
//! persisted order graph back into a composition snapshot.
//!
//! ## Round Trip
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  compose() ──► OrderCopy ──► save_composed()                            │
//! │                                  │  one transaction:                    │
//! │                                  │   order row                          │
//! │                                  │   line upserts (natural key)         │
//! │                                  │   definition + attachment rows       │
//! │                                  │   fulfillment + details + recipient  │
//! │                                  ▼                                      │
//! │                              SQLite                                     │
//! │                                  │                                      │
//! │  load_graph() ◄──────────────────┘                                      │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  (Order, InMemoryStore) ──► compose() again, same semantics as the     │
//! │  all-in-memory path                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Partial writes are not an acceptable outcome: any failure inside
//! `save_composed` rolls the whole copy back.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;
use uuid::Uuid;

use meridian_core::compose::OrderCopy;
use meridian_core::deductible::{AttachedDeductible, DeductibleKind, Scope};
use meridian_core::error::CoreError;
use meridian_core::fulfillment::{
    DeliveryDetails, Fulfillment, FulfillmentDetails, FulfillmentKind, FulfillmentState,
    PickupDetails, Recipient, ShipmentDetails,
};
use meridian_core::money::Money;
use meridian_core::service_charge::AttachedServiceCharge;
use meridian_core::store::InMemoryStore;
use meridian_core::types::{AttachmentTarget, Order, OrderLine, OrderState};

use crate::error::{DbError, DbResult};
use crate::repository::catalog::{
    parse_phase, parse_tax_mode, parse_treatment, phase_str, tax_mode_str, treatment_str,
};

// =============================================================================
// Discriminator Mapping
// =============================================================================

fn state_str(state: OrderState) -> &'static str {
    match state {
        OrderState::Open => "open",
        OrderState::Submitted => "submitted",
        OrderState::Completed => "completed",
        OrderState::Canceled => "canceled",
    }
}

fn parse_state(state: &str) -> DbResult<OrderState> {
    match state {
        "open" => Ok(OrderState::Open),
        "submitted" => Ok(OrderState::Submitted),
        "completed" => Ok(OrderState::Completed),
        "canceled" => Ok(OrderState::Canceled),
        other => Err(DbError::Internal(format!(
            "unknown order state in row: {other}"
        ))),
    }
}

fn scope_str(scope: Scope) -> &'static str {
    match scope {
        Scope::Order => "order",
        Scope::Line => "line",
    }
}

fn parse_scope(scope: &str) -> DbResult<Scope> {
    match scope {
        "order" => Ok(Scope::Order),
        "line" => Ok(Scope::Line),
        other => Err(DbError::Internal(format!(
            "unknown attachment scope in row: {other}"
        ))),
    }
}

fn kind_str(kind: FulfillmentKind) -> &'static str {
    match kind {
        FulfillmentKind::Pickup => "pickup",
        FulfillmentKind::Shipment => "shipment",
        FulfillmentKind::Delivery => "delivery",
    }
}

fn fulfillment_state_str(state: FulfillmentState) -> &'static str {
    match state {
        FulfillmentState::Proposed => "proposed",
        FulfillmentState::Reserved => "reserved",
        FulfillmentState::Prepared => "prepared",
        FulfillmentState::Completed => "completed",
        FulfillmentState::Canceled => "canceled",
    }
}

fn parse_fulfillment_state(state: &str) -> DbResult<FulfillmentState> {
    match state {
        "proposed" => Ok(FulfillmentState::Proposed),
        "reserved" => Ok(FulfillmentState::Reserved),
        "prepared" => Ok(FulfillmentState::Prepared),
        "completed" => Ok(FulfillmentState::Completed),
        "canceled" => Ok(FulfillmentState::Canceled),
        other => Err(DbError::Internal(format!(
            "unknown fulfillment state in row: {other}"
        ))),
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    reference_id: Option<String>,
    location_id: Option<String>,
    state: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl OrderRow {
    fn into_domain(self) -> DbResult<Order> {
        Ok(Order {
            id: self.id,
            reference_id: self.reference_id,
            location_id: self.location_id,
            state: parse_state(&self.state)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LineRow {
    id: String,
    order_id: String,
    product_id: String,
    quantity: i64,
    unit_price_cents: i64,
    note: Option<String>,
    correlation_uid: String,
}

impl From<LineRow> for OrderLine {
    fn from(row: LineRow) -> Self {
        OrderLine {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            note: row.note,
            correlation_uid: row.correlation_uid,
        }
    }
}

/// A deductible attachment joined to its definition.
#[derive(Debug, sqlx::FromRow)]
struct DeductibleAttachmentRow {
    pivot_id: String,
    target_kind: String,
    target_id: String,
    scope: String,
    deductible_id: String,
    name: String,
    kind: String,
    tax_mode: Option<String>,
    amount_cents: Option<i64>,
    percentage_bps: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct ChargeAttachmentRow {
    pivot_id: String,
    target_kind: String,
    target_id: String,
    scope: String,
    charge_id: String,
    name: String,
    amount_cents: Option<i64>,
    percentage_bps: Option<i64>,
    calculation_phase: String,
    treatment_type: String,
    taxable: bool,
}

fn parse_target(kind: &str, id: String) -> DbResult<AttachmentTarget> {
    match kind {
        "order" => Ok(AttachmentTarget::Order(id)),
        "line" => Ok(AttachmentTarget::Line(id)),
        other => Err(DbError::Internal(format!(
            "unknown attachment target kind in row: {other}"
        ))),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for order persistence.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by id.
    pub async fn get_order(&self, id: &str) -> DbResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT id, reference_id, location_id, state, created_at, updated_at
             FROM orders WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OrderRow::into_domain).transpose()
    }

    /// Persists a composed copy atomically.
    ///
    /// Either all of {order, lines, definitions, attachments, line
    /// modifiers, fulfillment} land, or none do.
    pub async fn save_composed(&self, copy: &OrderCopy) -> DbResult<()> {
        debug!(order_id = %copy.order.id, lines = copy.lines.len(), "Persisting composed order");

        let mut tx = self.pool.begin().await?;

        upsert_order(&mut tx, &copy.order).await?;

        for line_copy in &copy.lines {
            upsert_line(&mut tx, &line_copy.line).await?;

            let target = AttachmentTarget::Line(line_copy.line.id.clone());
            for attached in &line_copy.discounts {
                save_deductible_attachment(&mut tx, &target, attached).await?;
            }
            for attached in &line_copy.taxes {
                save_deductible_attachment(&mut tx, &target, attached).await?;
            }
            for attached in &line_copy.service_charges {
                save_charge_attachment(&mut tx, &target, attached).await?;
            }
            for modifier in &line_copy.modifiers {
                sqlx::query(
                    "INSERT OR IGNORE INTO line_modifiers (line_id, modifier_id) VALUES (?1, ?2)",
                )
                .bind(&line_copy.line.id)
                .bind(&modifier.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        let order_target = AttachmentTarget::Order(copy.order.id.clone());
        for attached in &copy.discounts {
            save_deductible_attachment(&mut tx, &order_target, attached).await?;
        }
        for attached in &copy.taxes {
            save_deductible_attachment(&mut tx, &order_target, attached).await?;
        }
        for attached in &copy.service_charges {
            save_charge_attachment(&mut tx, &order_target, attached).await?;
        }

        if let Some(fulfillment) = &copy.fulfillment {
            save_fulfillment(&mut tx, &copy.order.id, fulfillment).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Loads the persisted graph for an order into an [`InMemoryStore`],
    /// ready for another composition pass.
    ///
    /// The snapshot also carries the full catalog (products, deductibles,
    /// service charges, modifiers, customers) so draft references resolve
    /// against it.
    pub async fn load_graph(&self, order_id: &str) -> DbResult<Option<(Order, InMemoryStore)>> {
        let order = match self.get_order(order_id).await? {
            Some(order) => order,
            None => return Ok(None),
        };

        let mut store = InMemoryStore::new();

        // Catalog: drafts reference it by id, so load it wholesale
        self.load_catalog_definitions(&mut store).await?;

        // Lines
        for row in sqlx::query_as::<_, LineRow>(
            "SELECT id, order_id, product_id, quantity, unit_price_cents, note, correlation_uid
             FROM order_lines WHERE order_id = ?1 ORDER BY rowid",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        {
            store.insert_line(OrderLine::from(row));
        }

        // Attachments (order-level and all of this order's lines)
        for row in sqlx::query_as::<_, DeductibleAttachmentRow>(
            r#"
            SELECT a.id AS pivot_id, a.target_kind, a.target_id, a.scope,
                   d.id AS deductible_id, d.name, d.kind, d.tax_mode,
                   d.amount_cents, d.percentage_bps
            FROM deductible_attachments a
            JOIN deductibles d ON d.id = a.deductible_id
            WHERE (a.target_kind = 'order' AND a.target_id = ?1)
               OR (a.target_kind = 'line' AND a.target_id IN
                   (SELECT id FROM order_lines WHERE order_id = ?1))
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        {
            let target = parse_target(&row.target_kind, row.target_id.clone())?;
            let pricing = meridian_core::deductible::Pricing::from_parts(
                row.amount_cents,
                row.percentage_bps.map(|bps| bps as u32),
                "deductible",
            )?;
            let kind = match row.kind.as_str() {
                "discount" => DeductibleKind::Discount,
                "tax" => DeductibleKind::Tax {
                    mode: parse_tax_mode(row.tax_mode.as_deref())?,
                },
                other => {
                    return Err(DbError::Internal(format!(
                        "unknown deductible kind in row {}: {other}",
                        row.deductible_id
                    )))
                }
            };
            store.insert_deductible_attachment(
                target,
                AttachedDeductible {
                    deductible: meridian_core::deductible::Deductible {
                        id: row.deductible_id,
                        name: row.name,
                        pricing,
                        kind,
                    },
                    scope: parse_scope(&row.scope)?,
                    pivot_id: Some(row.pivot_id),
                },
            );
        }

        for row in sqlx::query_as::<_, ChargeAttachmentRow>(
            r#"
            SELECT a.id AS pivot_id, a.target_kind, a.target_id, a.scope,
                   c.id AS charge_id, c.name, c.amount_cents, c.percentage_bps,
                   c.calculation_phase, c.treatment_type, c.taxable
            FROM service_charge_attachments a
            JOIN service_charges c ON c.id = a.service_charge_id
            WHERE (a.target_kind = 'order' AND a.target_id = ?1)
               OR (a.target_kind = 'line' AND a.target_id IN
                   (SELECT id FROM order_lines WHERE order_id = ?1))
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        {
            let target = parse_target(&row.target_kind, row.target_id.clone())?;
            let pricing = meridian_core::deductible::Pricing::from_parts(
                row.amount_cents,
                row.percentage_bps.map(|bps| bps as u32),
                "service_charge",
            )?;
            // Full state machine validation on the way back in
            let charge = meridian_core::service_charge::ServiceCharge::from_persisted(
                row.charge_id,
                row.name,
                pricing,
                parse_phase(&row.calculation_phase)?,
                parse_treatment(&row.treatment_type)?,
                row.taxable,
            )?;
            store.insert_charge_attachment(
                target,
                AttachedServiceCharge {
                    charge,
                    scope: parse_scope(&row.scope)?,
                    pivot_id: Some(row.pivot_id),
                },
            );
        }

        // Line modifiers
        for (line_id, modifier_id) in sqlx::query_as::<_, (String, String)>(
            "SELECT lm.line_id, lm.modifier_id
             FROM line_modifiers lm
             JOIN order_lines l ON l.id = lm.line_id
             WHERE l.order_id = ?1",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        {
            store.attach_modifier(line_id, modifier_id);
        }

        // Fulfillment
        if let Some(fulfillment) = self.load_fulfillment(order_id).await? {
            store.set_fulfillment(order_id, fulfillment);
        }

        Ok(Some((order, store)))
    }

    async fn load_catalog_definitions(&self, store: &mut InMemoryStore) -> DbResult<()> {
        let catalog = crate::repository::catalog::CatalogRepository::new(self.pool.clone());
        for product in catalog.list_products().await? {
            store.insert_product(product);
        }
        for id in sqlx::query_scalar::<_, String>("SELECT id FROM deductibles")
            .fetch_all(&self.pool)
            .await?
        {
            if let Some(deductible) = catalog.get_deductible(&id).await? {
                store.insert_deductible(deductible);
            }
        }
        for id in sqlx::query_scalar::<_, String>("SELECT id FROM service_charges")
            .fetch_all(&self.pool)
            .await?
        {
            if let Some(charge) = catalog.get_service_charge(&id).await? {
                store.insert_service_charge(charge);
            }
        }
        for id in sqlx::query_scalar::<_, String>("SELECT id FROM modifiers")
            .fetch_all(&self.pool)
            .await?
        {
            if let Some(modifier) = catalog.get_modifier(&id).await? {
                store.insert_modifier(modifier);
            }
        }
        for id in sqlx::query_scalar::<_, String>("SELECT id FROM customers")
            .fetch_all(&self.pool)
            .await?
        {
            if let Some(recipient) = catalog.get_customer_recipient(&id).await? {
                store.insert_customer(id, recipient);
            }
        }
        Ok(())
    }

    async fn load_fulfillment(&self, order_id: &str) -> DbResult<Option<Fulfillment>> {
        let header: Option<(String, String, String)> = sqlx::query_as(
            "SELECT id, kind, state FROM fulfillments WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        let (fulfillment_id, kind, state) = match header {
            Some(row) => row,
            None => return Ok(None),
        };

        let recipient: Option<Recipient> = sqlx::query_as::<_, RecipientRow>(
            "SELECT display_name, email, phone,
                    address_line_1, address_line_2, locality,
                    administrative_district, postal_code, country
             FROM fulfillment_recipients WHERE fulfillment_id = ?1",
        )
        .bind(&fulfillment_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Recipient::from);

        let details = match kind.as_str() {
            "pickup" => {
                let detail: Option<(Option<String>, Option<String>)> = sqlx::query_as(
                    "SELECT pickup_at, note FROM pickup_details WHERE fulfillment_id = ?1",
                )
                .bind(&fulfillment_id)
                .fetch_optional(&self.pool)
                .await?;
                let (pickup_at, note) = detail.unwrap_or((None, None));
                FulfillmentDetails::Pickup(PickupDetails {
                    recipient,
                    pickup_at,
                    note,
                })
            }
            "shipment" => {
                let detail: Option<(Option<String>, Option<String>)> = sqlx::query_as(
                    "SELECT carrier, tracking_number FROM shipment_details WHERE fulfillment_id = ?1",
                )
                .bind(&fulfillment_id)
                .fetch_optional(&self.pool)
                .await?;
                let (carrier, tracking_number) = detail.unwrap_or((None, None));
                FulfillmentDetails::Shipment(ShipmentDetails {
                    recipient: recipient.ok_or(CoreError::MissingAttribute {
                        field: "recipient".to_string(),
                    })?,
                    carrier,
                    tracking_number,
                })
            }
            "delivery" => {
                let detail: Option<(Option<String>, Option<String>)> = sqlx::query_as(
                    "SELECT deliver_at, courier_note FROM delivery_details WHERE fulfillment_id = ?1",
                )
                .bind(&fulfillment_id)
                .fetch_optional(&self.pool)
                .await?;
                let (deliver_at, courier_note) = detail.unwrap_or((None, None));
                FulfillmentDetails::Delivery(DeliveryDetails {
                    recipient: recipient.ok_or(CoreError::MissingAttribute {
                        field: "recipient".to_string(),
                    })?,
                    deliver_at,
                    courier_note,
                })
            }
            other => {
                return Err(DbError::Internal(format!(
                    "unknown fulfillment kind in row: {other}"
                )))
            }
        };

        let fulfillment = Fulfillment::new(
            details.kind(),
            parse_fulfillment_state(&state)?,
            details,
        )
        .map_err(DbError::Domain)?;
        Ok(Some(fulfillment))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RecipientRow {
    display_name: String,
    email: String,
    phone: String,
    address_line_1: String,
    address_line_2: Option<String>,
    locality: String,
    administrative_district: Option<String>,
    postal_code: String,
    country: String,
}

impl From<RecipientRow> for Recipient {
    fn from(row: RecipientRow) -> Self {
        Recipient {
            display_name: row.display_name,
            email: row.email,
            phone: row.phone,
            address: meridian_core::fulfillment::Address {
                line_1: row.address_line_1,
                line_2: row.address_line_2,
                locality: row.locality,
                administrative_district: row.administrative_district,
                postal_code: row.postal_code,
                country: row.country,
            },
        }
    }
}

// =============================================================================
// Transaction Helpers
// =============================================================================

async fn upsert_order(tx: &mut Transaction<'_, Sqlite>, order: &Order) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, reference_id, location_id, state, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (id) DO UPDATE SET
            reference_id = excluded.reference_id,
            location_id = excluded.location_id,
            state = excluded.state,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&order.id)
    .bind(&order.reference_id)
    .bind(&order.location_id)
    .bind(state_str(order.state))
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_line(tx: &mut Transaction<'_, Sqlite>, line: &OrderLine) -> DbResult<()> {
    // Natural key upsert: the existing row keeps its id and correlation
    // uid, only the mutable fields move
    sqlx::query(
        r#"
        INSERT INTO order_lines
            (id, order_id, product_id, quantity, unit_price_cents, note, correlation_uid)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT (order_id, product_id) DO UPDATE SET
            quantity = excluded.quantity,
            unit_price_cents = excluded.unit_price_cents,
            note = excluded.note
        "#,
    )
    .bind(&line.id)
    .bind(&line.order_id)
    .bind(&line.product_id)
    .bind(line.quantity)
    .bind(line.unit_price.cents())
    .bind(&line.note)
    .bind(&line.correlation_uid)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Persists the deductible definition (if new) and its attachment row.
///
/// `INSERT OR IGNORE` on the (deductible, parent) unique key makes the
/// attachment idempotent at the storage level too.
async fn save_deductible_attachment(
    tx: &mut Transaction<'_, Sqlite>,
    target: &AttachmentTarget,
    attached: &AttachedDeductible,
) -> DbResult<()> {
    let (kind, tax_mode) = match attached.deductible.kind {
        DeductibleKind::Discount => ("discount", None),
        DeductibleKind::Tax { mode } => ("tax", Some(tax_mode_str(mode))),
    };
    sqlx::query(
        "INSERT OR IGNORE INTO deductibles (id, name, kind, tax_mode, amount_cents, percentage_bps)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )
    .bind(&attached.deductible.id)
    .bind(&attached.deductible.name)
    .bind(kind)
    .bind(tax_mode)
    .bind(attached.deductible.pricing.fixed_amount().map(|a| a.cents()))
    .bind(attached.deductible.pricing.percentage().map(|p| p.bps() as i64))
    .execute(&mut **tx)
    .await?;

    let pivot_id = attached
        .pivot_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    sqlx::query(
        "INSERT OR IGNORE INTO deductible_attachments (id, deductible_id, target_kind, target_id, scope)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&pivot_id)
    .bind(&attached.deductible.id)
    .bind(target.kind_str())
    .bind(target.target_id())
    .bind(scope_str(attached.scope))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn save_charge_attachment(
    tx: &mut Transaction<'_, Sqlite>,
    target: &AttachmentTarget,
    attached: &AttachedServiceCharge,
) -> DbResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO service_charges
             (id, name, amount_cents, percentage_bps, calculation_phase, treatment_type, taxable)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(&attached.charge.id)
    .bind(&attached.charge.name)
    .bind(attached.charge.pricing.fixed_amount().map(|a| a.cents()))
    .bind(attached.charge.pricing.percentage().map(|p| p.bps() as i64))
    .bind(phase_str(attached.charge.calculation_phase))
    .bind(treatment_str(attached.charge.treatment_type))
    .bind(attached.charge.taxable)
    .execute(&mut **tx)
    .await?;

    let pivot_id = attached
        .pivot_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    sqlx::query(
        "INSERT OR IGNORE INTO service_charge_attachments (id, service_charge_id, target_kind, target_id, scope)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&pivot_id)
    .bind(&attached.charge.id)
    .bind(target.kind_str())
    .bind(target.target_id())
    .bind(scope_str(attached.scope))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Replaces the order's fulfillment rows wholesale (still one per order).
async fn save_fulfillment(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
    fulfillment: &Fulfillment,
) -> DbResult<()> {
    // Detail and recipient rows cascade with the header
    sqlx::query("DELETE FROM fulfillments WHERE order_id = ?1")
        .bind(order_id)
        .execute(&mut **tx)
        .await?;

    let fulfillment_id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO fulfillments (id, order_id, kind, state) VALUES (?1, ?2, ?3, ?4)")
        .bind(&fulfillment_id)
        .bind(order_id)
        .bind(kind_str(fulfillment.kind))
        .bind(fulfillment_state_str(fulfillment.state))
        .execute(&mut **tx)
        .await?;

    match &fulfillment.details {
        FulfillmentDetails::Pickup(details) => {
            sqlx::query(
                "INSERT INTO pickup_details (fulfillment_id, pickup_at, note) VALUES (?1, ?2, ?3)",
            )
            .bind(&fulfillment_id)
            .bind(&details.pickup_at)
            .bind(&details.note)
            .execute(&mut **tx)
            .await?;
        }
        FulfillmentDetails::Shipment(details) => {
            sqlx::query(
                "INSERT INTO shipment_details (fulfillment_id, carrier, tracking_number)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(&fulfillment_id)
            .bind(&details.carrier)
            .bind(&details.tracking_number)
            .execute(&mut **tx)
            .await?;
        }
        FulfillmentDetails::Delivery(details) => {
            sqlx::query(
                "INSERT INTO delivery_details (fulfillment_id, deliver_at, courier_note)
                 VALUES (?1, ?2, ?3)",
            )
            .bind(&fulfillment_id)
            .bind(&details.deliver_at)
            .bind(&details.courier_note)
            .execute(&mut **tx)
            .await?;
        }
    }

    if let Some(recipient) = fulfillment.details.recipient() {
        sqlx::query(
            "INSERT INTO fulfillment_recipients
                 (fulfillment_id, display_name, email, phone,
                  address_line_1, address_line_2, locality,
                  administrative_district, postal_code, country)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&fulfillment_id)
        .bind(&recipient.display_name)
        .bind(&recipient.email)
        .bind(&recipient.phone)
        .bind(&recipient.address.line_1)
        .bind(&recipient.address.line_2)
        .bind(&recipient.address.locality)
        .bind(&recipient.address.administrative_district)
        .bind(&recipient.address.postal_code)
        .bind(&recipient.address.country)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::compose::compose;
    use meridian_core::deductible::{Deductible, Pricing};
    use meridian_core::input::{DeductibleDraft, LineDraft, OrderDraft};
    use meridian_core::money::Percentage;
    use meridian_core::pricing::total_cost;
    use meridian_core::types::{EngineConfig, Product};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_and_reload_graph() {
        let db = test_db().await;
        let catalog = db.catalog();
        let orders = db.orders();
        let config = EngineConfig::default();

        let espresso = Product::new("Espresso", Some(Money::from_cents(300)));
        catalog.upsert_product(&espresso).await.unwrap();
        let discount = Deductible::discount("Member", Pricing::Percentage(Percentage::from_bps(1000)));
        catalog.upsert_deductible(&discount).await.unwrap();

        // Compose in memory against the persisted catalog
        let (order, store) = {
            let mut store = InMemoryStore::new();
            store.insert_product(espresso.clone());
            store.insert_deductible(discount.clone());
            (Order::new(), store)
        };
        let draft = OrderDraft {
            lines: vec![LineDraft::of(&espresso.id, 2)],
            discounts: vec![DeductibleDraft::existing(&discount.id)],
            ..Default::default()
        };
        let copy = compose(&order, &draft, &store, &config).unwrap();

        orders.save_composed(&copy).await.unwrap();

        // Reload and recompose: identical semantics, identical total
        let (loaded_order, loaded_store) = orders.load_graph(&order.id).await.unwrap().unwrap();
        assert_eq!(loaded_order.id, order.id);

        let recomposed = compose(&loaded_order, &draft, &loaded_store, &config).unwrap();
        assert_eq!(recomposed.lines.len(), 1);
        assert_eq!(recomposed.discounts.len(), 1);
        assert_eq!(
            total_cost(&recomposed).unwrap(),
            total_cost(&copy).unwrap()
        );
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let db = test_db().await;
        let catalog = db.catalog();
        let orders = db.orders();
        let config = EngineConfig::default();

        let espresso = Product::new("Espresso", Some(Money::from_cents(300)));
        catalog.upsert_product(&espresso).await.unwrap();

        let mut store = InMemoryStore::new();
        store.insert_product(espresso.clone());
        let order = Order::new();
        let draft = OrderDraft {
            lines: vec![LineDraft::of(&espresso.id, 1)],
            discounts: vec![DeductibleDraft::fixed("Promo", 50)],
            ..Default::default()
        };
        let copy = compose(&order, &draft, &store, &config).unwrap();

        orders.save_composed(&copy).await.unwrap();
        orders.save_composed(&copy).await.unwrap();

        let (_, loaded_store) = orders.load_graph(&order.id).await.unwrap().unwrap();
        let attachments = loaded_store
            .attachments_for(&AttachmentTarget::Order(order.id.clone()));
        assert_eq!(attachments.len(), 1);

        use meridian_core::store::CompositionStore;
        assert_eq!(loaded_store.order_lines(&order.id).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back_whole_copy() {
        let db = test_db().await;
        let orders = db.orders();
        let config = EngineConfig::default();

        // Compose against an in-memory product that was never persisted:
        // the line insert hits a foreign key violation
        let ghost = Product::new("Ghost", Some(Money::from_cents(100)));
        let mut store = InMemoryStore::new();
        store.insert_product(ghost.clone());
        let order = Order::new();
        let draft = OrderDraft {
            lines: vec![LineDraft::of(&ghost.id, 1)],
            ..Default::default()
        };
        let copy = compose(&order, &draft, &store, &config).unwrap();

        let err = orders.save_composed(&copy).await.unwrap_err();
        assert!(matches!(err, DbError::ForeignKeyViolation { .. }));

        // Nothing landed, not even the order row
        assert!(orders.get_order(&order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fulfillment_round_trip() {
        let db = test_db().await;
        let catalog = db.catalog();
        let orders = db.orders();
        let config = EngineConfig::default();

        let espresso = Product::new("Espresso", Some(Money::from_cents(300)));
        catalog.upsert_product(&espresso).await.unwrap();

        let mut store = InMemoryStore::new();
        store.insert_product(espresso.clone());
        let order = Order::new();

        let draft: OrderDraft = {
            use meridian_core::input::{FulfillmentDraft, PickupDetailsDraft};
            OrderDraft {
                lines: vec![LineDraft::of(&espresso.id, 1)],
                fulfillment: Some(FulfillmentDraft {
                    kind: "pickup".to_string(),
                    pickup_details: Some(PickupDetailsDraft {
                        recipient: None,
                        pickup_at: Some("17:00".to_string()),
                        note: None,
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }
        };
        let copy = compose(&order, &draft, &store, &config).unwrap();
        orders.save_composed(&copy).await.unwrap();

        let (_, loaded_store) = orders.load_graph(&order.id).await.unwrap().unwrap();
        use meridian_core::store::CompositionStore;
        let fulfillment = loaded_store.order_fulfillment(&order.id).unwrap();
        assert_eq!(fulfillment.kind, FulfillmentKind::Pickup);
        match fulfillment.details {
            FulfillmentDetails::Pickup(details) => {
                assert_eq!(details.pickup_at.as_deref(), Some("17:00"));
            }
            other => panic!("expected pickup details, got {other:?}"),
        }

        // Composing a second fulfillment against the reloaded graph fails
        let err = compose(&order, &draft, &loaded_store, &config).unwrap_err();
        assert!(matches!(err, CoreError::InvalidOrder { .. }));
    }
}
