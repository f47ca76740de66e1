//! # Catalog Repository
//!
//! CRUD for the reusable catalog entities: products, deductibles,
//! service charges, modifiers, and customers.
//!
//! ## Load-Time Re-Validation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Rows come back as loosely-typed (amount?, percentage?) pairs and      │
//! │  string discriminators. Every load goes back through the same          │
//! │  constructors composition uses:                                         │
//! │                                                                         │
//! │    deductible row   → Pricing::from_parts → Deductible                 │
//! │    charge row       → ServiceCharge::from_persisted (full state        │
//! │                       machine validation)                               │
//! │                                                                         │
//! │  A row edited outside the application can therefore never smuggle an   │
//! │  illegal combination into a priced order; it surfaces as               │
//! │  DbError::Domain on load instead.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use meridian_core::deductible::{Deductible, DeductibleKind, Pricing, TaxMode};
use meridian_core::fulfillment::{Address, Recipient};
use meridian_core::money::Money;
use meridian_core::service_charge::{CalculationPhase, ServiceCharge, TreatmentType};
use meridian_core::types::{Modifier, Product};

use crate::error::{DbError, DbResult};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    name: String,
    unit_price_cents: Option<i64>,
    note: Option<String>,
    catalog_ref: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            unit_price: row.unit_price_cents.map(Money::from_cents),
            note: row.note,
            catalog_ref: row.catalog_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeductibleRow {
    id: String,
    name: String,
    kind: String,
    tax_mode: Option<String>,
    amount_cents: Option<i64>,
    percentage_bps: Option<i64>,
}

impl DeductibleRow {
    fn into_domain(self) -> DbResult<Deductible> {
        let pricing = Pricing::from_parts(
            self.amount_cents,
            self.percentage_bps.map(|bps| bps as u32),
            "deductible",
        )?;
        let kind = match self.kind.as_str() {
            "discount" => DeductibleKind::Discount,
            "tax" => DeductibleKind::Tax {
                mode: parse_tax_mode(self.tax_mode.as_deref())?,
            },
            other => {
                return Err(DbError::Internal(format!(
                    "unknown deductible kind in row {}: {other}",
                    self.id
                )))
            }
        };
        Ok(Deductible {
            id: self.id,
            name: self.name,
            pricing,
            kind,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ServiceChargeRow {
    id: String,
    name: String,
    amount_cents: Option<i64>,
    percentage_bps: Option<i64>,
    calculation_phase: String,
    treatment_type: String,
    taxable: bool,
}

impl ServiceChargeRow {
    fn into_domain(self) -> DbResult<ServiceCharge> {
        let pricing = Pricing::from_parts(
            self.amount_cents,
            self.percentage_bps.map(|bps| bps as u32),
            "service_charge",
        )?;
        let charge = ServiceCharge::from_persisted(
            self.id,
            self.name,
            pricing,
            parse_phase(&self.calculation_phase)?,
            parse_treatment(&self.treatment_type)?,
            self.taxable,
        )?;
        Ok(charge)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ModifierRow {
    id: String,
    name: String,
    price_cents: i64,
}

impl From<ModifierRow> for Modifier {
    fn from(row: ModifierRow) -> Self {
        Modifier {
            id: row.id,
            name: row.name,
            price: Money::from_cents(row.price_cents),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
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

impl From<CustomerRow> for Recipient {
    fn from(row: CustomerRow) -> Self {
        Recipient {
            display_name: row.display_name,
            email: row.email,
            phone: row.phone,
            address: Address {
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
// Discriminator Mapping
// =============================================================================

pub(crate) fn tax_mode_str(mode: TaxMode) -> &'static str {
    match mode {
        TaxMode::Additive => "additive",
        TaxMode::Inclusive => "inclusive",
    }
}

pub(crate) fn parse_tax_mode(mode: Option<&str>) -> DbResult<TaxMode> {
    match mode {
        Some("additive") => Ok(TaxMode::Additive),
        Some("inclusive") => Ok(TaxMode::Inclusive),
        other => Err(DbError::Internal(format!(
            "unknown tax mode in row: {other:?}"
        ))),
    }
}

pub(crate) fn phase_str(phase: CalculationPhase) -> &'static str {
    match phase {
        CalculationPhase::Subtotal => "subtotal",
        CalculationPhase::Total => "total",
        CalculationPhase::ApportionedAmount => "apportioned_amount",
        CalculationPhase::ApportionedPercentage => "apportioned_percentage",
    }
}

pub(crate) fn parse_phase(phase: &str) -> DbResult<CalculationPhase> {
    match phase {
        "subtotal" => Ok(CalculationPhase::Subtotal),
        "total" => Ok(CalculationPhase::Total),
        "apportioned_amount" => Ok(CalculationPhase::ApportionedAmount),
        "apportioned_percentage" => Ok(CalculationPhase::ApportionedPercentage),
        other => Err(DbError::Internal(format!(
            "unknown calculation phase in row: {other}"
        ))),
    }
}

pub(crate) fn treatment_str(treatment: TreatmentType) -> &'static str {
    match treatment {
        TreatmentType::LineItem => "line_item",
        TreatmentType::Apportioned => "apportioned",
    }
}

pub(crate) fn parse_treatment(treatment: &str) -> DbResult<TreatmentType> {
    match treatment {
        "line_item" => Ok(TreatmentType::LineItem),
        "apportioned" => Ok(TreatmentType::Apportioned),
        other => Err(DbError::Internal(format!(
            "unknown treatment type in row: {other}"
        ))),
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for catalog entities.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // --- products ---

    /// Inserts or replaces a product.
    pub async fn upsert_product(&self, product: &Product) -> DbResult<()> {
        debug!(product_id = %product.id, "Upserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, unit_price_cents, note, catalog_ref, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                unit_price_cents = excluded.unit_price_cents,
                note = excluded.note,
                catalog_ref = excluded.catalog_ref,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.unit_price.map(|p| p.cents()))
        .bind(&product.note)
        .bind(&product.catalog_ref)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a product by id.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(
            "SELECT id, name, unit_price_cents, note, catalog_ref, created_at, updated_at
             FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Lists all products, newest first.
    pub async fn list_products(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, name, unit_price_cents, note, catalog_ref, created_at, updated_at
             FROM products ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    // --- deductibles ---

    /// Inserts or replaces a deductible definition.
    pub async fn upsert_deductible(&self, deductible: &Deductible) -> DbResult<()> {
        let (kind, tax_mode) = match deductible.kind {
            DeductibleKind::Discount => ("discount", None),
            DeductibleKind::Tax { mode } => ("tax", Some(tax_mode_str(mode))),
        };

        sqlx::query(
            r#"
            INSERT INTO deductibles (id, name, kind, tax_mode, amount_cents, percentage_bps)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                kind = excluded.kind,
                tax_mode = excluded.tax_mode,
                amount_cents = excluded.amount_cents,
                percentage_bps = excluded.percentage_bps
            "#,
        )
        .bind(&deductible.id)
        .bind(&deductible.name)
        .bind(kind)
        .bind(tax_mode)
        .bind(deductible.pricing.fixed_amount().map(|a| a.cents()))
        .bind(deductible.pricing.percentage().map(|p| p.bps() as i64))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a deductible by id, re-validating the pricing invariant.
    pub async fn get_deductible(&self, id: &str) -> DbResult<Option<Deductible>> {
        let row: Option<DeductibleRow> = sqlx::query_as(
            "SELECT id, name, kind, tax_mode, amount_cents, percentage_bps
             FROM deductibles WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeductibleRow::into_domain).transpose()
    }

    // --- service charges ---

    /// Inserts or replaces a service charge definition.
    ///
    /// The value was validated at construction; the row stores the same
    /// fields it was built from.
    pub async fn upsert_service_charge(&self, charge: &ServiceCharge) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO service_charges
                (id, name, amount_cents, percentage_bps, calculation_phase, treatment_type, taxable)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                amount_cents = excluded.amount_cents,
                percentage_bps = excluded.percentage_bps,
                calculation_phase = excluded.calculation_phase,
                treatment_type = excluded.treatment_type,
                taxable = excluded.taxable
            "#,
        )
        .bind(&charge.id)
        .bind(&charge.name)
        .bind(charge.pricing.fixed_amount().map(|a| a.cents()))
        .bind(charge.pricing.percentage().map(|p| p.bps() as i64))
        .bind(phase_str(charge.calculation_phase))
        .bind(treatment_str(charge.treatment_type))
        .bind(charge.taxable)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a service charge by id, re-running state machine validation.
    pub async fn get_service_charge(&self, id: &str) -> DbResult<Option<ServiceCharge>> {
        let row: Option<ServiceChargeRow> = sqlx::query_as(
            "SELECT id, name, amount_cents, percentage_bps, calculation_phase, treatment_type, taxable
             FROM service_charges WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ServiceChargeRow::into_domain).transpose()
    }

    // --- modifiers ---

    /// Inserts or replaces a modifier.
    pub async fn upsert_modifier(&self, modifier: &Modifier) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO modifiers (id, name, price_cents)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                price_cents = excluded.price_cents
            "#,
        )
        .bind(&modifier.id)
        .bind(&modifier.name)
        .bind(modifier.price.cents())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a modifier by id.
    pub async fn get_modifier(&self, id: &str) -> DbResult<Option<Modifier>> {
        let row: Option<ModifierRow> =
            sqlx::query_as("SELECT id, name, price_cents FROM modifiers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Modifier::from))
    }

    // --- customers ---

    /// Inserts or replaces a customer's recipient contact data.
    pub async fn upsert_customer(&self, id: &str, recipient: &Recipient) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers
                (id, display_name, email, phone,
                 address_line_1, address_line_2, locality,
                 administrative_district, postal_code, country)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (id) DO UPDATE SET
                display_name = excluded.display_name,
                email = excluded.email,
                phone = excluded.phone,
                address_line_1 = excluded.address_line_1,
                address_line_2 = excluded.address_line_2,
                locality = excluded.locality,
                administrative_district = excluded.administrative_district,
                postal_code = excluded.postal_code,
                country = excluded.country
            "#,
        )
        .bind(id)
        .bind(&recipient.display_name)
        .bind(&recipient.email)
        .bind(&recipient.phone)
        .bind(&recipient.address.line_1)
        .bind(&recipient.address.line_2)
        .bind(&recipient.address.locality)
        .bind(&recipient.address.administrative_district)
        .bind(&recipient.address.postal_code)
        .bind(&recipient.address.country)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Resolves a customer id to recipient contact data.
    pub async fn get_customer_recipient(&self, id: &str) -> DbResult<Option<Recipient>> {
        let row: Option<CustomerRow> = sqlx::query_as(
            "SELECT display_name, email, phone,
                    address_line_1, address_line_2, locality,
                    administrative_district, postal_code, country
             FROM customers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Recipient::from))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use meridian_core::money::Percentage;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_product_round_trip() {
        let db = test_db().await;
        let catalog = db.catalog();

        let product = Product::new("Espresso", Some(Money::from_cents(300)));
        catalog.upsert_product(&product).await.unwrap();

        let loaded = catalog.get_product(&product.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Espresso");
        assert_eq!(loaded.unit_price, Some(Money::from_cents(300)));

        let variable = Product::new("Market Fish", None);
        catalog.upsert_product(&variable).await.unwrap();
        let loaded = catalog.get_product(&variable.id).await.unwrap().unwrap();
        assert!(loaded.is_variable_priced());

        assert!(catalog.get_product("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deductible_round_trip() {
        let db = test_db().await;
        let catalog = db.catalog();

        let tax = Deductible::tax(
            "VAT",
            Pricing::Percentage(Percentage::from_bps(2100)),
            TaxMode::Inclusive,
        );
        catalog.upsert_deductible(&tax).await.unwrap();

        let loaded = catalog.get_deductible(&tax.id).await.unwrap().unwrap();
        assert_eq!(loaded.kind, DeductibleKind::Tax { mode: TaxMode::Inclusive });
        assert_eq!(loaded.pricing.percentage().unwrap().bps(), 2100);

        let discount = Deductible::discount("Promo", Pricing::Fixed(Money::from_cents(500)));
        catalog.upsert_deductible(&discount).await.unwrap();
        let loaded = catalog.get_deductible(&discount.id).await.unwrap().unwrap();
        assert_eq!(loaded.pricing.fixed_amount(), Some(Money::from_cents(500)));
    }

    #[tokio::test]
    async fn test_service_charge_round_trip() {
        let db = test_db().await;
        let catalog = db.catalog();

        let charge = ServiceCharge::new(
            "Gratuity",
            Pricing::Percentage(Percentage::from_bps(1800)),
            CalculationPhase::ApportionedPercentage,
            TreatmentType::Apportioned,
            true,
        )
        .unwrap();
        catalog.upsert_service_charge(&charge).await.unwrap();

        let loaded = catalog.get_service_charge(&charge.id).await.unwrap().unwrap();
        assert_eq!(loaded.calculation_phase, CalculationPhase::ApportionedPercentage);
        assert!(loaded.taxable);
    }

    #[tokio::test]
    async fn test_tampered_service_charge_row_rejected_on_load() {
        let db = test_db().await;

        // Write an illegal combination (Total phase + taxable) straight
        // into the table, bypassing the domain constructors
        sqlx::query(
            "INSERT INTO service_charges
                 (id, name, amount_cents, percentage_bps, calculation_phase, treatment_type, taxable)
             VALUES ('sc-bad', 'Bad', 300, NULL, 'total', 'apportioned', 1)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let err = db.catalog().get_service_charge("sc-bad").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_customer_round_trip() {
        let db = test_db().await;
        let catalog = db.catalog();

        let recipient = Recipient {
            display_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+1-555-0100".to_string(),
            address: Address {
                line_1: "1 Analytical Way".to_string(),
                line_2: None,
                locality: "London".to_string(),
                administrative_district: None,
                postal_code: "SW1A 1AA".to_string(),
                country: "GB".to_string(),
            },
        };
        catalog.upsert_customer("cust-1", &recipient).await.unwrap();

        let loaded = catalog.get_customer_recipient("cust-1").await.unwrap().unwrap();
        assert_eq!(loaded, recipient);
    }
}
