//! Store catalog, purchases and fulfilment
//!
//! A purchase debits the buyer at purchase time: the `store_purchase` row is
//! created and posted, and the pending order inserted, in one unit of work.
//! Fulfilment only changes the order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use super::directory::EmployeeDirectory;
use super::locks::KeyedLocks;
use super::notify::{Notification, Notifier};
use crate::core::{LedgerStore, TransactionService, UnitOfWork};
use crate::types::{AccountId, EmployeeId, LedgerError, NewTransaction, TransactionId, TransactionType};

pub type ProductId = Uuid;
pub type OrderId = Uuid;

/// Coins per US dollar unless configured otherwise
pub const DEFAULT_GUINCOIN_PER_USD: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Convert a dollar price to coins, rounded half away from zero to cents
pub fn usd_to_guincoin(usd: Decimal, guincoin_per_usd: Decimal) -> Decimal {
    (usd * guincoin_per_usd).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Where a catalog entry came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductSource {
    /// Created by an admin with a coin price
    Custom,

    /// Imported with a dollar price
    Amazon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreProduct {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub source: ProductSource,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_guincoin: Decimal,
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price_usd: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Fulfilled,
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PurchaseStatus::Pending => "pending",
            PurchaseStatus::Fulfilled => "fulfilled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseOrder {
    pub id: OrderId,
    pub employee_id: EmployeeId,
    pub product_id: ProductId,
    #[serde(with = "rust_decimal::serde::float")]
    pub price_guincoin: Decimal,
    pub status: PurchaseStatus,
    pub transaction_id: TransactionId,
    pub shipping_address: Option<String>,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub fulfilled_by_id: Option<EmployeeId>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub struct PurchaseFlow<S: LedgerStore> {
    ledger: TransactionService<S>,
    directory: Arc<EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    spend_locks: Arc<KeyedLocks<AccountId>>,
    guincoin_per_usd: Decimal,
    products: DashMap<ProductId, StoreProduct>,
    orders: Arc<DashMap<OrderId, PurchaseOrder>>,
}

impl<S: LedgerStore> PurchaseFlow<S> {
    pub fn new(
        ledger: TransactionService<S>,
        directory: Arc<EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
        spend_locks: Arc<KeyedLocks<AccountId>>,
        guincoin_per_usd: Decimal,
    ) -> Self {
        Self {
            ledger,
            directory,
            notifier,
            spend_locks,
            guincoin_per_usd,
            products: DashMap::new(),
            orders: Arc::new(DashMap::new()),
        }
    }

    pub fn add_product(
        &self,
        name: &str,
        price_guincoin: Decimal,
        description: Option<String>,
    ) -> Result<StoreProduct, LedgerError> {
        self.insert_product(name, description, ProductSource::Custom, price_guincoin, None)
    }

    /// Add a product priced in dollars, converted at the configured rate
    pub fn add_product_usd(
        &self,
        name: &str,
        price_usd: Decimal,
        description: Option<String>,
    ) -> Result<StoreProduct, LedgerError> {
        if price_usd <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(price_usd));
        }
        let price_guincoin = usd_to_guincoin(price_usd, self.guincoin_per_usd);
        self.insert_product(
            name,
            description,
            ProductSource::Amazon,
            price_guincoin,
            Some(price_usd),
        )
    }

    pub fn deactivate_product(&self, product_id: ProductId) -> Result<StoreProduct, LedgerError> {
        let mut product = self
            .products
            .get_mut(&product_id)
            .ok_or_else(|| LedgerError::record_not_found("product", product_id))?;
        product.is_active = false;
        Ok(product.clone())
    }

    pub fn product(&self, product_id: ProductId) -> Option<StoreProduct> {
        self.products
            .get(&product_id)
            .map(|entry| entry.value().clone())
    }

    /// Buy a product, debiting the buyer immediately
    ///
    /// A blank `shipping_address` is stored as none.
    ///
    /// # Errors
    ///
    /// * `EmployeeNotFound` / `RecordNotFound` - Unknown buyer or product
    /// * `Validation` - The product is no longer sold
    /// * `InsufficientFunds` - The price exceeds the buyer's spendable balance
    pub fn purchase(
        &self,
        employee_id: EmployeeId,
        product_id: ProductId,
        shipping_address: Option<String>,
    ) -> Result<PurchaseOrder, LedgerError> {
        let employee = self.directory.require(employee_id)?;
        let product = self
            .product(product_id)
            .ok_or_else(|| LedgerError::record_not_found("product", product_id))?;
        if !product.is_active {
            return Err(LedgerError::validation(format!(
                "product '{}' is not available",
                product.name
            )));
        }

        let _spend = self.spend_locks.acquire(employee.account_id)?;
        let available = self.ledger.spendable_balance(employee.account_id)?;
        if product.price_guincoin > available {
            return Err(LedgerError::insufficient_funds(
                employee.account_id,
                available,
                product.price_guincoin,
            ));
        }

        let mut unit = self.ledger.begin();
        let debit = self.ledger.create_pending_transaction_in(
            &mut unit,
            NewTransaction::new(
                employee.account_id,
                TransactionType::StorePurchase,
                product.price_guincoin,
            )
            .with_description(format!("Store purchase: {}", product.name))
            .with_source_employee(employee.id),
        )?;
        let debit = self.ledger.post_transaction_in(&mut unit, debit.id)?;

        let order = PurchaseOrder {
            id: Uuid::new_v4(),
            employee_id: employee.id,
            product_id: product.id,
            price_guincoin: product.price_guincoin,
            status: PurchaseStatus::Pending,
            transaction_id: debit.id,
            shipping_address: non_blank(shipping_address),
            tracking_number: None,
            notes: None,
            fulfilled_by_id: None,
            fulfilled_at: None,
            created_at: debit.created_at,
        };
        let orders = Arc::clone(&self.orders);
        let staged = order.clone();
        unit.defer(Box::new(move || {
            orders.insert(staged.id, staged);
        }));
        unit.commit()?;

        tracing::info!(
            order = %order.id,
            employee = %employee.id,
            product = %product.id,
            price = %order.price_guincoin,
            "store purchase"
        );
        Ok(order)
    }

    /// Mark a pending order as fulfilled and tell the buyer
    pub fn fulfill(
        &self,
        order_id: OrderId,
        staff_id: EmployeeId,
        tracking_number: Option<String>,
        notes: Option<String>,
    ) -> Result<PurchaseOrder, LedgerError> {
        let staff = self.directory.require(staff_id)?;
        if !staff.is_admin {
            return Err(LedgerError::validation(format!(
                "employee {} cannot fulfil orders",
                staff.email
            )));
        }

        let order = {
            let mut entry = self
                .orders
                .get_mut(&order_id)
                .ok_or_else(|| LedgerError::record_not_found("purchase order", order_id))?;
            let order = entry.value_mut();
            if order.status != PurchaseStatus::Pending {
                return Err(LedgerError::record_not_pending(
                    "purchase order",
                    order_id,
                    order.status,
                ));
            }
            order.status = PurchaseStatus::Fulfilled;
            order.tracking_number = tracking_number;
            order.notes = notes;
            order.fulfilled_by_id = Some(staff.id);
            order.fulfilled_at = Some(Utc::now());
            order.clone()
        };

        let product = self
            .product(order.product_id)
            .map(|product| product.name)
            .unwrap_or_default();
        tracing::info!(order = %order.id, staff = %staff.id, "order fulfilled");
        self.notifier.notify(&Notification::PurchaseFulfilled {
            employee: order.employee_id,
            order: order.id,
            product,
            tracking_number: order.tracking_number.clone(),
        });
        Ok(order)
    }

    /// Orders awaiting fulfilment, oldest first
    pub fn pending_orders(&self) -> Vec<PurchaseOrder> {
        let mut orders = self.orders_where(|order| order.status == PurchaseStatus::Pending);
        orders.reverse();
        orders
    }

    /// Orders with the given status, or all of them, newest first
    pub fn orders(&self, status: Option<PurchaseStatus>) -> Vec<PurchaseOrder> {
        self.orders_where(|order| status.map_or(true, |status| order.status == status))
    }

    // Helper functions

    fn orders_where(&self, keep: impl Fn(&PurchaseOrder) -> bool) -> Vec<PurchaseOrder> {
        let mut orders: Vec<PurchaseOrder> = self
            .orders
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders
    }

    fn insert_product(
        &self,
        name: &str,
        description: Option<String>,
        source: ProductSource,
        price_guincoin: Decimal,
        price_usd: Option<Decimal>,
    ) -> Result<StoreProduct, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::validation("product name is required"));
        }
        if price_guincoin <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(price_guincoin));
        }

        let product = StoreProduct {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: non_blank(description),
            source,
            price_guincoin,
            price_usd,
            is_active: true,
            created_at: Utc::now(),
        };
        self.products.insert(product.id, product.clone());
        Ok(product)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
