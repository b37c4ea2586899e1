//! Shop operations behind the tools the model can call. Business failures are
//! returned as [`Outcome::Rejected`] data; only faults become `Err`.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use freddie_core::catalog::Catalog;
use freddie_core::domain::cart::{CartLineItem, CartMutation, MAX_LINE_QUANTITY};
use freddie_core::domain::conversation::UserContext;
use freddie_core::domain::order::{Order, OrderId, OrderStatus};
use freddie_core::domain::product::{Product, ProductId, Size};
use freddie_core::errors::{BusinessFailure, DomainError};
use freddie_core::pricing::{self, PricingSummary};
use freddie_store::{CartRepository, KeyedLocks, OrderRepository, RepositoryError};

use crate::notify::{DeliveryOutcome, Notification, Notifier, NotifyError};
use crate::receipt::{Receipt, ReceiptRenderer};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Rejected(BusinessFailure),
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&BusinessFailure> {
        match self {
            Self::Completed(_) => None,
            Self::Rejected(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("receipt rendering failed: {0}")]
    Receipt(#[from] tera::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum ProductInfo {
    Product { product: Product },
    /// Unmatched or empty queries list everything the store sells.
    Catalog { products: Vec<Product> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum CartChange {
    Updated { line: CartLineItem },
    Removed { line: CartLineItem },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CartTotal {
    pub total: Decimal,
    pub currency: String,
    pub item_count: u64,
    pub is_empty: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Checkout {
    pub order: Order,
    pub total: Decimal,
    pub currency: String,
    #[serde(skip)]
    pub receipt: Receipt,
    pub delivery: DeliveryOutcome,
}

pub struct ShopTools {
    catalog: Arc<Catalog>,
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    notifier: Arc<dyn Notifier>,
    receipts: ReceiptRenderer,
    cart_locks: KeyedLocks,
    currency: String,
}

impl ShopTools {
    pub fn new(
        catalog: Arc<Catalog>,
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        notifier: Arc<dyn Notifier>,
        receipts: ReceiptRenderer,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            orders,
            carts,
            notifier,
            receipts,
            cart_locks: KeyedLocks::new(),
            currency: currency.into(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub async fn lookup_order(&self, order_id: &str) -> Result<Outcome<Order>, ToolError> {
        let id = OrderId::normalize(order_id);
        if id.0.is_empty() {
            return Ok(Outcome::Rejected(BusinessFailure::validation(
                "Please provide your order number, for example ORD1001.",
            )));
        }

        match self.orders.find_by_id(&id).await? {
            Some(order) => Ok(Outcome::Completed(order)),
            None => Ok(Outcome::Rejected(BusinessFailure::not_found(format!(
                "Sorry, we couldn't find any order with the number {id}. Please check and try again."
            )))),
        }
    }

    pub fn get_product_info(&self, query: Option<&str>) -> ProductInfo {
        let matched = query.and_then(|query| {
            self.catalog.resolve(query).or_else(|| self.catalog.search(query))
        });
        match matched {
            Some(product) => ProductInfo::Product { product: product.clone() },
            None => ProductInfo::Catalog { products: self.catalog.products().to_vec() },
        }
    }

    pub async fn add_to_cart(
        &self,
        user_id: &str,
        product: &str,
        size: &str,
        quantity: i64,
    ) -> Result<Outcome<CartLineItem>, ToolError> {
        let (product, size) = match self.resolve_item(product, size) {
            Ok(resolved) => resolved,
            Err(failure) => return Ok(Outcome::Rejected(failure)),
        };
        let Some(quantity) = u32::try_from(quantity)
            .ok()
            .filter(|quantity| (1..=MAX_LINE_QUANTITY).contains(quantity))
        else {
            return Ok(Outcome::Rejected(BusinessFailure::validation(format!(
                "Quantity must be a whole number from 1 to {MAX_LINE_QUANTITY}."
            ))));
        };

        let _guard = self.cart_locks.lock(user_id).await;
        let mut cart = self.carts.load(user_id).await?;
        let held = cart.quantity_of(&product.id, size);
        if held + quantity > MAX_LINE_QUANTITY {
            return Ok(Outcome::Rejected(BusinessFailure::validation(format!(
                "Your cart already has {held} of those. A single item is limited to {MAX_LINE_QUANTITY} pairs."
            ))));
        }
        let line = cart.add(CartLineItem {
            product_id: product.id.clone(),
            size,
            quantity,
            unit_price: product.unit_price,
        })?;
        self.carts.save(user_id, cart).await?;

        info!(
            event_name = "tools.cart.item_added",
            user_id,
            product_id = %line.product_id,
            size = %line.size,
            added = quantity,
            line_quantity = line.quantity,
            "cart item added"
        );
        Ok(Outcome::Completed(line))
    }

    pub async fn modify_cart_item(
        &self,
        user_id: &str,
        product: &str,
        size: &str,
        quantity: i64,
    ) -> Result<Outcome<CartChange>, ToolError> {
        let product_id = ProductId::normalize(product);
        let Some(size) = Size::parse(size) else {
            return Ok(Outcome::Rejected(invalid_size(size)));
        };
        // Zero or less removes the line.
        let Some(target) = u32::try_from(quantity.max(0))
            .ok()
            .filter(|target| *target <= MAX_LINE_QUANTITY)
        else {
            return Ok(Outcome::Rejected(BusinessFailure::validation(format!(
                "Quantity must be at most {MAX_LINE_QUANTITY}. Use 0 to remove the item."
            ))));
        };

        let _guard = self.cart_locks.lock(user_id).await;
        let mut cart = self.carts.load(user_id).await?;
        let change = match cart.set_quantity(&product_id, size, target)? {
            CartMutation::Updated(line) => CartChange::Updated { line },
            CartMutation::Removed(line) => CartChange::Removed { line },
            CartMutation::NotFound => {
                return Ok(Outcome::Rejected(BusinessFailure::not_found(
                    "Item not found in your cart.",
                )))
            }
        };
        self.carts.save(user_id, cart).await?;

        info!(
            event_name = "tools.cart.item_modified",
            user_id,
            product_id = %product_id,
            size = %size,
            quantity,
            "cart item modified"
        );
        Ok(Outcome::Completed(change))
    }

    pub async fn view_cart(&self, user_id: &str) -> Result<PricingSummary, ToolError> {
        let cart = self.carts.load(user_id).await?;
        Ok(pricing::summarize(cart.lines(), &self.currency))
    }

    pub async fn get_cart_total(&self, user_id: &str) -> Result<CartTotal, ToolError> {
        let cart = self.carts.load(user_id).await?;
        Ok(CartTotal {
            total: cart.total(),
            currency: self.currency.clone(),
            item_count: cart.item_count(),
            is_empty: cart.is_empty(),
        })
    }

    /// Turns the cart into an order. The order is committed and the cart
    /// emptied before delivery is attempted, so a delivery failure never
    /// loses the purchase.
    pub async fn generate_receipt(
        &self,
        context: &UserContext,
    ) -> Result<Outcome<Checkout>, ToolError> {
        let user_id = context.user_id.as_str();
        let _guard = self.cart_locks.lock(user_id).await;

        let cart = self.carts.load(user_id).await?;
        if cart.is_empty() {
            return Ok(Outcome::Rejected(BusinessFailure::EmptyCart));
        }

        let order = Order {
            id: self.orders.reserve_id().await?,
            items: cart.lines().to_vec(),
            status: OrderStatus::Processing,
            contact: context.contact.clone(),
            created_at: Utc::now(),
        };
        let receipt = self.receipts.render(&order)?;

        self.orders.save(order.clone()).await?;
        self.carts.clear(user_id).await?;
        info!(
            event_name = "tools.checkout.order_committed",
            user_id,
            order_id = %order.id,
            total = %order.total(),
            "order committed"
        );

        let delivery = self.deliver(context, &order.id, &receipt).await;
        Ok(Outcome::Completed(Checkout {
            total: order.total(),
            currency: self.currency.clone(),
            order,
            receipt,
            delivery,
        }))
    }

    async fn deliver(
        &self,
        context: &UserContext,
        order_id: &OrderId,
        receipt: &Receipt,
    ) -> DeliveryOutcome {
        let Some(recipient) = context.contact.clone() else {
            return DeliveryOutcome::Skipped {
                reason: "no contact address was provided".to_string(),
            };
        };

        let notification = Notification {
            recipient: recipient.clone(),
            subject: receipt.subject.clone(),
            body: receipt.body.clone(),
        };
        match self.notifier.deliver(&notification).await {
            Ok(()) => DeliveryOutcome::Sent { recipient },
            Err(NotifyError::Disabled) => {
                DeliveryOutcome::Skipped { reason: "receipt delivery is disabled".to_string() }
            }
            Err(error) => {
                warn!(
                    event_name = "notify.delivery.failed",
                    order_id = %order_id,
                    channel = self.notifier.channel(),
                    error = %error,
                    "receipt delivery failed"
                );
                DeliveryOutcome::Failed { reason: error.to_string() }
            }
        }
    }

    fn resolve_item(&self, product: &str, size: &str) -> Result<(Product, Size), BusinessFailure> {
        let Some(product_entry) = self.catalog.resolve(product) else {
            let known: Vec<&str> =
                self.catalog.products().iter().map(|product| product.id.as_str()).collect();
            return Err(BusinessFailure::validation(format!(
                "We don't carry `{}`. Available products: {}.",
                product.trim(),
                known.join(", ")
            )));
        };
        let Some(size) = Size::parse(size) else {
            return Err(invalid_size(size));
        };
        if !product_entry.offers(size) {
            return Err(BusinessFailure::validation(format!(
                "{} are not available in size {size}.",
                product_entry.id.display_name()
            )));
        }
        Ok((product_entry.clone(), size))
    }
}

fn invalid_size(raw: &str) -> BusinessFailure {
    BusinessFailure::validation(format!(
        "`{}` is not a valid size. Choose small, medium or large.",
        raw.trim()
    ))
}
