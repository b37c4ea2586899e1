use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::cart::CartLineItem;
use crate::errors::DomainError;

pub const ORDER_ID_PREFIX: &str = "ORD";
/// Numbers below this are never assigned; the first generated order is 1001.
pub const ORDER_NUMBER_FLOOR: u64 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    /// Case-insensitive form used as the store key (`ord1001` -> `ORD1001`).
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn from_number(number: u64) -> Self {
        Self(format!("{ORDER_ID_PREFIX}{number}"))
    }

    /// Numeric suffix of an `ORD<n>` id, if it has one.
    pub fn number(&self) -> Option<u64> {
        self.0.strip_prefix(ORDER_ID_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Processing,
    Shipped,
    Delivered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub items: Vec<CartLineItem>,
    pub status: OrderStatus,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartLineItem::line_total).sum()
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }
}

/// Next order number given every number already handed out.
pub fn next_order_number(existing: impl IntoIterator<Item = u64>) -> u64 {
    existing.into_iter().fold(ORDER_NUMBER_FLOOR, u64::max) + 1
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{next_order_number, Order, OrderId, OrderStatus};
    use crate::domain::cart::CartLineItem;
    use crate::domain::product::{ProductId, Size};

    fn order(status: OrderStatus) -> Order {
        Order {
            id: OrderId("ORD1001".to_string()),
            items: vec![CartLineItem {
                product_id: ProductId("running".to_string()),
                size: Size::Small,
                quantity: 2,
                unit_price: Decimal::new(5999, 2),
            }],
            status,
            contact: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn order_ids_normalize_case() {
        assert_eq!(OrderId::normalize(" ord1001"), OrderId("ORD1001".to_string()));
        assert_eq!(OrderId::normalize("ORD1001").number(), Some(1001));
        assert_eq!(OrderId::normalize("gift-card").number(), None);
    }

    #[test]
    fn next_number_starts_at_1001_and_follows_the_maximum() {
        assert_eq!(next_order_number([]), 1001);
        assert_eq!(next_order_number([1001, 1005, 1003]), 1006);
        assert_eq!(next_order_number([7]), 1001);
    }

    #[test]
    fn status_moves_forward_only() {
        let mut order = order(OrderStatus::Processing);
        order.transition_to(OrderStatus::Shipped).expect("processing -> shipped");
        order.transition_to(OrderStatus::Delivered).expect("shipped -> delivered");

        let error = order.transition_to(OrderStatus::Processing).expect_err("no way back");
        assert!(matches!(error, crate::errors::DomainError::InvalidOrderTransition { .. }));
    }

    #[test]
    fn total_sums_line_items() {
        assert_eq!(order(OrderStatus::Shipped).total(), Decimal::new(11998, 2));
    }
}
