use chrono::Utc;
use rust_decimal::Decimal;

use freddie_core::domain::cart::CartLineItem;
use freddie_core::domain::order::{Order, OrderId, OrderStatus};
use freddie_core::domain::product::{ProductId, Size};

use crate::repositories::{OrderRepository, RepositoryError};

/// Orders every demo deployment starts with, so "where is ORD1001?" has an
/// answer on first launch. Historical prices differ from the live catalog.
const SAMPLE_ORDERS: &[SampleOrderContract] = &[
    SampleOrderContract {
        order_id: "ORD1001",
        product_id: "running",
        size: Size::Small,
        quantity: 2,
        unit_price_cents: 5999,
        status: OrderStatus::Shipped,
    },
    SampleOrderContract {
        order_id: "ORD1002",
        product_id: "walking",
        size: Size::Medium,
        quantity: 1,
        unit_price_cents: 4999,
        status: OrderStatus::Delivered,
    },
    SampleOrderContract {
        order_id: "ORD1003",
        product_id: "running",
        size: Size::Medium,
        quantity: 1,
        unit_price_cents: 5999,
        status: OrderStatus::Processing,
    },
    SampleOrderContract {
        order_id: "ORD1004",
        product_id: "walking",
        size: Size::Large,
        quantity: 1,
        unit_price_cents: 4999,
        status: OrderStatus::Delivered,
    },
    SampleOrderContract {
        order_id: "ORD1005",
        product_id: "running",
        size: Size::Small,
        quantity: 1,
        unit_price_cents: 5999,
        status: OrderStatus::Shipped,
    },
];

struct SampleOrderContract {
    order_id: &'static str,
    product_id: &'static str,
    size: Size,
    quantity: u32,
    unit_price_cents: i64,
    status: OrderStatus,
}

impl SampleOrderContract {
    fn to_order(&self) -> Order {
        Order {
            id: OrderId(self.order_id.to_string()),
            items: vec![CartLineItem {
                product_id: ProductId(self.product_id.to_string()),
                size: self.size,
                quantity: self.quantity,
                unit_price: Decimal::new(self.unit_price_cents, 2),
            }],
            status: self.status,
            contact: None,
            created_at: Utc::now(),
        }
    }
}

pub struct SampleOrders;

impl SampleOrders {
    /// Inserts the sample orders that are not present yet.
    pub async fn load(repo: &dyn OrderRepository) -> Result<SeedResult, RepositoryError> {
        let mut orders_seeded = Vec::new();
        for contract in SAMPLE_ORDERS {
            let id = OrderId(contract.order_id.to_string());
            if repo.find_by_id(&id).await?.is_some() {
                continue;
            }
            repo.save(contract.to_order()).await?;
            orders_seeded.push(contract.order_id);
        }

        tracing::debug!(
            event_name = "store.seed.sample_orders_loaded",
            seeded = orders_seeded.len(),
            "sample orders loaded"
        );
        Ok(SeedResult { orders_seeded })
    }

    /// Checks every sample order exists with its seeded status and line.
    pub async fn verify(repo: &dyn OrderRepository) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        for contract in SAMPLE_ORDERS {
            let found = repo.find_by_id(&OrderId(contract.order_id.to_string())).await?;
            let matches = found
                .map(|order| {
                    let expected = contract.to_order();
                    order.status == expected.status && order.items == expected.items
                })
                .unwrap_or(false);
            checks.push((contract.order_id, matches));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(VerificationResult { all_present, checks })
    }

    pub fn ids() -> impl Iterator<Item = &'static str> {
        SAMPLE_ORDERS.iter().map(|contract| contract.order_id)
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub orders_seeded: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
