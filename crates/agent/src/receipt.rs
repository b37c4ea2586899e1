use serde::Serialize;
use tera::{Context, Tera};

use freddie_core::domain::order::{Order, OrderId};
use freddie_core::pricing::format_money;

const RECEIPT_TEMPLATE: &str = "receipt.txt";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub subject: String,
    pub body: String,
}

/// Renders the plain-text receipt mailed after checkout.
#[derive(Clone, Debug)]
pub struct ReceiptRenderer {
    tera: Tera,
    store_name: String,
    currency: String,
}

#[derive(Serialize)]
struct ReceiptLine {
    quantity: u32,
    product: String,
    size: String,
    unit_price: String,
    line_total: String,
}

impl ReceiptRenderer {
    pub fn new(store_name: impl Into<String>, currency: impl Into<String>) -> tera::Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            RECEIPT_TEMPLATE,
            include_str!("../../../templates/receipt.txt.tera"),
        )?;
        Ok(Self { tera, store_name: store_name.into(), currency: currency.into() })
    }

    pub fn subject(order_id: &OrderId) -> String {
        format!("Your Receipt - Order {order_id}")
    }

    pub fn render(&self, order: &Order) -> tera::Result<Receipt> {
        let lines: Vec<ReceiptLine> = order
            .items
            .iter()
            .map(|line| ReceiptLine {
                quantity: line.quantity,
                product: line.product_id.display_name(),
                size: line.size.to_string(),
                unit_price: format_money(line.unit_price, &self.currency),
                line_total: format_money(line.line_total(), &self.currency),
            })
            .collect();

        let mut context = Context::new();
        context.insert("store_name", &self.store_name);
        context.insert("order_id", &order.id.0);
        context.insert("lines", &lines);
        context.insert("total", &format_money(order.total(), &self.currency));

        let body = self.tera.render(RECEIPT_TEMPLATE, &context)?;
        Ok(Receipt { subject: Self::subject(&order.id), body })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use freddie_core::domain::cart::CartLineItem;
    use freddie_core::domain::order::{Order, OrderId, OrderStatus};
    use freddie_core::domain::product::{ProductId, Size};

    use super::ReceiptRenderer;

    #[test]
    fn receipt_lists_numbered_lines_and_total() {
        let renderer = ReceiptRenderer::new("EOcean Shoe Store", "USD").expect("template");
        let order = Order {
            id: OrderId("ORD1006".to_string()),
            items: vec![
                CartLineItem {
                    product_id: ProductId("running".to_string()),
                    size: Size::Small,
                    quantity: 3,
                    unit_price: Decimal::new(8999, 2),
                },
                CartLineItem {
                    product_id: ProductId("walking".to_string()),
                    size: Size::Large,
                    quantity: 1,
                    unit_price: Decimal::new(6999, 2),
                },
            ],
            status: OrderStatus::Processing,
            contact: Some("zaid@example.com".to_string()),
            created_at: Utc::now(),
        };

        let receipt = renderer.render(&order).expect("render");

        assert_eq!(receipt.subject, "Your Receipt - Order ORD1006");
        assert!(receipt.body.starts_with("EOcean Shoe Store - Receipt\nOrder ID: ORD1006\n"));
        assert!(receipt.body.contains("1. 3x Running Shoes (Small) - $89.99 each = $269.97\n"));
        assert!(receipt.body.contains("2. 1x Walking Shoes (Large) - $69.99 each = $69.99\n"));
        assert!(receipt.body.contains("Total: $339.96"));
        assert!(receipt.body.contains("Thank you for shopping at EOcean Shoe Store!"));
    }
}
