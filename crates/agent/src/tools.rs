use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use freddie_core::domain::cart::MAX_LINE_QUANTITY;
use freddie_core::domain::conversation::UserContext;
use freddie_core::errors::BusinessFailure;
use freddie_core::pricing::format_money;

use crate::llm::ToolSpec;
use crate::shop::{CartChange, Outcome, ProductInfo, ShopTools, ToolError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    LookupOrder,
    GetProductInfo,
    AddToCart,
    ModifyCartItem,
    ViewCart,
    GetCartTotal,
    GenerateReceipt,
}

impl ToolName {
    pub const ALL: [ToolName; 7] = [
        ToolName::LookupOrder,
        ToolName::GetProductInfo,
        ToolName::AddToCart,
        ToolName::ModifyCartItem,
        ToolName::ViewCart,
        ToolName::GetCartTotal,
        ToolName::GenerateReceipt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LookupOrder => "lookup_order",
            Self::GetProductInfo => "get_product_info",
            Self::AddToCart => "add_to_cart",
            Self::ModifyCartItem => "modify_cart_item",
            Self::ViewCart => "view_cart",
            Self::GetCartTotal => "get_cart_total",
            Self::GenerateReceipt => "generate_receipt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == value)
    }

    pub fn spec(&self) -> ToolSpec {
        let (description, input_schema) = match self {
            Self::LookupOrder => (
                "Look up the status and items of an order by its order ID (for example ORD1001).",
                json!({
                    "type": "object",
                    "properties": {"order_id": {"type": "string", "description": "Order ID such as ORD1001."}},
                    "required": ["order_id"]
                }),
            ),
            Self::GetProductInfo => (
                "Get details about a product, or list every product when the query is empty or unknown.",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": ["string", "null"], "description": "Product type, e.g. running or walking. Omit to list all."}}
                }),
            ),
            Self::AddToCart => (
                "Add a product in a given size to the customer's cart.",
                json!({
                    "type": "object",
                    "properties": {
                        "product": {"type": "string", "description": "running or walking"},
                        "size": {"type": "string", "enum": ["small", "medium", "large"]},
                        "quantity": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_LINE_QUANTITY,
                            "default": 1
                        }
                    },
                    "required": ["product", "size"]
                }),
            ),
            Self::ModifyCartItem => (
                "Set the quantity of an item already in the cart. A quantity of 0 removes it.",
                json!({
                    "type": "object",
                    "properties": {
                        "product": {"type": "string"},
                        "size": {"type": "string", "enum": ["small", "medium", "large"]},
                        "quantity": {"type": "integer", "minimum": 0, "maximum": MAX_LINE_QUANTITY}
                    },
                    "required": ["product", "size", "quantity"]
                }),
            ),
            Self::ViewCart => (
                "Show the items in the customer's cart.",
                json!({"type": "object", "properties": {}}),
            ),
            Self::GetCartTotal => (
                "Get the total price of the customer's cart.",
                json!({"type": "object", "properties": {}}),
            ),
            Self::GenerateReceipt => (
                "Check out the cart: create the order, email the receipt and empty the cart. Returns the order ID, total and where the receipt went.",
                json!({"type": "object", "properties": {}}),
            ),
        };

        ToolSpec { name: self.as_str().to_string(), description: description.to_string(), input_schema }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    /// A business failure the customer can fix.
    Rejected,
    /// The active role may not call this tool.
    Denied,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Rejected => "rejected",
            Self::Denied => "denied",
        }
    }
}

/// What the model sees for one tool call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolOutput {
    pub status: ToolStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ToolOutput {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self { status: ToolStatus::Ok, message: message.into(), data }
    }

    pub fn rejected(failure: &BusinessFailure) -> Self {
        Self {
            status: ToolStatus::Rejected,
            message: failure.to_string(),
            data: json!({"kind": failure.kind()}),
        }
    }

    pub fn denied(reason_code: &str, message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Denied,
            message: message.into(),
            data: json!({"reason_code": reason_code}),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != ToolStatus::Ok
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.message.clone())
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn spec(&self) -> ToolSpec {
        self.name().spec()
    }

    async fn execute(&self, context: &UserContext, input: Value) -> Result<ToolOutput, ToolError>;
}

/// Adapts one [`ShopTools`] operation to the JSON tool-call boundary.
pub struct ShopTool {
    name: ToolName,
    shop: Arc<ShopTools>,
}

impl ShopTool {
    pub fn new(name: ToolName, shop: Arc<ShopTools>) -> Self {
        Self { name, shop }
    }
}

#[derive(Deserialize)]
struct LookupOrderArgs {
    order_id: String,
}

#[derive(Default, Deserialize)]
struct ProductInfoArgs {
    #[serde(default, alias = "product_type", alias = "product")]
    query: Option<String>,
}

#[derive(Deserialize)]
struct AddToCartArgs {
    product: String,
    size: String,
    #[serde(default = "default_quantity")]
    quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

#[derive(Deserialize)]
struct ModifyCartItemArgs {
    product: String,
    size: String,
    quantity: i64,
}

fn parse_args<T: for<'de> Deserialize<'de>>(name: ToolName, input: Value) -> Result<T, ToolOutput> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|error| {
        ToolOutput::rejected(&BusinessFailure::validation(format!(
            "invalid arguments for {name}: {error}"
        )))
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[async_trait]
impl Tool for ShopTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn execute(&self, context: &UserContext, input: Value) -> Result<ToolOutput, ToolError> {
        let user_id = context.user_id.as_str();
        let currency = self.shop.currency();

        let output = match self.name {
            ToolName::LookupOrder => {
                let args: LookupOrderArgs = match parse_args(self.name, input) {
                    Ok(args) => args,
                    Err(rejected) => return Ok(rejected),
                };
                match self.shop.lookup_order(&args.order_id).await? {
                    Outcome::Completed(order) => ToolOutput::ok(
                        format!("Order {} is {}.", order.id, order.status.as_str()),
                        to_value(&order),
                    ),
                    Outcome::Rejected(failure) => ToolOutput::rejected(&failure),
                }
            }
            ToolName::GetProductInfo => {
                let args: ProductInfoArgs = parse_args(self.name, input).unwrap_or_default();
                let info = self.shop.get_product_info(args.query.as_deref());
                let message = match &info {
                    ProductInfo::Product { product } => format!(
                        "{}: {} {}",
                        product.id.display_name(),
                        product.description,
                        format_money(product.unit_price, &product.currency)
                    ),
                    ProductInfo::Catalog { products } => {
                        format!("The store carries {} products.", products.len())
                    }
                };
                ToolOutput::ok(message, to_value(&info))
            }
            ToolName::AddToCart => {
                let args: AddToCartArgs = match parse_args(self.name, input) {
                    Ok(args) => args,
                    Err(rejected) => return Ok(rejected),
                };
                match self.shop.add_to_cart(user_id, &args.product, &args.size, args.quantity).await?
                {
                    Outcome::Completed(line) => ToolOutput::ok(
                        format!(
                            "{}x {} ({}) added to your cart. That line now holds {}.",
                            args.quantity,
                            line.product_id.display_name(),
                            line.size,
                            line.quantity
                        ),
                        to_value(&line),
                    ),
                    Outcome::Rejected(failure) => ToolOutput::rejected(&failure),
                }
            }
            ToolName::ModifyCartItem => {
                let args: ModifyCartItemArgs = match parse_args(self.name, input) {
                    Ok(args) => args,
                    Err(rejected) => return Ok(rejected),
                };
                match self
                    .shop
                    .modify_cart_item(user_id, &args.product, &args.size, args.quantity)
                    .await?
                {
                    Outcome::Completed(change) => {
                        let message = match &change {
                            CartChange::Updated { line } => format!(
                                "Updated quantity of {} ({}) to {}.",
                                line.product_id.display_name(),
                                line.size,
                                line.quantity
                            ),
                            CartChange::Removed { line } => format!(
                                "Removed {} ({}) from your cart.",
                                line.product_id.display_name(),
                                line.size
                            ),
                        };
                        ToolOutput::ok(message, to_value(&change))
                    }
                    Outcome::Rejected(failure) => ToolOutput::rejected(&failure),
                }
            }
            ToolName::ViewCart => {
                let summary = self.shop.view_cart(user_id).await?;
                let message = if summary.lines.is_empty() {
                    "Your cart is empty.".to_string()
                } else {
                    let lines: Vec<String> = summary
                        .lines
                        .iter()
                        .map(|priced| {
                            format!(
                                "- {}x {} ({}) @ {} each",
                                priced.line.quantity,
                                priced.line.product_id.display_name(),
                                priced.line.size,
                                format_money(priced.line.unit_price, currency)
                            )
                        })
                        .collect();
                    format!("Your cart contains:\n{}", lines.join("\n"))
                };
                ToolOutput::ok(message, to_value(&summary))
            }
            ToolName::GetCartTotal => {
                let total = self.shop.get_cart_total(user_id).await?;
                let message = if total.is_empty {
                    format!("Your cart is empty. The total is {}.", format_money(total.total, currency))
                } else {
                    format!("Your current total is {}.", format_money(total.total, currency))
                };
                ToolOutput::ok(message, to_value(&total))
            }
            ToolName::GenerateReceipt => match self.shop.generate_receipt(context).await? {
                Outcome::Completed(checkout) => {
                    let delivery = match &checkout.delivery {
                        crate::notify::DeliveryOutcome::Sent { recipient } => {
                            format!("The receipt was sent to {recipient}.")
                        }
                        crate::notify::DeliveryOutcome::Skipped { reason } => {
                            format!("No receipt was sent: {reason}.")
                        }
                        crate::notify::DeliveryOutcome::Failed { reason } => {
                            format!("The order is placed, but the receipt could not be sent: {reason}.")
                        }
                    };
                    ToolOutput::ok(
                        format!(
                            "Order {} placed. Total {}. {delivery}",
                            checkout.order.id,
                            format_money(checkout.total, currency)
                        ),
                        to_value(&checkout),
                    )
                }
                Outcome::Rejected(failure) => ToolOutput::rejected(&failure),
            },
        };

        Ok(output)
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolName, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry holding every shop operation.
    pub fn shop(shop: Arc<ShopTools>) -> Self {
        let mut registry = Self::default();
        for name in ToolName::ALL {
            registry.register(ShopTool::new(name, shop.clone()));
        }
        registry
    }

    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name(), Box::new(tool));
    }

    pub fn get(&self, name: ToolName) -> Option<&dyn Tool> {
        self.tools.get(&name).map(Box::as_ref)
    }

    pub fn specs(&self, names: &[ToolName]) -> Vec<ToolSpec> {
        names.iter().filter_map(|name| self.get(*name)).map(Tool::spec).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
