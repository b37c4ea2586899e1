use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{ProductId, Size};
use crate::errors::DomainError;

/// Most pairs of one product and size a single cart line may hold.
pub const MAX_LINE_QUANTITY: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product_id: ProductId,
    pub size: Size,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl CartLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }

    fn matches(&self, product_id: &ProductId, size: Size) -> bool {
        &self.product_id == product_id && self.size == size
    }
}

/// Result of overwriting a line's quantity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartMutation {
    Updated(CartLineItem),
    Removed(CartLineItem),
    NotFound,
}

/// One user's cart. Lines are unique per (product, size) and always hold a
/// quantity of at least one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLineItem] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Quantity already held for a (product, size), zero when absent.
    pub fn quantity_of(&self, product_id: &ProductId, size: Size) -> u32 {
        self.lines
            .iter()
            .find(|line| line.matches(product_id, size))
            .map_or(0, |line| line.quantity)
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(CartLineItem::line_total).sum()
    }

    /// Merges into an existing (product, size) line or appends a new one and
    /// returns the resulting line.
    pub fn add(&mut self, line: CartLineItem) -> Result<CartLineItem, DomainError> {
        if line.quantity == 0 {
            return Err(DomainError::InvariantViolation(
                "cart line quantity must be at least 1".to_string(),
            ));
        }

        if let Some(existing) =
            self.lines.iter_mut().find(|existing| existing.matches(&line.product_id, line.size))
        {
            let merged = existing
                .quantity
                .checked_add(line.quantity)
                .filter(|merged| *merged <= MAX_LINE_QUANTITY)
                .ok_or_else(|| line_limit_exceeded(existing.quantity, line.quantity))?;
            existing.quantity = merged;
            return Ok(existing.clone());
        }
        if line.quantity > MAX_LINE_QUANTITY {
            return Err(line_limit_exceeded(0, line.quantity));
        }

        self.lines.push(line.clone());
        Ok(line)
    }

    /// Overwrites the quantity of a line; zero removes it.
    pub fn set_quantity(
        &mut self,
        product_id: &ProductId,
        size: Size,
        quantity: u32,
    ) -> Result<CartMutation, DomainError> {
        if quantity > MAX_LINE_QUANTITY {
            return Err(line_limit_exceeded(0, quantity));
        }
        let Some(index) = self.lines.iter().position(|line| line.matches(product_id, size)) else {
            return Ok(CartMutation::NotFound);
        };

        if quantity == 0 {
            return Ok(CartMutation::Removed(self.lines.remove(index)));
        }

        let line = &mut self.lines[index];
        line.quantity = quantity;
        Ok(CartMutation::Updated(line.clone()))
    }
}

fn line_limit_exceeded(held: u32, requested: u32) -> DomainError {
    DomainError::InvariantViolation(format!(
        "cart line would hold {held} + {requested} pairs, limit is {MAX_LINE_QUANTITY}"
    ))
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Cart, CartLineItem, CartMutation, MAX_LINE_QUANTITY};
    use crate::domain::product::{ProductId, Size};

    fn running(size: Size, quantity: u32) -> CartLineItem {
        CartLineItem {
            product_id: ProductId("running".to_string()),
            size,
            quantity,
            unit_price: Decimal::new(8999, 2),
        }
    }

    #[test]
    fn adding_same_product_and_size_merges_quantities() {
        let mut cart = Cart::new();
        cart.add(running(Size::Small, 1)).expect("first add");
        let merged = cart.add(running(Size::Small, 2)).expect("second add");

        assert_eq!(merged.quantity, 3);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total(), Decimal::new(26997, 2));
    }

    #[test]
    fn different_sizes_are_separate_lines() {
        let mut cart = Cart::new();
        cart.add(running(Size::Small, 1)).expect("small");
        cart.add(running(Size::Large, 1)).expect("large");

        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let mut cart = Cart::new();
        assert!(cart.add(running(Size::Small, 0)).is_err());
        assert!(cart.is_empty());
    }

    #[test]
    fn set_quantity_overwrites_then_removes() {
        let mut cart = Cart::new();
        let product = ProductId("running".to_string());
        cart.add(running(Size::Medium, 2)).expect("add");

        let updated = cart.set_quantity(&product, Size::Medium, 5).expect("update");
        assert!(matches!(updated, CartMutation::Updated(ref line) if line.quantity == 5));

        let removed = cart.set_quantity(&product, Size::Medium, 0).expect("remove");
        assert!(matches!(removed, CartMutation::Removed(_)));
        assert!(cart.is_empty());

        let missing = cart.set_quantity(&product, Size::Medium, 0).expect("missing");
        assert_eq!(missing, CartMutation::NotFound);
    }

    #[test]
    fn lines_never_exceed_the_per_line_limit() {
        let mut cart = Cart::new();
        let product = ProductId("running".to_string());
        cart.add(running(Size::Small, MAX_LINE_QUANTITY)).expect("fill line");

        assert!(cart.add(running(Size::Small, 1)).is_err());
        assert!(cart.add(running(Size::Large, MAX_LINE_QUANTITY + 1)).is_err());
        assert!(cart.set_quantity(&product, Size::Small, MAX_LINE_QUANTITY + 1).is_err());
        assert_eq!(cart.quantity_of(&product, Size::Small), MAX_LINE_QUANTITY);
        assert_eq!(cart.quantity_of(&product, Size::Large), 0);
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn item_count_sums_without_overflow() {
        let mut cart = Cart::new();
        for size in Size::ALL {
            cart.add(running(size, MAX_LINE_QUANTITY)).expect("add");
        }
        assert_eq!(cart.item_count(), 3 * u64::from(MAX_LINE_QUANTITY));
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(Cart::new().total(), Decimal::ZERO);
    }
}
