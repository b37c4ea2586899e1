use rust_decimal::Decimal;

use crate::domain::product::{Product, ProductId, Size};

/// Read-only product reference data.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// The two shoe lines the store sells.
    pub fn shoe_store(currency: &str) -> Self {
        Self::new(vec![
            Product {
                id: ProductId("running".to_string()),
                description: "Lightweight and breathable shoes for runners.".to_string(),
                sizes: Size::ALL.to_vec(),
                unit_price: Decimal::new(8999, 2),
                currency: currency.to_string(),
            },
            Product {
                id: ProductId("walking".to_string()),
                description: "Cushioned and flexible shoes for daily comfort.".to_string(),
                sizes: Size::ALL.to_vec(),
                unit_price: Decimal::new(6999, 2),
                currency: currency.to_string(),
            },
        ])
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn find(&self, product_id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|product| &product.id == product_id)
    }

    /// Looks a free-form product reference up by its normalized key.
    pub fn resolve(&self, raw: &str) -> Option<&Product> {
        self.find(&ProductId::normalize(raw))
    }

    /// First product whose key occurs in the query, ignoring case.
    pub fn search(&self, query: &str) -> Option<&Product> {
        let query = query.trim().to_ascii_lowercase();
        if query.is_empty() {
            return None;
        }
        self.products.iter().find(|product| query.contains(product.id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::Catalog;
    use crate::domain::product::ProductId;

    #[test]
    fn resolves_product_references_in_any_case() {
        let catalog = Catalog::shoe_store("USD");
        let product = catalog.resolve("Running Shoes").expect("running shoes");
        assert_eq!(product.id, ProductId("running".to_string()));
        assert_eq!(product.unit_price, Decimal::new(8999, 2));
        assert!(catalog.resolve("sandals").is_none());
    }

    #[test]
    fn search_matches_keys_inside_a_query() {
        let catalog = Catalog::shoe_store("USD");
        let found = catalog.search("tell me about WALKING shoes").expect("walking");
        assert_eq!(found.id.as_str(), "walking");
        assert!(catalog.search("").is_none());
        assert!(catalog.search("None").is_none());
    }
}
