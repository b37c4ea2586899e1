use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    /// Canonical form of a product key: lower-case, trimmed, with a trailing
    /// "shoes"/"shoe" word dropped so "Running Shoes" and "running" agree.
    pub fn normalize(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        let stem = lowered
            .strip_suffix("shoes")
            .or_else(|| lowered.strip_suffix("shoe"))
            .map(str::trim_end)
            .filter(|stem| !stem.is_empty())
            .unwrap_or(&lowered);
        Self(stem.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human label, e.g. `running` -> `Running Shoes`.
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => format!("{}{} Shoes", first.to_ascii_uppercase(), chars.as_str()),
            None => String::new(),
        }
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Size {
    Small,
    Medium,
    Large,
}

impl Size {
    pub const ALL: [Size; 3] = [Size::Small, Size::Medium, Size::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "small" | "s" => Some(Self::Small),
            "medium" | "m" => Some(Self::Medium),
            "large" | "l" => Some(Self::Large),
            _ => None,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub description: String,
    pub sizes: Vec<Size>,
    pub unit_price: Decimal,
    pub currency: String,
}

impl Product {
    pub fn offers(&self, size: Size) -> bool {
        self.sizes.contains(&size)
    }
}

#[cfg(test)]
mod tests {
    use super::{ProductId, Size};

    #[test]
    fn normalizes_display_names_and_keys_to_one_identifier() {
        assert_eq!(ProductId::normalize("Running Shoes"), ProductId("running".to_string()));
        assert_eq!(ProductId::normalize("  WALKING "), ProductId("walking".to_string()));
        assert_eq!(ProductId::normalize("walking shoe"), ProductId("walking".to_string()));
        assert_eq!(ProductId::normalize("shoes"), ProductId("shoes".to_string()));
    }

    #[test]
    fn display_name_restores_title_case_label() {
        assert_eq!(ProductId("running".to_string()).display_name(), "Running Shoes");
    }

    #[test]
    fn size_parsing_is_case_insensitive() {
        assert_eq!(Size::parse("SMALL"), Some(Size::Small));
        assert_eq!(Size::parse(" Medium "), Some(Size::Medium));
        assert_eq!(Size::parse("xl"), None);
        assert_eq!(Size::Large.to_string(), "Large");
    }
}
