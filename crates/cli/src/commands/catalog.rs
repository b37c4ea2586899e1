use freddie_core::catalog::Catalog;
use freddie_core::config::{AppConfig, LoadOptions};
use freddie_core::pricing::format_money;

use super::CommandResult;

pub fn run(json_output: bool) -> CommandResult {
    let currency = AppConfig::load(LoadOptions::default())
        .map(|config| config.store.currency)
        .unwrap_or_else(|_| AppConfig::default().store.currency);
    let catalog = Catalog::shoe_store(&currency);

    if json_output {
        return match serde_json::to_string_pretty(catalog.products()) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("catalog", "serialization", error.to_string(), 1),
        };
    }

    CommandResult { exit_code: 0, output: render(&catalog) }
}

pub fn render(catalog: &Catalog) -> String {
    let mut lines = vec![format!("{} product(s):", catalog.products().len())];
    for product in catalog.products() {
        let sizes: Vec<&str> = product.sizes.iter().map(|size| size.as_str()).collect();
        lines.push(format!(
            "- {} ({}) {} [{}]: {}",
            product.id.display_name(),
            product.id,
            format_money(product.unit_price, &product.currency),
            sizes.join(", "),
            product.description
        ));
    }
    lines.join("\n")
}
