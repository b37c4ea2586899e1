//! Role permissions and legal transitions. The router only enumerates what a
//! role may do; choosing among those options is left to the model.

use serde_json::json;

use freddie_core::config::RoutingMode;
use freddie_core::domain::conversation::Role;

use crate::llm::ToolSpec;
use crate::tools::{ToolName, ToolRegistry};

const TRANSFER_PREFIX: &str = "transfer_to_";

/// Static description of one role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoleProfile {
    pub role: Role,
    pub display_name: &'static str,
    /// Shown to the model when it decides whether to hand over or consult.
    pub handoff_description: &'static str,
    pub instructions: &'static str,
    pub tools: &'static [ToolName],
    pub next_roles: &'static [Role],
}

const SPECIALISTS: &[Role] = &[
    Role::OrderSpecialist,
    Role::ProductSpecialist,
    Role::CartSpecialist,
    Role::CheckoutSpecialist,
];

pub fn role_profile(role: Role) -> RoleProfile {
    match role {
        Role::General => RoleProfile {
            role,
            display_name: "Freddie",
            handoff_description: "Front desk assistant for the store.",
            instructions: "You are Freddie, the assistant for the EOcean Shoe Store. \
You help customers check order status, learn about our products, add products to \
their cart, review the cart and its total, and check out with a receipt. After a \
checkout, tell the customer the order ID and the total.\n\
Use a friendly, helpful tone. If a request is unclear or asks for something we do \
not carry, politely explain what we do offer. Never invent store policy, prices, \
stock or delivery dates; only report what your specialists return.\n\
The customer may be talking to you by voice, so keep replies short, conversational \
and easy to read aloud.",
            tools: &[],
            next_roles: SPECIALISTS,
        },
        Role::OrderSpecialist => RoleProfile {
            role,
            display_name: "Order Specialist",
            handoff_description: "Tracks orders by their order ID.",
            instructions: "You check order status with lookup_order. If the customer has \
not given an order ID, ask for it. Report the status and items exactly as returned.",
            tools: &[ToolName::LookupOrder],
            next_roles: &[Role::General],
        },
        Role::ProductSpecialist => RoleProfile {
            role,
            display_name: "Product Specialist",
            handoff_description: "Answers questions about the products we sell.",
            instructions: "You answer product questions with get_product_info. Call it \
with the product the customer asked about, or with no query to list everything we \
sell. Quote prices and sizes exactly as returned.",
            tools: &[ToolName::GetProductInfo],
            next_roles: &[Role::General],
        },
        Role::CartSpecialist => RoleProfile {
            role,
            display_name: "Cart Specialist",
            handoff_description: "Adds and changes cart items, shows the cart and its total.",
            instructions: "You manage the customer's cart. Use add_to_cart to add items, \
modify_cart_item to change a quantity (a quantity of 0 removes the item), view_cart \
to show the cart and get_cart_total for the total price. If the size or quantity is \
missing, ask the customer before calling a tool.",
            tools: &[
                ToolName::AddToCart,
                ToolName::ModifyCartItem,
                ToolName::ViewCart,
                ToolName::GetCartTotal,
            ],
            next_roles: &[Role::General, Role::CheckoutSpecialist],
        },
        Role::CheckoutSpecialist => RoleProfile {
            role,
            display_name: "Checkout Specialist",
            handoff_description: "Checks out the cart and sends the receipt.",
            instructions: "You handle checkout. Use view_cart to confirm what is being \
bought, then generate_receipt to place the order. Tell the customer the order ID, \
the total and where the receipt was sent. If sending failed, say the order is still \
placed.",
            tools: &[ToolName::GenerateReceipt, ToolName::ViewCart],
            next_roles: &[Role::General, Role::CartSpecialist],
        },
    }
}

/// How the runtime should treat one tool call from a role.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    Shop(ToolName),
    /// Run the specialist as a nested sub-operation (composition mode).
    Consult(Role),
    /// Hand control of the conversation to another role (handoff mode).
    Transfer(Role),
    Deny { reason_code: &'static str, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RolePolicy {
    mode: RoutingMode,
}

impl RolePolicy {
    pub fn new(mode: RoutingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RoutingMode {
        self.mode
    }

    /// Role that handles the next turn given the role persisted by the last one.
    pub fn entry_role(&self, persisted: Role) -> Role {
        match self.mode {
            RoutingMode::Composition => Role::General,
            RoutingMode::Handoff => persisted,
        }
    }

    pub fn can_transition(&self, from: Role, to: Role) -> bool {
        from != to && role_profile(from).next_roles.contains(&to)
    }

    pub fn system_prompt(&self, role: Role) -> String {
        let profile = role_profile(role);
        match (self.mode, role) {
            (RoutingMode::Composition, Role::General) => format!(
                "{}\n\nConsult a specialist for anything that needs store data. Pass the \
customer's request along with every detail they gave.",
                profile.instructions
            ),
            (RoutingMode::Handoff, _) => {
                let targets: Vec<String> = profile
                    .next_roles
                    .iter()
                    .map(|next| {
                        format!("- {}: {}", transfer_tool_name(*next), role_profile(*next).handoff_description)
                    })
                    .collect();
                format!(
                    "{}\n\nIf the request belongs to another role, transfer the conversation \
instead of answering it yourself:\n{}",
                    profile.instructions,
                    targets.join("\n")
                )
            }
            (RoutingMode::Composition, _) => profile.instructions.to_string(),
        }
    }

    /// Tools offered to the model while `role` is active. A nested specialist
    /// in composition mode only gets its shop tools.
    pub fn tool_specs(&self, role: Role, registry: &ToolRegistry) -> Vec<ToolSpec> {
        let profile = role_profile(role);
        let mut specs = registry.specs(profile.tools);

        match (self.mode, role) {
            (RoutingMode::Composition, Role::General) => {
                specs.extend(profile.next_roles.iter().map(|next| consult_spec(*next)));
            }
            (RoutingMode::Handoff, _) => {
                specs.extend(profile.next_roles.iter().map(|next| transfer_spec(*next)));
            }
            (RoutingMode::Composition, _) => {}
        }
        specs
    }

    pub fn authorize(&self, role: Role, call_name: &str) -> Authorization {
        let profile = role_profile(role);

        if let Some(tool) = ToolName::parse(call_name) {
            if profile.tools.contains(&tool) {
                return Authorization::Shop(tool);
            }
            return Authorization::Deny {
                reason_code: "tool_not_permitted",
                message: format!("{} cannot use {tool}.", profile.display_name),
            };
        }

        match self.mode {
            RoutingMode::Composition => {
                if let Some(target) = Role::parse(call_name).filter(|target| *target != Role::General) {
                    if role == Role::General {
                        return Authorization::Consult(target);
                    }
                    return Authorization::Deny {
                        reason_code: "consult_not_permitted",
                        message: format!("{} cannot consult other specialists.", profile.display_name),
                    };
                }
            }
            RoutingMode::Handoff => {
                if let Some(target) = call_name.strip_prefix(TRANSFER_PREFIX).and_then(Role::parse) {
                    if self.can_transition(role, target) {
                        return Authorization::Transfer(target);
                    }
                    return Authorization::Deny {
                        reason_code: "handoff_not_permitted",
                        message: format!(
                            "{} cannot transfer to {}.",
                            profile.display_name,
                            role_profile(target).display_name
                        ),
                    };
                }
            }
        }

        Authorization::Deny {
            reason_code: "unknown_tool",
            message: format!("There is no tool named `{call_name}`."),
        }
    }
}

pub fn transfer_tool_name(role: Role) -> String {
    format!("{TRANSFER_PREFIX}{}", role.as_str())
}

fn consult_spec(role: Role) -> ToolSpec {
    let profile = role_profile(role);
    ToolSpec {
        name: role.as_str().to_string(),
        description: profile.handoff_description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "request": {"type": "string", "description": "What the customer needs, with every detail they gave."}
            },
            "required": ["request"]
        }),
    }
}

fn transfer_spec(role: Role) -> ToolSpec {
    let profile = role_profile(role);
    ToolSpec {
        name: transfer_tool_name(role),
        description: format!("Hand the conversation to {}. {}", profile.display_name, profile.handoff_description),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}
