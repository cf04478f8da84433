//! Tool declarations sent to the language model.

use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema of the argument object.
    pub parameters: Value,
}

impl ToolDefinition {
    fn new(name: &'static str, description: &'static str, parameters: Value) -> Self {
        Self { name, description, parameters }
    }

    fn without_arguments(name: &'static str, description: &'static str) -> Self {
        Self::new(name, description, json!({"type": "object", "properties": {}}))
    }

    /// The `tools[]` entry of an OpenAI-compatible chat completion request.
    pub fn to_openai(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "search_products",
            "Search the catalog. Use an empty query or 'products' to list the whole catalog.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What the customer is looking for"},
                    "brand": {"type": "string"},
                    "tags": {"type": "string"},
                    "min_price": {"type": "number"},
                    "max_price": {"type": "number"},
                    "sort_by": {
                        "type": "string",
                        "enum": ["relevance", "price_asc", "price_desc", "name_asc", "name_desc"]
                    },
                    "limit": {"type": "integer", "minimum": 0}
                },
                "required": ["query"]
            }),
        ),
        ToolDefinition::new(
            "search_multiple_products",
            "Search several different products in one go, e.g. 'dipirona e soro'.",
            json!({
                "type": "object",
                "properties": {
                    "queries": {"type": "array", "items": {"type": "string"}, "minItems": 1}
                },
                "required": ["queries"]
            }),
        ),
        ToolDefinition::new(
            "product_details",
            "Show details of a listed product, by its item number or name.",
            json!({
                "type": "object",
                "properties": {"identifier": {"type": "string"}},
                "required": ["identifier"]
            }),
        ),
        ToolDefinition::new(
            "add_to_cart",
            "Add a product to the cart by its item number from the last list, or by name.",
            json!({
                "type": "object",
                "properties": {
                    "identifier": {"type": "string", "description": "Item number or product name"},
                    "quantity": {"type": "integer", "minimum": 1}
                },
                "required": ["identifier"]
            }),
        ),
        ToolDefinition::new(
            "add_product_by_name",
            "Add a product the customer named without picking it from a list.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "quantity": {"type": "integer", "minimum": 1}
                },
                "required": ["name"]
            }),
        ),
        ToolDefinition::new(
            "remove_from_cart",
            "Remove a cart line by its number in the cart view.",
            json!({
                "type": "object",
                "properties": {"item_number": {"type": "integer", "minimum": 1}},
                "required": ["item_number"]
            }),
        ),
        ToolDefinition::new(
            "update_cart_quantity",
            "Set the quantity of a cart line by its number in the cart view.",
            json!({
                "type": "object",
                "properties": {
                    "item_number": {"type": "integer", "minimum": 1},
                    "quantity": {"type": "integer", "minimum": 1}
                },
                "required": ["item_number", "quantity"]
            }),
        ),
        ToolDefinition::without_arguments("view_cart", "Show the cart with totals."),
        ToolDefinition::without_arguments("clear_cart", "Remove everything from the cart."),
        ToolDefinition::without_arguments(
            "checkout",
            "Start checkout: summarize the cart and check name and delivery address.",
        ),
        ToolDefinition::without_arguments(
            "confirm_order",
            "Place the order after the customer confirmed the checkout summary.",
        ),
        ToolDefinition::new(
            "cancel_order",
            "Cancel a pending order by order number or its number in the order history.",
            json!({
                "type": "object",
                "properties": {"identifier": {"type": "string"}},
                "required": ["identifier"]
            }),
        ),
        ToolDefinition::without_arguments("order_history", "List the customer's recent orders."),
        ToolDefinition::new(
            "update_profile",
            "Save the customer's name and/or email.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "email": {"type": "string"}
                }
            }),
        ),
        ToolDefinition::without_arguments("list_addresses", "List saved delivery addresses."),
        ToolDefinition::new(
            "register_address",
            "Save a delivery address; it becomes the default one.",
            json!({
                "type": "object",
                "properties": {
                    "street": {"type": "string"},
                    "number": {"type": "string"},
                    "neighborhood": {"type": "string"},
                    "city": {"type": "string"},
                    "state": {"type": "string"},
                    "zip_code": {"type": "string"},
                    "complement": {"type": "string"}
                },
                "required": ["street", "number", "neighborhood", "city", "state"]
            }),
        ),
        ToolDefinition::new(
            "check_delivery",
            "Check whether the store delivers to a city or neighborhood, and the fee.",
            json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "neighborhood": {"type": "string"}
                },
                "required": ["city"]
            }),
        ),
        ToolDefinition::without_arguments("store_location", "Give the store's address."),
        ToolDefinition::new(
            "request_human",
            "Hand the conversation to a human attendant.",
            json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}}
            }),
        ),
    ]
}
