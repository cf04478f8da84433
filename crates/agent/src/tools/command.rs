//! Typed decoding of tool arguments.
//!
//! Each tool name maps to one [`ToolCommand`] variant. Decoding happens once, at the dispatcher
//! boundary; handlers only ever see typed fields.

use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("invalid arguments for `{tool}`: {message}")]
    InvalidArguments { tool: String, message: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct SearchArgs {
    #[serde(default, deserialize_with = "lenient_string")]
    pub query: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_integer")]
    pub limit: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MultiSearchArgs {
    pub queries: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ProductRefArgs {
    #[serde(deserialize_with = "lenient_string")]
    pub identifier: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AddToCartArgs {
    #[serde(deserialize_with = "lenient_string")]
    pub identifier: String,
    #[serde(default = "one", deserialize_with = "lenient_integer")]
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AddByNameArgs {
    pub name: String,
    #[serde(default = "one", deserialize_with = "lenient_integer")]
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CartLineArgs {
    #[serde(deserialize_with = "lenient_integer")]
    pub item_number: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CartQuantityArgs {
    #[serde(deserialize_with = "lenient_integer")]
    pub item_number: i64,
    #[serde(deserialize_with = "lenient_integer")]
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct OrderRefArgs {
    #[serde(deserialize_with = "lenient_string")]
    pub identifier: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ProfileArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct AddressArgs {
    #[serde(default)]
    pub street: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub number: String,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub zip_code: String,
    #[serde(default)]
    pub complement: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeliveryArgs {
    pub city: String,
    #[serde(default)]
    pub neighborhood: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct HumanSupportArgs {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolCommand {
    SearchProducts(SearchArgs),
    SearchMultipleProducts(MultiSearchArgs),
    ProductDetails(ProductRefArgs),
    AddToCart(AddToCartArgs),
    AddProductByName(AddByNameArgs),
    RemoveFromCart(CartLineArgs),
    UpdateCartQuantity(CartQuantityArgs),
    ViewCart,
    ClearCart,
    Checkout,
    ConfirmOrder,
    CancelOrder(OrderRefArgs),
    OrderHistory,
    UpdateProfile(ProfileArgs),
    ListAddresses,
    RegisterAddress(AddressArgs),
    CheckDelivery(DeliveryArgs),
    StoreLocation,
    RequestHuman(HumanSupportArgs),
}

impl ToolCommand {
    pub const NAMES: &'static [&'static str] = &[
        "search_products",
        "search_multiple_products",
        "product_details",
        "add_to_cart",
        "add_product_by_name",
        "remove_from_cart",
        "update_cart_quantity",
        "view_cart",
        "clear_cart",
        "checkout",
        "confirm_order",
        "cancel_order",
        "order_history",
        "update_profile",
        "list_addresses",
        "register_address",
        "check_delivery",
        "store_location",
        "request_human",
    ];

    pub fn decode(name: &str, arguments: &Value) -> Result<Self, DecodeError> {
        let command = match name {
            "search_products" => Self::SearchProducts(parse(name, arguments)?),
            "search_multiple_products" => Self::SearchMultipleProducts(parse(name, arguments)?),
            "product_details" => Self::ProductDetails(parse(name, arguments)?),
            "add_to_cart" => Self::AddToCart(parse(name, arguments)?),
            "add_product_by_name" => Self::AddProductByName(parse(name, arguments)?),
            "remove_from_cart" => Self::RemoveFromCart(parse(name, arguments)?),
            "update_cart_quantity" => Self::UpdateCartQuantity(parse(name, arguments)?),
            "view_cart" => Self::ViewCart,
            "clear_cart" => Self::ClearCart,
            "checkout" => Self::Checkout,
            "confirm_order" => Self::ConfirmOrder,
            "cancel_order" => Self::CancelOrder(parse(name, arguments)?),
            "order_history" => Self::OrderHistory,
            "update_profile" => Self::UpdateProfile(parse(name, arguments)?),
            "list_addresses" => Self::ListAddresses,
            "register_address" => Self::RegisterAddress(parse(name, arguments)?),
            "check_delivery" => Self::CheckDelivery(parse(name, arguments)?),
            "store_location" => Self::StoreLocation,
            "request_human" => Self::RequestHuman(parse(name, arguments)?),
            other => return Err(DecodeError::UnknownTool(other.to_string())),
        };
        Ok(command)
    }

    /// Commands that change the contents of the cart.
    pub fn is_cart_mutation(name: &str) -> bool {
        matches!(
            name,
            "add_to_cart"
                | "add_product_by_name"
                | "remove_from_cart"
                | "update_cart_quantity"
                | "clear_cart"
        )
    }
}

fn parse<T: DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T, DecodeError> {
    let arguments = match arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(arguments).map_err(|error| DecodeError::InvalidArguments {
        tool: tool.to_string(),
        message: error.to_string(),
    })
}

fn one() -> i64 {
    1
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Integer(i64),
    Float(f64),
    Text(String),
}

fn scalar_to_integer<E: de::Error>(value: Scalar) -> Result<i64, E> {
    match value {
        Scalar::Integer(number) => Ok(number),
        Scalar::Float(number) if number.fract() == 0.0 => Ok(number as i64),
        Scalar::Float(number) => Err(E::custom(format!("expected a whole number, got {number}"))),
        Scalar::Text(text) => text
            .trim()
            .parse::<i64>()
            .map_err(|_| E::custom(format!("expected a number, got `{text}`"))),
    }
}

fn lenient_integer<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    scalar_to_integer(Scalar::deserialize(deserializer)?)
}

fn lenient_optional_integer<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<i64>, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(value) => scalar_to_integer(value).map(Some),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => String::new(),
        Some(Scalar::Integer(number)) => number.to_string(),
        Some(Scalar::Float(number)) => number.to_string(),
        Some(Scalar::Text(text)) => text,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DecodeError, ToolCommand};

    #[test]
    fn quantity_accepts_numbers_and_numeric_strings() {
        let from_number =
            ToolCommand::decode("add_to_cart", &json!({"identifier": 3, "quantity": 2}))
                .expect("number");
        let from_string =
            ToolCommand::decode("add_to_cart", &json!({"identifier": "3", "quantity": " 2 "}))
                .expect("string");
        assert_eq!(from_number, from_string);

        match from_number {
            ToolCommand::AddToCart(args) => {
                assert_eq!(args.identifier, "3");
                assert_eq!(args.quantity, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn quantity_defaults_to_one() {
        let command = ToolCommand::decode("add_product_by_name", &json!({"name": "soro"}))
            .expect("decode");
        assert_eq!(
            command,
            ToolCommand::AddProductByName(super::AddByNameArgs {
                name: "soro".to_string(),
                quantity: 1
            })
        );
    }

    #[test]
    fn non_numeric_quantity_is_invalid_arguments() {
        let error = ToolCommand::decode("add_to_cart", &json!({"identifier": "3", "quantity": "two"}))
            .expect_err("invalid");
        assert!(matches!(error, DecodeError::InvalidArguments { ref tool, .. } if tool == "add_to_cart"));
    }

    #[test]
    fn missing_required_field_is_invalid_arguments() {
        let error = ToolCommand::decode("update_cart_quantity", &json!({"item_number": 1}))
            .expect_err("missing quantity");
        assert!(matches!(error, DecodeError::InvalidArguments { .. }));
    }

    #[test]
    fn unknown_tool_is_reported_by_name() {
        let error = ToolCommand::decode("teleport", &json!({})).expect_err("unknown");
        assert_eq!(error, DecodeError::UnknownTool("teleport".to_string()));
    }

    #[test]
    fn argumentless_tools_accept_null_arguments() {
        assert_eq!(ToolCommand::decode("view_cart", &serde_json::Value::Null), Ok(ToolCommand::ViewCart));
        let search =
            ToolCommand::decode("search_products", &serde_json::Value::Null).expect("search");
        assert!(matches!(search, ToolCommand::SearchProducts(ref args) if args.query.is_empty()));
    }

    #[test]
    fn search_limit_and_prices_decode_from_strings() {
        let command = ToolCommand::decode(
            "search_products",
            &json!({"query": "dipirona", "limit": "5", "max_price": "20.5", "sort_by": "price_asc"}),
        )
        .expect("decode");
        match command {
            ToolCommand::SearchProducts(args) => {
                assert_eq!(args.limit, Some(5));
                assert_eq!(args.max_price, Some(rust_decimal::Decimal::new(205, 1)));
                assert_eq!(args.sort_by.as_deref(), Some("price_asc"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn every_listed_name_decodes() {
        for name in ToolCommand::NAMES {
            let result = ToolCommand::decode(name, &json!({}));
            assert!(
                !matches!(result, Err(DecodeError::UnknownTool(_))),
                "{name} should be a known tool"
            );
        }
    }
}
