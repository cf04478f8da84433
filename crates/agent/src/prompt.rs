//! System prompt and welcome message, rendered with tera from the tenant's profile.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tera::{Context, Tera};
use thiserror::Error;

use storefront_core::catalog::money::format_money;
use storefront_core::domain::commerce::Customer;
use storefront_core::domain::hours::StoreStatus;
use storefront_core::domain::tenant::TenantProfile;

use crate::tools::ToolDefinition;

const SYSTEM_TEMPLATE: &str = "system.txt";
const WELCOME_TEMPLATE: &str = "welcome.txt";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template error: {0}")]
    Template(String),
}

impl From<tera::Error> for PromptError {
    fn from(error: tera::Error) -> Self {
        Self::Template(error.to_string())
    }
}

#[derive(Serialize)]
struct PromptContext<'a> {
    store_name: &'a str,
    store_address: Option<&'a str>,
    delivery_zones: &'a [String],
    delivery_fee: Decimal,
    customer_name: Option<&'a str>,
    /// One line per weekday; empty when the store has no configured hours.
    weekly_hours: Vec<String>,
    open_now: bool,
    closes_at: Option<String>,
    reopens: Option<String>,
    tools: &'a [ToolDefinition],
}

impl<'a> PromptContext<'a> {
    fn new(
        profile: &'a TenantProfile,
        customer: Option<&'a Customer>,
        tools: &'a [ToolDefinition],
        now: DateTime<Utc>,
    ) -> Self {
        let status = profile.status_at(now);
        let (open_now, closes_at, reopens) = match status {
            None => (true, None, None),
            Some(StoreStatus::Open { closes_at }) => {
                (true, Some(closes_at.format("%H:%M").to_string()), None)
            }
            Some(StoreStatus::Closed { reopens }) => {
                (false, None, reopens.map(|reopening| reopening.describe()))
            }
        };
        Self {
            store_name: &profile.store_name,
            store_address: profile.store_address.as_deref(),
            delivery_zones: &profile.delivery_zones,
            delivery_fee: profile.delivery_fee,
            customer_name: customer
                .filter(|customer| customer.has_name())
                .and_then(|customer| customer.name.as_deref()),
            weekly_hours: profile
                .business_hours
                .as_ref()
                .map(|hours| hours.weekly_lines())
                .unwrap_or_default(),
            open_now,
            closes_at,
            reopens,
            tools,
        }
    }
}

pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    pub fn new() -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.register_filter("money", money_filter);
        tera.add_raw_template(
            SYSTEM_TEMPLATE,
            include_str!("../../../templates/prompts/system.txt.tera"),
        )?;
        tera.add_raw_template(
            WELCOME_TEMPLATE,
            include_str!("../../../templates/prompts/welcome.txt.tera"),
        )?;
        Ok(Self { tera })
    }

    pub fn system_prompt(
        &self,
        profile: &TenantProfile,
        customer: Option<&Customer>,
        tools: &[ToolDefinition],
        now: DateTime<Utc>,
    ) -> Result<String, PromptError> {
        self.render(SYSTEM_TEMPLATE, &PromptContext::new(profile, customer, tools, now))
    }

    /// The first reply to a bare greeting. Outside opening hours it says when the store reopens
    /// instead of inviting the customer to browse.
    pub fn welcome(
        &self,
        profile: &TenantProfile,
        customer: Option<&Customer>,
        now: DateTime<Utc>,
    ) -> Result<String, PromptError> {
        self.render(WELCOME_TEMPLATE, &PromptContext::new(profile, customer, &[], now))
    }

    fn render(&self, template: &str, context: &PromptContext<'_>) -> Result<String, PromptError> {
        let context = Context::from_serialize(context)?;
        Ok(self.tera.render(template, &context)?.trim().to_string())
    }
}

/// `amount | money` renders a decimal (number or decimal string) as `R$ 1.234,56`.
fn money_filter(
    value: &tera::Value,
    _args: &HashMap<String, tera::Value>,
) -> tera::Result<tera::Value> {
    let amount = match value {
        tera::Value::String(text) => text.parse::<Decimal>().ok(),
        tera::Value::Number(number) => number.to_string().parse::<Decimal>().ok(),
        tera::Value::Null => Some(Decimal::ZERO),
        _ => None,
    }
    .ok_or_else(|| tera::Error::msg("money filter expects a decimal amount"))?;
    Ok(tera::Value::String(format_money(amount)))
}
