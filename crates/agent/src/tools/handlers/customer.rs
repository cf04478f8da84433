use storefront_core::catalog::money::format_money;
use storefront_core::domain::commerce::{clean_zip_code, NewAddress};
use storefront_core::domain::tenant::DeliveryCoverage;

use super::{HandlerError, HandlerResult, ToolContext};
use crate::tools::command::{AddressArgs, ProfileArgs};
use crate::tools::reply::ToolReply;

pub async fn update_profile(cx: &mut ToolContext<'_>, args: ProfileArgs) -> HandlerResult {
    let name = trimmed(args.name);
    let email = trimmed(args.email).map(|email| email.to_lowercase());
    if name.is_none() && email.is_none() {
        return Err(HandlerError::Validation(
            "Tell me the name or email you'd like to use.".to_string(),
        ));
    }
    if let Some(email) = email.as_deref() {
        if !looks_like_email(email) {
            return Err(HandlerError::Validation(format!(
                "\"{email}\" doesn't look like an email address. Could you check it?"
            )));
        }
    }

    let updated = cx.services().customers.update_profile(&cx.customer.id, name, email).await?;
    cx.customer = updated;

    let greeting = match cx.customer.name.as_deref() {
        Some(name) if cx.customer.has_name() => format!("Thanks, {name}!"),
        _ => "Thanks!".to_string(),
    };
    Ok(ToolReply::message(format!("{greeting} Your details are saved.")))
}

pub async fn list_addresses(cx: &mut ToolContext<'_>) -> HandlerResult {
    let addresses = cx.services().addresses.list(&cx.customer.id).await?;
    if addresses.is_empty() {
        return Ok(ToolReply::message(
            "You have no saved addresses yet. Send the street, number, neighborhood, city and \
             state to add one.",
        ));
    }

    let mut text = "Your addresses:\n\n".to_string();
    for (index, address) in addresses.iter().enumerate() {
        text.push_str(&format!("{}. {}", index + 1, address.display()));
        if address.is_default {
            text.push_str(" (default)");
        }
        text.push('\n');
    }
    Ok(ToolReply::Message(text.trim_end().to_string()))
}

pub async fn register_address(cx: &mut ToolContext<'_>, args: AddressArgs) -> HandlerResult {
    let address = NewAddress {
        street: args.street.trim().to_string(),
        number: args.number.trim().to_string(),
        neighborhood: args.neighborhood.trim().to_string(),
        city: args.city.trim().to_string(),
        state: args.state.trim().to_uppercase(),
        zip_code: clean_zip_code(&args.zip_code),
        complement: trimmed(args.complement),
    };

    let missing = address.missing_fields();
    if !missing.is_empty() {
        return Err(HandlerError::Validation(format!(
            "I still need the {} of the address.",
            missing.join(", ")
        )));
    }
    if !address.zip_code.is_empty() && address.zip_code.len() != 8 {
        return Err(HandlerError::Validation(
            "The zip code must have 8 digits.".to_string(),
        ));
    }

    let saved = cx.services().addresses.add(&cx.customer.id, address, true).await?;
    let profile = cx.tenant_profile().await?;
    let coverage = match profile.coverage(&saved.city, Some(&saved.neighborhood)) {
        DeliveryCoverage::Served { fee } => {
            format!("Good news: we deliver there. Delivery fee: {}.", format_money(fee))
        }
        DeliveryCoverage::NotServed => {
            format!("Note: we don't deliver to {} yet.", saved.city)
        }
        DeliveryCoverage::NotConfigured => String::new(),
    };

    let mut text = format!("Address saved as your default:\n{}", saved.display());
    if !coverage.is_empty() {
        text.push_str("\n\n");
        text.push_str(&coverage);
    }
    Ok(ToolReply::Message(text))
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !email.contains(char::is_whitespace)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}
