use rust_decimal::Decimal;
use tracing::info;

use storefront_core::catalog::money::format_money;
use storefront_core::domain::tenant::DeliveryCoverage;

use super::{HandlerError, HandlerResult, ToolContext};
use crate::alerts::{spawn_alert, Alert};
use crate::tools::command::{DeliveryArgs, HumanSupportArgs};
use crate::tools::reply::ToolReply;

pub async fn check_delivery(cx: &mut ToolContext<'_>, args: DeliveryArgs) -> HandlerResult {
    let city = args.city.trim();
    if city.is_empty() {
        return Err(HandlerError::Validation("Which city should I check?".to_string()));
    }
    let neighborhood =
        args.neighborhood.as_deref().map(str::trim).filter(|value| !value.is_empty());
    let place = match neighborhood {
        Some(neighborhood) => format!("{neighborhood}, {city}"),
        None => city.to_string(),
    };

    let profile = cx.tenant_profile().await?;
    let text = match profile.coverage(city, neighborhood) {
        DeliveryCoverage::Served { fee } if fee == Decimal::ZERO => {
            format!("Yes, we deliver to {place}, and delivery is free.")
        }
        DeliveryCoverage::Served { fee } => {
            format!("Yes, we deliver to {place}. Delivery fee: {}.", format_money(fee))
        }
        DeliveryCoverage::NotServed => format!("Sorry, we don't deliver to {place} yet."),
        DeliveryCoverage::NotConfigured => format!(
            "{} hasn't published its delivery area here. Ask for an attendant and they'll \
             confirm it for you.",
            profile.store_name
        ),
    };
    Ok(ToolReply::Message(text))
}

pub async fn store_location(cx: &mut ToolContext<'_>) -> HandlerResult {
    let profile = cx.tenant_profile().await?;
    let text = match profile.store_address.as_deref().map(str::trim) {
        Some(address) if !address.is_empty() => format!("{} is at {address}.", profile.store_name),
        _ => format!("{} hasn't shared its address here yet.", profile.store_name),
    };
    Ok(ToolReply::Message(text))
}

pub async fn request_human(cx: &mut ToolContext<'_>, args: HumanSupportArgs) -> HandlerResult {
    let reason =
        args.reason.map(|reason| reason.trim().to_string()).filter(|reason| !reason.is_empty());
    info!(
        event_name = "conversation.handoff.requested",
        tenant_id = %cx.tenant_id(),
        identity = %cx.key().masked_identity(),
        "customer asked for a human attendant"
    );
    spawn_alert(
        cx.alerts(),
        Alert::HumanRequested {
            tenant_id: cx.tenant_id().0.clone(),
            identity: cx.key().identity.clone(),
            reason,
        },
    );
    Ok(ToolReply::message(
        "I've asked someone from our team to take over. They'll reply here shortly.",
    ))
}

#[cfg(test)]
mod tests {
    use super::{check_delivery, request_human, store_location};
    use crate::tools::command::{DeliveryArgs, HumanSupportArgs};
    use crate::tools::handlers::fixture::Harness;
    use crate::tools::handlers::HandlerError;
    use crate::tools::reply::ToolReply;

    fn delivery(city: &str, neighborhood: Option<&str>) -> DeliveryArgs {
        DeliveryArgs { city: city.to_string(), neighborhood: neighborhood.map(str::to_string) }
    }

    #[tokio::test]
    async fn delivery_check_follows_tenant_zones() {
        let harness = Harness::demo().await;
        let mut cx = harness.context().await;

        let served =
            check_delivery(&mut cx, delivery("brasília", Some("Asa Sul"))).await.expect("served");
        assert_eq!(
            served,
            ToolReply::message("Yes, we deliver to Asa Sul, brasília. Delivery fee: R$ 7,00.")
        );

        let partial =
            check_delivery(&mut cx, delivery("Taguatinga", Some("Norte"))).await.expect("checked");
        assert_eq!(partial, ToolReply::message("Sorry, we don't deliver to Norte, Taguatinga yet."));

        let error = check_delivery(&mut cx, delivery(" ", None)).await.expect_err("no city");
        assert!(matches!(error, HandlerError::Validation(_)));
    }

    #[tokio::test]
    async fn location_uses_store_profile() {
        let harness = Harness::demo().await;
        let mut cx = harness.context().await;
        let reply = store_location(&mut cx).await.expect("location");
        assert_eq!(
            reply,
            ToolReply::message("Farmácia Demo is at Rua das Flores, 120 - Centro, Brasília/DF.")
        );
    }

    #[tokio::test]
    async fn handoff_is_acknowledged_immediately() {
        let harness = Harness::demo().await;
        let mut cx = harness.context().await;
        let reply = request_human(&mut cx, HumanSupportArgs { reason: Some("receita".to_string()) })
            .await
            .expect("handoff");
        assert!(reply.render().contains("take over"));
    }
}
