use rust_decimal::Decimal;

use storefront_core::domain::commerce::{NewAddress, OrderStatus};
use storefront_core::domain::product::ProductId;
use storefront_core::errors::DomainError;
use storefront_db::repositories::{
    AddressRepository, CartRepository, CatalogRepository, CustomerRepository, OrderRepository,
    RepositoryError, SqlAddressRepository, SqlCartRepository, SqlCatalogRepository,
    SqlCustomerRepository, SqlOrderRepository,
};
use storefront_db::{connect_with_settings, migrations, DbPool, DemoSeedDataset};

type FlowResult<T = ()> = Result<T, String>;

fn ensure(condition: bool, message: impl Into<String>) -> FlowResult {
    if condition {
        Ok(())
    } else {
        Err(message.into())
    }
}

async fn seeded_pool() -> FlowResult<DbPool> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|error| format!("connect: {error}"))?;
    migrations::run_pending(&pool).await.map_err(|error| format!("migrations: {error}"))?;
    DemoSeedDataset::load(&pool).await.map_err(|error| format!("seed: {error}"))?;
    Ok(pool)
}

fn delivery_address() -> NewAddress {
    NewAddress {
        street: "Quadra 204 Sul".to_string(),
        number: "12".to_string(),
        neighborhood: "Asa Sul".to_string(),
        city: "Brasília".to_string(),
        state: "DF".to_string(),
        zip_code: "70234000".to_string(),
        complement: Some("bloco B".to_string()),
    }
}

#[tokio::test]
async fn cart_to_order_flow_moves_stock_and_empties_cart() -> FlowResult {
    let pool = seeded_pool().await?;
    let tenant = DemoSeedDataset::tenant_id();
    let customers = SqlCustomerRepository::new(pool.clone());
    let carts = SqlCartRepository::new(pool.clone());
    let addresses = SqlAddressRepository::new(pool.clone());
    let orders = SqlOrderRepository::new(pool.clone());
    let catalog = SqlCatalogRepository::new(pool.clone());

    let customer = customers
        .get_or_create(&tenant, "5561988887777")
        .await
        .map_err(|error| format!("customer: {error}"))?;
    let again = customers
        .get_or_create(&tenant, "5561988887777")
        .await
        .map_err(|error| format!("customer again: {error}"))?;
    ensure(customer.id == again.id, "identity should map to one customer")?;

    let dipirona = catalog
        .find_by_id(&tenant, &ProductId("demo-dipirona-500".to_string()))
        .await
        .map_err(|error| format!("find dipirona: {error}"))?
        .ok_or("dipirona should be seeded")?;
    let soro = catalog
        .find_by_id(&tenant, &ProductId("demo-soro-500".to_string()))
        .await
        .map_err(|error| format!("find soro: {error}"))?
        .ok_or("soro should be seeded")?;

    carts.add_item(&customer.id, &dipirona, 1).await.map_err(|error| error.to_string())?;
    carts.add_item(&customer.id, &soro, 2).await.map_err(|error| error.to_string())?;
    let merged =
        carts.add_item(&customer.id, &dipirona, 1).await.map_err(|error| error.to_string())?;
    ensure(merged.quantity == 2, format!("merged quantity was {}", merged.quantity))?;
    ensure(merged.unit_price == Decimal::new(990, 2), "cart line uses the sale price")?;

    let lines = carts.items(&customer.id).await.map_err(|error| error.to_string())?;
    ensure(lines.len() == 2, format!("expected two lines, got {}", lines.len()))?;
    ensure(lines[0].product_id == dipirona.id, "lines keep insertion order")?;

    let address = addresses
        .add(&customer.id, delivery_address(), false)
        .await
        .map_err(|error| format!("address: {error}"))?;
    ensure(address.is_default, "first address becomes the default")?;

    let fee = Decimal::new(700, 2);
    let order = orders
        .create_from_cart(&tenant, &customer.id, &address, fee)
        .await
        .map_err(|error| format!("order: {error}"))?;
    ensure(order.number.starts_with("ORD-"), format!("order number {}", order.number))?;
    ensure(order.total == Decimal::new(4060, 2), format!("order total {}", order.total))?;
    ensure(order.items.len() == 2, "order keeps both lines")?;

    let remaining = carts.items(&customer.id).await.map_err(|error| error.to_string())?;
    ensure(remaining.is_empty(), "cart is emptied by the order")?;

    let restocked = catalog
        .find_by_id(&tenant, &dipirona.id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or("dipirona still present")?;
    ensure(restocked.stock_quantity == dipirona.stock_quantity - 2, "stock is decremented")?;

    let found = orders
        .find_by_number(&tenant, &order.number.to_lowercase())
        .await
        .map_err(|error| error.to_string())?
        .ok_or("order found by number")?;
    ensure(found.id == order.id, "lookup by number is case-insensitive")?;
    ensure(found.delivery_address == address, "delivery address is stored with the order")?;

    let history =
        orders.list_for_customer(&customer.id, 10).await.map_err(|error| error.to_string())?;
    ensure(history.len() == 1, "one order in history")?;
    ensure(history[0].total == order.total, "history shows the total the customer confirmed")?;
    ensure(history[0].delivery_fee == fee, "delivery fee is stored with the order")?;

    let empty = orders.create_from_cart(&tenant, &customer.id, &address, fee).await;
    ensure(
        matches!(empty, Err(RepositoryError::Domain(DomainError::EmptyCart))),
        "empty cart is refused",
    )?;

    let cancelled = orders.cancel(&order.id).await.map_err(|error| error.to_string())?;
    ensure(cancelled.status == OrderStatus::Cancelled, "pending order is cancelled")?;
    let twice = orders.cancel(&order.id).await;
    ensure(
        matches!(twice, Err(RepositoryError::Domain(DomainError::NotCancellable { .. }))),
        "cancelled order stays cancelled",
    )
}

#[tokio::test]
async fn stock_taken_by_an_earlier_order_fails_the_later_one_whole() -> FlowResult {
    let pool = seeded_pool().await?;
    let tenant = DemoSeedDataset::tenant_id();
    let customers = SqlCustomerRepository::new(pool.clone());
    let carts = SqlCartRepository::new(pool.clone());
    let addresses = SqlAddressRepository::new(pool.clone());
    let orders = SqlOrderRepository::new(pool.clone());
    let catalog = SqlCatalogRepository::new(pool.clone());

    let soro = catalog
        .find_by_id(&tenant, &ProductId("demo-soro-500".to_string()))
        .await
        .map_err(|error| error.to_string())?
        .ok_or("soro should be seeded")?;
    let dipirona = catalog
        .find_by_id(&tenant, &ProductId("demo-dipirona-500".to_string()))
        .await
        .map_err(|error| error.to_string())?
        .ok_or("dipirona should be seeded")?;
    let stock = soro.stock_quantity;

    // Both customers fill their carts while every unit is still available.
    let first = customers.get_or_create(&tenant, "5561900000001").await.map_err(|e| e.to_string())?;
    let second = customers.get_or_create(&tenant, "5561900000002").await.map_err(|e| e.to_string())?;
    carts.add_item(&first.id, &soro, stock).await.map_err(|e| e.to_string())?;
    carts.add_item(&second.id, &dipirona, 1).await.map_err(|e| e.to_string())?;
    carts.add_item(&second.id, &soro, stock).await.map_err(|e| e.to_string())?;
    let first_address =
        addresses.add(&first.id, delivery_address(), true).await.map_err(|e| e.to_string())?;
    let second_address =
        addresses.add(&second.id, delivery_address(), true).await.map_err(|e| e.to_string())?;

    orders
        .create_from_cart(&tenant, &first.id, &first_address, Decimal::ZERO)
        .await
        .map_err(|error| format!("first order: {error}"))?;
    let late = orders.create_from_cart(&tenant, &second.id, &second_address, Decimal::ZERO).await;
    ensure(
        matches!(
            late,
            Err(RepositoryError::Domain(DomainError::InsufficientStock { available: 0, .. }))
        ),
        format!("second order should run out of stock, got {late:?}"),
    )?;

    let sold_out = catalog
        .find_by_id(&tenant, &soro.id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or("soro still present")?;
    ensure(sold_out.stock_quantity == 0, format!("soro stock {}", sold_out.stock_quantity))?;
    let untouched = catalog
        .find_by_id(&tenant, &dipirona.id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or("dipirona still present")?;
    ensure(
        untouched.stock_quantity == dipirona.stock_quantity,
        "the failed order rolls back every line",
    )?;
    let kept = carts.items(&second.id).await.map_err(|error| error.to_string())?;
    ensure(kept.len() == 2, "the failed order keeps the cart")?;
    let none = orders.list_for_customer(&second.id, 10).await.map_err(|error| error.to_string())?;
    ensure(none.is_empty(), "no order row survives the rollback")
}

#[tokio::test]
async fn cart_line_edits_and_default_address_switch() -> FlowResult {
    let pool = seeded_pool().await?;
    let tenant = DemoSeedDataset::tenant_id();
    let customers = SqlCustomerRepository::new(pool.clone());
    let carts = SqlCartRepository::new(pool.clone());
    let addresses = SqlAddressRepository::new(pool.clone());
    let catalog = SqlCatalogRepository::new(pool.clone());

    let customer = customers
        .get_or_create(&tenant, "5561911112222")
        .await
        .map_err(|error| error.to_string())?;
    let xarope = catalog
        .find_by_id(&tenant, &ProductId("demo-xarope-tosse".to_string()))
        .await
        .map_err(|error| error.to_string())?
        .ok_or("xarope should be seeded")?;

    let line = carts.add_item(&customer.id, &xarope, 1).await.map_err(|error| error.to_string())?;
    let updated = carts
        .update_quantity(&customer.id, &line.id, 4)
        .await
        .map_err(|error| error.to_string())?;
    ensure(updated.quantity == 4, "quantity replaced")?;

    let missing = carts.remove_item(&customer.id, "no-such-line").await;
    ensure(matches!(missing, Err(RepositoryError::NotFound(_))), "unknown line is not found")?;
    carts.remove_item(&customer.id, &line.id).await.map_err(|error| error.to_string())?;
    ensure(
        carts.items(&customer.id).await.map_err(|error| error.to_string())?.is_empty(),
        "line removed",
    )?;

    let home = addresses
        .add(&customer.id, delivery_address(), false)
        .await
        .map_err(|error| error.to_string())?;
    let work = addresses
        .add(
            &customer.id,
            NewAddress { street: "SCS Quadra 2".to_string(), ..delivery_address() },
            true,
        )
        .await
        .map_err(|error| error.to_string())?;

    let listed = addresses.list(&customer.id).await.map_err(|error| error.to_string())?;
    ensure(listed[0].id == work.id, "newest default listed first")?;
    ensure(listed.iter().filter(|address| address.is_default).count() == 1, "single default")?;

    addresses.set_default(&customer.id, &home.id).await.map_err(|error| error.to_string())?;
    let listed = addresses.list(&customer.id).await.map_err(|error| error.to_string())?;
    ensure(listed[0].id == home.id && listed[0].is_default, "home is default again")?;
    ensure(listed.iter().filter(|address| address.is_default).count() == 1, "single default")
}
