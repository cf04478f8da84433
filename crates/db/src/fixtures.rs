use rust_decimal::Decimal;

use storefront_core::domain::product::{CatalogProduct, ProductId};
use storefront_core::domain::tenant::{TenantId, TenantProfile};

use crate::connection::DbPool;
use crate::repositories::{
    CatalogRepository, RepositoryError, SqlCatalogRepository, SqlTenantRepository,
    TenantRepository,
};

pub const DEMO_TENANT_ID: &str = "farmacia-demo";

struct SeedProduct {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    brand: &'static str,
    tags: &'static str,
    sku: &'static str,
    category: &'static str,
    price_cents: i64,
    sale_price_cents: Option<i64>,
    stock: u32,
}

const SEED_PRODUCTS: &[SeedProduct] = &[
    SeedProduct {
        id: "demo-dipirona-500",
        name: "Dipirona 500mg 10 comprimidos",
        description: "Analgésico e antitérmico.",
        brand: "Medley",
        tags: "analgesico,febre,dor",
        sku: "DIP-500-10",
        category: "Analgésicos",
        price_cents: 1290,
        sale_price_cents: Some(990),
        stock: 40,
    },
    SeedProduct {
        id: "demo-paracetamol-750",
        name: "Paracetamol 750mg 20 comprimidos",
        description: "Alívio de dores leves e febre.",
        brand: "EMS",
        tags: "analgesico,febre",
        sku: "PAR-750-20",
        category: "Analgésicos",
        price_cents: 1590,
        sale_price_cents: None,
        stock: 25,
    },
    SeedProduct {
        id: "demo-ibuprofeno-400",
        name: "Ibuprofeno 400mg 10 cápsulas",
        description: "Anti-inflamatório não esteroidal.",
        brand: "Neo Química",
        tags: "anti-inflamatorio,dor",
        sku: "IBU-400-10",
        category: "Anti-inflamatórios",
        price_cents: 1890,
        sale_price_cents: None,
        stock: 12,
    },
    SeedProduct {
        id: "demo-dorflex",
        name: "Dorflex 36 comprimidos",
        description: "Relaxante muscular e analgésico.",
        brand: "Sanofi",
        tags: "dor,relaxante",
        sku: "DORF-36",
        category: "Analgésicos",
        price_cents: 2490,
        sale_price_cents: Some(2190),
        stock: 18,
    },
    SeedProduct {
        id: "demo-vitamina-c",
        name: "Vitamina C 1g 10 comprimidos efervescentes",
        description: "Suplemento de vitamina C.",
        brand: "Cimed",
        tags: "vitaminas,imunidade",
        sku: "VITC-1G-10",
        category: "Vitaminas",
        price_cents: 1450,
        sale_price_cents: None,
        stock: 30,
    },
    SeedProduct {
        id: "demo-soro-500",
        name: "Soro fisiológico 0,9% 500ml",
        description: "Solução de cloreto de sódio para limpeza.",
        brand: "Equiplex",
        tags: "curativo,higiene",
        sku: "SORO-500",
        category: "Primeiros socorros",
        price_cents: 690,
        sale_price_cents: None,
        stock: 50,
    },
    SeedProduct {
        id: "demo-xarope-tosse",
        name: "Xarope expectorante 120ml",
        description: "Xarope para tosse com catarro.",
        brand: "EMS",
        tags: "tosse,gripe",
        sku: "XPE-120",
        category: "Gripe e resfriado",
        price_cents: 2290,
        sale_price_cents: None,
        stock: 9,
    },
    SeedProduct {
        id: "demo-protetor-50",
        name: "Protetor solar FPS 50 200ml",
        description: "Proteção UVA e UVB, resistente à água.",
        brand: "Nivea",
        tags: "dermocosmeticos,sol",
        sku: "PROT-50-200",
        category: "Dermocosméticos",
        price_cents: 5990,
        sale_price_cents: Some(4990),
        stock: 7,
    },
    SeedProduct {
        id: "demo-omeprazol-20",
        name: "Omeprazol 20mg 28 cápsulas",
        description: "Inibidor da bomba de prótons.",
        brand: "Medley",
        tags: "estomago,azia",
        sku: "OME-20-28",
        category: "Digestivos",
        price_cents: 2190,
        sale_price_cents: None,
        stock: 0,
    },
    SeedProduct {
        id: "demo-curativo",
        name: "Curativo adesivo caixa com 40 unidades",
        description: "Curativos transparentes para pequenos ferimentos.",
        brand: "Band-Aid",
        tags: "curativo,primeiros socorros",
        sku: "CUR-40",
        category: "Primeiros socorros",
        price_cents: 1390,
        sale_price_cents: None,
        stock: 22,
    },
];

/// Demo pharmacy tenant and catalog used by `storefront seed` and by cross-crate tests.
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub fn tenant_id() -> TenantId {
        TenantId(DEMO_TENANT_ID.to_string())
    }

    pub fn profile() -> TenantProfile {
        TenantProfile {
            id: Self::tenant_id(),
            store_name: "Farmácia Demo".to_string(),
            store_address: Some("Rua das Flores, 120 - Centro, Brasília/DF".to_string()),
            delivery_zones: vec!["Brasília".to_string(), "Taguatinga/Centro".to_string()],
            delivery_fee: Decimal::new(700, 2),
            business_hours: None,
        }
    }

    pub fn products() -> Vec<CatalogProduct> {
        let tenant_id = Self::tenant_id();
        SEED_PRODUCTS
            .iter()
            .map(|seed| CatalogProduct {
                id: ProductId(seed.id.to_string()),
                tenant_id: tenant_id.clone(),
                name: seed.name.to_string(),
                description: seed.description.to_string(),
                brand: seed.brand.to_string(),
                tags: seed.tags.to_string(),
                sku: seed.sku.to_string(),
                category: Some(seed.category.to_string()),
                price: Decimal::new(seed.price_cents, 2),
                sale_price: seed.sale_price_cents.map(|cents| Decimal::new(cents, 2)),
                stock_quantity: seed.stock,
            })
            .collect()
    }

    /// Upserts the tenant and its catalog; running it twice leaves the same rows.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let tenants = SqlTenantRepository::new(pool.clone());
        let catalog = SqlCatalogRepository::new(pool.clone());

        tenants.save_profile(Self::profile()).await?;
        let products = Self::products();
        let products_seeded = products.len();
        for product in products {
            catalog.save(product).await?;
        }

        Ok(SeedResult { tenant_id: DEMO_TENANT_ID, products_seeded })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let tenant_id = Self::tenant_id();
        let mut checks = Vec::new();

        let profile = SqlTenantRepository::new(pool.clone()).find_profile(&tenant_id).await?;
        checks.push(("tenant-profile", profile.is_some()));

        let product_count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM products WHERE tenant_id = ?1")
                .bind(DEMO_TENANT_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("catalog-products", product_count == SEED_PRODUCTS.len() as i64));

        let indexed: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM products_fts WHERE products_fts MATCH '\"dipirona\"*'",
        )
        .fetch_one(pool)
        .await?;
        checks.push(("full-text-index", indexed >= 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub tenant_id: &'static str,
    pub products_seeded: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use super::{DemoSeedDataset, SEED_PRODUCTS};
    use crate::{connect_with_settings, migrations};

    #[test]
    fn seed_products_have_unique_ids_and_skus() {
        let mut ids: Vec<_> = SEED_PRODUCTS.iter().map(|seed| seed.id).collect();
        let mut skus: Vec<_> = SEED_PRODUCTS.iter().map(|seed| seed.sku).collect();
        ids.sort_unstable();
        ids.dedup();
        skus.sort_unstable();
        skus.dedup();

        assert_eq!(ids.len(), SEED_PRODUCTS.len());
        assert_eq!(skus.len(), SEED_PRODUCTS.len());
        assert!(SEED_PRODUCTS.iter().any(|seed| seed.stock == 0), "one product is out of stock");
    }

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = DemoSeedDataset::load(&pool).await.expect("first load");
        let second = DemoSeedDataset::load(&pool).await.expect("second load");
        assert_eq!(first, second);

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);
    }
}
