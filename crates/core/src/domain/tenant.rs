use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::hours::{BusinessHours, StoreStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: TenantId,
    pub store_name: String,
    pub store_address: Option<String>,
    /// Cities or `city/neighborhood` pairs the store delivers to.
    pub delivery_zones: Vec<String>,
    pub delivery_fee: Decimal,
    /// Unset means the store takes orders at any time.
    #[serde(default)]
    pub business_hours: Option<BusinessHours>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryCoverage {
    Served { fee: Decimal },
    NotServed,
    NotConfigured,
}

impl TenantProfile {
    pub fn placeholder(id: TenantId) -> Self {
        Self {
            id,
            store_name: "our store".to_string(),
            store_address: None,
            delivery_zones: Vec::new(),
            delivery_fee: Decimal::ZERO,
            business_hours: None,
        }
    }

    /// `None` when the store has no opening hours configured.
    pub fn status_at(&self, now: DateTime<Utc>) -> Option<StoreStatus> {
        self.business_hours.as_ref().map(|hours| hours.status_at(now))
    }

    pub fn coverage(&self, city: &str, neighborhood: Option<&str>) -> DeliveryCoverage {
        if self.delivery_zones.is_empty() {
            return DeliveryCoverage::NotConfigured;
        }

        let city = normalize_place(city);
        let neighborhood = neighborhood.map(normalize_place).filter(|value| !value.is_empty());

        let served = self.delivery_zones.iter().any(|zone| {
            let zone = normalize_place(zone);
            match zone.split_once('/') {
                Some((zone_city, zone_neighborhood)) => {
                    zone_city.trim() == city
                        && neighborhood.as_deref() == Some(zone_neighborhood.trim())
                }
                None => zone == city || neighborhood.as_deref() == Some(zone.as_str()),
            }
        });

        if served {
            DeliveryCoverage::Served { fee: self.delivery_fee }
        } else {
            DeliveryCoverage::NotServed
        }
    }
}

fn normalize_place(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{DeliveryCoverage, TenantId, TenantProfile};
    use crate::domain::hours::{BusinessHours, DayHours, StoreStatus};

    fn profile(zones: &[&str]) -> TenantProfile {
        TenantProfile {
            id: TenantId("t-1".to_string()),
            store_name: "Farmácia Central".to_string(),
            store_address: Some("Rua A, 10".to_string()),
            delivery_zones: zones.iter().map(|zone| zone.to_string()).collect(),
            delivery_fee: Decimal::new(500, 2),
            business_hours: None,
        }
    }

    #[test]
    fn whole_city_zone_serves_any_neighborhood() {
        let coverage = profile(&["Brasília"]).coverage("brasília", Some("Asa Norte"));
        assert_eq!(coverage, DeliveryCoverage::Served { fee: Decimal::new(500, 2) });
    }

    #[test]
    fn neighborhood_zone_requires_matching_pair() {
        let profile = profile(&["Brasília/Asa Sul"]);
        assert_eq!(profile.coverage("Brasília", Some("Asa Norte")), DeliveryCoverage::NotServed);
        assert!(matches!(
            profile.coverage("Brasília", Some("asa  sul")),
            DeliveryCoverage::Served { .. }
        ));
    }

    #[test]
    fn empty_zone_list_is_not_configured() {
        assert_eq!(profile(&[]).coverage("Brasília", None), DeliveryCoverage::NotConfigured);
    }

    #[test]
    fn status_needs_configured_hours() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 23, 0, 0).unwrap();
        let mut profile = profile(&[]);
        assert_eq!(profile.status_at(now), None);

        let nine_to_five = DayHours::new(
            NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
            NaiveTime::from_hms_opt(17, 0, 0).expect("time"),
        );
        profile.business_hours = Some(BusinessHours::every_day(0, nine_to_five));
        assert!(matches!(profile.status_at(now), Some(StoreStatus::Closed { reopens: Some(_) })));
    }
}
