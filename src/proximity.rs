use crate::routes::user::model::Address;

pub trait ProximityPolicy: Send + Sync {
    fn is_nearby(&self, a: &Address, b: &Address) -> bool;
}

// 邮编启发式：城市一致 + 邮编末三位差 ≤ 3。
// 这是“同一邮政片区”的粗略代理，不是真实距离，不保证三角不等式。
pub struct PincodeHeuristic;

impl ProximityPolicy for PincodeHeuristic {
    fn is_nearby(&self, a: &Address, b: &Address) -> bool {
        if !a.city.trim().eq_ignore_ascii_case(b.city.trim()) {
            return false;
        }

        match (last_three_digits(&a.pincode), last_three_digits(&b.pincode)) {
            (Some(x), Some(y)) => (x - y).abs() <= 3,
            // 任一邮编缺失或无法解析时退化为城市匹配
            _ => true,
        }
    }
}

fn last_three_digits(pincode: &str) -> Option<i32> {
    let trimmed = pincode.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = trimmed.len().saturating_sub(3);
    trimmed.get(start..)?.parse().ok()
}

// 球面距离，仅在双方都有坐标时可用
pub struct Haversine {
    pub radius_km: f64,
}

impl Default for Haversine {
    fn default() -> Self {
        Haversine { radius_km: 50.0 }
    }
}

impl ProximityPolicy for Haversine {
    fn is_nearby(&self, a: &Address, b: &Address) -> bool {
        match (a.coords(), b.coords()) {
            (Some(p), Some(q)) => haversine_km(p, q) <= self.radius_km,
            _ => false,
        }
    }
}

pub fn haversine_km((lat1, lon1): (f64, f64), (lat2, lon2): (f64, f64)) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

// 默认策略：双方都有坐标时用球面距离，否则退回邮编启发式
pub struct Proximity {
    haversine: Haversine,
    pincode: PincodeHeuristic,
}

impl Proximity {
    pub fn new(radius_km: f64) -> Self {
        Proximity {
            haversine: Haversine { radius_km },
            pincode: PincodeHeuristic,
        }
    }
}

impl ProximityPolicy for Proximity {
    fn is_nearby(&self, a: &Address, b: &Address) -> bool {
        if a.coords().is_some() && b.coords().is_some() {
            self.haversine.is_nearby(a, b)
        } else {
            self.pincode.is_nearby(a, b)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(city: &str, pincode: &str) -> Address {
        Address {
            city: city.into(),
            pincode: pincode.into(),
            ..Address::default()
        }
    }

    fn located(lat: f64, lng: f64) -> Address {
        Address {
            city: "Pune".into(),
            pincode: "411001".into(),
            latitude: Some(lat),
            longitude: Some(lng),
            ..Address::default()
        }
    }

    #[test]
    fn pincode_suffix_within_range_matches() {
        let policy = PincodeHeuristic;
        let donor = address("Pune", "411045");
        assert!(policy.is_nearby(&donor, &address("Pune", "411048")));
        assert!(!policy.is_nearby(&donor, &address("Pune", "411099")));
        assert!(!policy.is_nearby(&donor, &address("Mumbai", "411045")));
    }

    #[test]
    fn city_match_is_case_insensitive() {
        let policy = PincodeHeuristic;
        assert!(policy.is_nearby(&address("pune", "411045"), &address("PUNE", "411046")));
    }

    #[test]
    fn malformed_pincode_falls_back_to_city_match() {
        let policy = PincodeHeuristic;
        assert!(policy.is_nearby(&address("Pune", ""), &address("Pune", "411099")));
        assert!(policy.is_nearby(&address("Pune", "41104A"), &address("Pune", "411099")));
        assert!(!policy.is_nearby(&address("Mumbai", ""), &address("Pune", "411099")));
    }

    #[test]
    fn pincode_heuristic_is_symmetric() {
        let policy = PincodeHeuristic;
        let cases = [
            (address("Pune", "411045"), address("Pune", "411048")),
            (address("Pune", "411045"), address("Pune", "411099")),
            (address("Pune", ""), address("Pune", "411001")),
            (address("Pune", "411045"), address("Mumbai", "411045")),
        ];
        for (a, b) in &cases {
            assert_eq!(policy.is_nearby(a, b), policy.is_nearby(b, a));
        }
    }

    #[test]
    fn short_pincodes_still_compare() {
        let policy = PincodeHeuristic;
        assert!(policy.is_nearby(&address("Pune", "45"), &address("Pune", "411046")));
    }

    #[test]
    fn haversine_respects_radius() {
        let policy = Haversine::default();
        // 浦那市中心到市郊约 10 km
        let center = located(18.5204, 73.8567);
        let suburb = located(18.5913, 73.7389);
        assert!(policy.is_nearby(&center, &suburb));

        // 浦那到孟买约 120 km
        let mumbai = located(19.0760, 72.8777);
        assert!(!policy.is_nearby(&center, &mumbai));
    }

    #[test]
    fn haversine_requires_coordinates_on_both_sides() {
        let policy = Haversine::default();
        assert!(!policy.is_nearby(&located(18.52, 73.85), &address("Pune", "411001")));
    }

    #[test]
    fn default_policy_prefers_coordinates() {
        let policy = Proximity::new(50.0);

        // 坐标在距离内，即使邮编相差很远
        let a = Address {
            pincode: "411001".into(),
            ..located(18.5204, 73.8567)
        };
        let b = Address {
            pincode: "411999".into(),
            ..located(18.5913, 73.7389)
        };
        assert!(policy.is_nearby(&a, &b));

        // 缺坐标时退回邮编启发式
        let c = address("Pune", "411045");
        let d = address("Pune", "411048");
        assert!(policy.is_nearby(&c, &d));
    }
}
