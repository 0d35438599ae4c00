use serde::Serialize;

/// Parameters of the automatic follow-up offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpPolicy {
    /// The offer goes out this many days before the training starts.
    pub days_before: i64,
    pub discount_percent: u32,
    /// Added to the prospect's cpf to form the price floor.
    pub price_margin: u32,
}

impl Default for FollowUpPolicy {
    fn default() -> Self {
        Self {
            days_before: 21,
            discount_percent: 30,
            price_margin: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Offer {
    pub price: u32,
    /// Discount actually granted by `price`, so the two never disagree.
    pub discount_percent: u32,
}

/// Discounted list price, floored at `cpf + margin`.
pub fn compute_offer(base_price: u32, cpf: f64, policy: &FollowUpPolicy) -> Offer {
    let base = f64::from(base_price);
    let kept = f64::from(100u32.saturating_sub(policy.discount_percent));
    let naive = (base * kept / 100.0).round();

    let cpf = if cpf.is_finite() { cpf.max(0.0) } else { 0.0 };
    let floor = (cpf + f64::from(policy.price_margin)).ceil();

    let price = naive.max(floor);
    let discount = if base_price == 0 {
        0.0
    } else {
        ((1.0 - price / base) * 100.0).round().clamp(0.0, 100.0)
    };

    Offer {
        price: price.min(f64::from(u32::MAX)) as u32,
        discount_percent: discount as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_applies_when_above_floor() {
        let offer = compute_offer(1650, 500.0, &FollowUpPolicy::default());
        assert_eq!(
            offer,
            Offer {
                price: 1155,
                discount_percent: 30
            }
        );
    }

    #[test]
    fn floor_wins_and_discount_clamps_to_zero() {
        let offer = compute_offer(1650, 1600.0, &FollowUpPolicy::default());
        assert_eq!(
            offer,
            Offer {
                price: 1700,
                discount_percent: 0
            }
        );
    }

    #[test]
    fn partial_floor_rederives_displayed_discount() {
        let offer = compute_offer(1650, 1220.0, &FollowUpPolicy::default());
        assert_eq!(offer.price, 1320);
        assert_eq!(offer.discount_percent, 20);
    }

    #[test]
    fn fractional_cpf_rounds_floor_up() {
        let offer = compute_offer(1000, 650.2, &FollowUpPolicy::default());
        assert_eq!(offer.price, 751);
    }

    #[test]
    fn degenerate_inputs_stay_in_range() {
        let generous = FollowUpPolicy {
            discount_percent: 150,
            ..FollowUpPolicy::default()
        };
        let offer = compute_offer(1650, f64::NAN, &generous);
        assert_eq!(offer.price, 100);
        assert!(offer.discount_percent <= 100);

        let free = compute_offer(0, 0.0, &FollowUpPolicy::default());
        assert_eq!(free.discount_percent, 0);
    }
}
