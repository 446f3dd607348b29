use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One tier of a campaign's volume discount ladder.
///
/// Brackets for a campaign partition `[0, ∞)` when sorted by `bracket_order`:
/// no gaps, no overlaps, at most one unbounded bracket and it must come last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountBracket {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub min_quantity: i64,
    /// `None` means unbounded
    pub max_quantity: Option<i64>,
    pub unit_price: Decimal,
    pub bracket_order: i32,
}

impl DiscountBracket {
    pub fn new(
        campaign_id: Uuid,
        min_quantity: i64,
        max_quantity: Option<i64>,
        unit_price: Decimal,
        bracket_order: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            min_quantity,
            max_quantity,
            unit_price,
            bracket_order,
        }
    }

    /// Boundaries are inclusive on both ends
    pub fn contains(&self, quantity: i64) -> bool {
        quantity >= self.min_quantity && self.max_quantity.map_or(true, |max| quantity <= max)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("No pricing available: campaign has no discount brackets")]
    NoPricingAvailable,

    #[error("Malformed bracket set: {0}")]
    MalformedBrackets(String),
}

/// Resolve the applicable tier for a pledged quantity.
///
/// Scans in ascending `bracket_order` and returns the first bracket whose
/// range contains the quantity. A malformed set that matches nothing falls
/// back to the first bracket rather than failing the read path; only an
/// empty set is an error.
pub fn resolve_bracket(brackets: &[DiscountBracket], quantity: i64) -> Result<&DiscountBracket, PricingError> {
    brackets
        .iter()
        .find(|b| b.contains(quantity))
        .or_else(|| brackets.first())
        .ok_or(PricingError::NoPricingAvailable)
}

/// The tier immediately following `current` by position, `None` if last
pub fn next_bracket<'a>(brackets: &'a [DiscountBracket], current: &DiscountBracket) -> Option<&'a DiscountBracket> {
    let idx = brackets.iter().position(|b| b.id == current.id)?;
    brackets.get(idx + 1)
}

pub fn unit_price_for_quantity(brackets: &[DiscountBracket], quantity: i64) -> Result<Decimal, PricingError> {
    resolve_bracket(brackets, quantity).map(|b| b.unit_price)
}

/// How many more units until the next tier unlocks, for progress displays
pub fn quantity_to_next_bracket(brackets: &[DiscountBracket], quantity: i64) -> Option<i64> {
    let current = resolve_bracket(brackets, quantity).ok()?;
    next_bracket(brackets, current).map(|next| (next.min_quantity - quantity).max(0))
}

/// Validate a draft campaign's bracket set against the partition invariant.
///
/// Enforced when brackets are created; the resolver itself stays tolerant of
/// malformed sets already in the wild.
pub fn validate_brackets(brackets: &[DiscountBracket]) -> Result<(), PricingError> {
    if brackets.is_empty() {
        return Err(PricingError::MalformedBrackets("bracket set is empty".into()));
    }

    let mut sorted: Vec<&DiscountBracket> = brackets.iter().collect();
    sorted.sort_by_key(|b| b.bracket_order);

    for pair in sorted.windows(2) {
        if pair[0].bracket_order == pair[1].bracket_order {
            return Err(PricingError::MalformedBrackets(format!(
                "duplicate bracket_order {}",
                pair[0].bracket_order
            )));
        }
    }

    if sorted[0].min_quantity != 0 {
        return Err(PricingError::MalformedBrackets(format!(
            "first bracket must start at 0, starts at {}",
            sorted[0].min_quantity
        )));
    }

    for (i, pair) in sorted.windows(2).enumerate() {
        match pair[0].max_quantity {
            None => {
                return Err(PricingError::MalformedBrackets(format!(
                    "unbounded bracket at position {} must be last",
                    i
                )));
            }
            Some(max) => {
                if pair[1].min_quantity != max + 1 {
                    return Err(PricingError::MalformedBrackets(format!(
                        "gap or overlap between quantities {} and {}",
                        max, pair[1].min_quantity
                    )));
                }
            }
        }
    }

    let last = sorted[sorted.len() - 1];
    if last.max_quantity.is_some() {
        return Err(PricingError::MalformedBrackets(
            "last bracket must be unbounded to cover all quantities".into(),
        ));
    }

    for b in &sorted {
        if b.unit_price <= Decimal::ZERO {
            return Err(PricingError::MalformedBrackets(format!(
                "unit price must be positive in bracket {}",
                b.bracket_order
            )));
        }
        if let Some(max) = b.max_quantity {
            if max < b.min_quantity {
                return Err(PricingError::MalformedBrackets(format!(
                    "bracket {} has max below min",
                    b.bracket_order
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ladder() -> Vec<DiscountBracket> {
        let campaign_id = Uuid::new_v4();
        vec![
            DiscountBracket::new(campaign_id, 0, Some(49), dec!(100), 1),
            DiscountBracket::new(campaign_id, 50, Some(99), dec!(90), 2),
            DiscountBracket::new(campaign_id, 100, None, dec!(80), 3),
        ]
    }

    #[test]
    fn resolves_each_tier() {
        let brackets = ladder();
        assert_eq!(resolve_bracket(&brackets, 10).unwrap().unit_price, dec!(100));
        assert_eq!(resolve_bracket(&brackets, 75).unwrap().unit_price, dec!(90));
        assert_eq!(resolve_bracket(&brackets, 120).unwrap().unit_price, dec!(80));
    }

    #[test]
    fn boundaries_are_inclusive_both_ends() {
        let brackets = ladder();
        assert_eq!(resolve_bracket(&brackets, 0).unwrap().bracket_order, 1);
        assert_eq!(resolve_bracket(&brackets, 49).unwrap().bracket_order, 1);
        assert_eq!(resolve_bracket(&brackets, 50).unwrap().bracket_order, 2);
        assert_eq!(resolve_bracket(&brackets, 99).unwrap().bracket_order, 2);
        assert_eq!(resolve_bracket(&brackets, 100).unwrap().bracket_order, 3);
    }

    #[test]
    fn every_quantity_resolves_to_a_containing_bracket() {
        let brackets = ladder();
        for q in 0..500 {
            let b = resolve_bracket(&brackets, q).unwrap();
            assert!(b.contains(q), "quantity {} resolved to non-containing tier", q);
        }
    }

    #[test]
    fn malformed_set_falls_back_to_first_bracket() {
        let campaign_id = Uuid::new_v4();
        // Gap: nothing covers quantities below 10
        let brackets = vec![
            DiscountBracket::new(campaign_id, 10, Some(49), dec!(100), 1),
            DiscountBracket::new(campaign_id, 50, None, dec!(90), 2),
        ];
        assert_eq!(resolve_bracket(&brackets, 5).unwrap().bracket_order, 1);
    }

    #[test]
    fn empty_set_is_an_error() {
        assert!(matches!(
            resolve_bracket(&[], 10),
            Err(PricingError::NoPricingAvailable)
        ));
    }

    #[test]
    fn next_bracket_walks_the_ladder() {
        let brackets = ladder();
        let first = resolve_bracket(&brackets, 10).unwrap();
        let second = next_bracket(&brackets, first).unwrap();
        assert_eq!(second.bracket_order, 2);
        let last = resolve_bracket(&brackets, 1000).unwrap();
        assert!(next_bracket(&brackets, last).is_none());
    }

    #[test]
    fn quantity_to_next_tier() {
        let brackets = ladder();
        assert_eq!(quantity_to_next_bracket(&brackets, 30), Some(20));
        assert_eq!(quantity_to_next_bracket(&brackets, 99), Some(1));
        assert_eq!(quantity_to_next_bracket(&brackets, 150), None);
    }

    #[test]
    fn validation_accepts_contiguous_ladder() {
        assert!(validate_brackets(&ladder()).is_ok());
    }

    #[test]
    fn validation_rejects_gaps_overlaps_and_misorder() {
        let campaign_id = Uuid::new_v4();

        let gapped = vec![
            DiscountBracket::new(campaign_id, 0, Some(49), dec!(100), 1),
            DiscountBracket::new(campaign_id, 60, None, dec!(90), 2),
        ];
        assert!(validate_brackets(&gapped).is_err());

        let overlapping = vec![
            DiscountBracket::new(campaign_id, 0, Some(49), dec!(100), 1),
            DiscountBracket::new(campaign_id, 40, None, dec!(90), 2),
        ];
        assert!(validate_brackets(&overlapping).is_err());

        let nonzero_floor = vec![DiscountBracket::new(campaign_id, 5, None, dec!(100), 1)];
        assert!(validate_brackets(&nonzero_floor).is_err());

        let interior_unbounded = vec![
            DiscountBracket::new(campaign_id, 0, None, dec!(100), 1),
            DiscountBracket::new(campaign_id, 50, None, dec!(90), 2),
        ];
        assert!(validate_brackets(&interior_unbounded).is_err());

        let bounded_tail = vec![
            DiscountBracket::new(campaign_id, 0, Some(49), dec!(100), 1),
            DiscountBracket::new(campaign_id, 50, Some(99), dec!(90), 2),
        ];
        assert!(validate_brackets(&bounded_tail).is_err());
    }

    #[test]
    fn validation_rejects_nonpositive_prices() {
        let campaign_id = Uuid::new_v4();
        let brackets = vec![DiscountBracket::new(campaign_id, 0, None, dec!(0), 1)];
        assert!(validate_brackets(&brackets).is_err());
    }
}
