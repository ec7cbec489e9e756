use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use partsmarket_core::{PartyRole, TenantId};

use crate::rating::{Rating, RatingValue};

/// Cached reputation counters of one tenant.
///
/// `score` is a materialized value: it is recomputed on every [`record`](Self::record)
/// and stored alongside the counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reputation {
    pub tenant_id: TenantId,
    pub positive_as_buyer: u64,
    pub negative_as_buyer: u64,
    pub positive_as_supplier: u64,
    pub negative_as_supplier: u64,
    /// Percentage of positive ratings, one decimal; `None` until rated.
    pub score: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Reputation {
    pub fn empty(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            positive_as_buyer: 0,
            negative_as_buyer: 0,
            positive_as_supplier: 0,
            negative_as_supplier: 0,
            score: None,
            updated_at: None,
        }
    }

    pub fn positive(&self) -> u64 {
        self.positive_as_buyer + self.positive_as_supplier
    }

    pub fn negative(&self) -> u64 {
        self.negative_as_buyer + self.negative_as_supplier
    }

    /// Count `rating` against the rated tenant in the role it played.
    pub fn record(&mut self, rating: &Rating) {
        let counter = match (rating.rated_role(), rating.value) {
            (PartyRole::Buyer, RatingValue::Positive) => &mut self.positive_as_buyer,
            (PartyRole::Buyer, RatingValue::Negative) => &mut self.negative_as_buyer,
            (PartyRole::Supplier, RatingValue::Positive) => &mut self.positive_as_supplier,
            (PartyRole::Supplier, RatingValue::Negative) => &mut self.negative_as_supplier,
        };
        *counter += 1;
        self.score = score(self.positive(), self.negative());
        self.updated_at = Some(rating.created_at);
    }
}

fn score(positive: u64, negative: u64) -> Option<Decimal> {
    let total = positive + negative;
    if total == 0 {
        return None;
    }
    let pct = Decimal::from(positive) * Decimal::ONE_HUNDRED / Decimal::from(total);
    Some(pct.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::{MAX_COMMENT_LEN, RatingError, SubmitRating};
    use chrono::Utc;
    use partsmarket_core::{Aggregate, AggregateId};
    use partsmarket_listings::{Currency, ListingId, ListingSnapshot};
    use partsmarket_orders::{
        CompleteOrder, ConfirmOrder, OfferOrder, Order, OrderCommand, OrderId, OrderSla,
        PlaceOrder,
    };
    use partsmarket_suppliers::DeliveryTerms;
    use proptest::prelude::*;

    fn completed_order(buyer: TenantId, seller: TenantId) -> Order {
        let now = Utc::now();
        let (order, _) = Order::place(&PlaceOrder {
            order_id: OrderId::new(AggregateId::new()),
            buyer_id: buyer,
            seller_id: seller,
            listing: ListingSnapshot {
                listing_id: ListingId::new(AggregateId::new()),
                title: "Oil filter".to_string(),
                brand: "Mann".to_string(),
                category: "Filters".to_string(),
                unit_price: Decimal::new(900, 0),
                currency: Currency::Rsd,
                quantity: 1,
            },
            buyer_city: "Beograd".to_string(),
            occurred_at: now,
        })
        .unwrap();

        let commands = [
            OrderCommand::Offer(OfferOrder {
                actor: seller,
                delivery: DeliveryTerms::pickup(),
                sla: OrderSla::default(),
                occurred_at: now,
            }),
            OrderCommand::Confirm(ConfirmOrder {
                actor: buyer,
                buyer_fee: Decimal::ZERO,
                supplier_fee: Decimal::ZERO,
                occurred_at: now,
            }),
            OrderCommand::Complete(CompleteOrder {
                actor: buyer,
                occurred_at: now,
            }),
        ];
        commands
            .iter()
            .fold(order, |order, cmd| order.decide(cmd).unwrap().0)
    }

    fn submit(rater: TenantId, value: RatingValue) -> SubmitRating {
        SubmitRating {
            rater_tenant: rater,
            rater_user: None,
            value,
            comment: None,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn buyer_rating_counts_toward_seller_as_supplier() {
        let (buyer, seller) = (TenantId::new(), TenantId::new());
        let order = completed_order(buyer, seller);

        let rating = Rating::submit(&order, submit(buyer, RatingValue::Positive)).unwrap();
        assert_eq!(rating.rater_role, PartyRole::Buyer);
        assert_eq!(rating.rated_tenant, seller);

        let mut rep = Reputation::empty(seller);
        rep.record(&rating);
        assert_eq!(rep.positive_as_supplier, 1);
        assert_eq!(rep.positive_as_buyer, 0);
        assert_eq!(rep.score, Some(Decimal::ONE_HUNDRED));
    }

    #[test]
    fn seller_rating_counts_toward_buyer_as_buyer() {
        let (buyer, seller) = (TenantId::new(), TenantId::new());
        let order = completed_order(buyer, seller);
        let rating = Rating::submit(&order, submit(seller, RatingValue::Negative)).unwrap();

        let mut rep = Reputation::empty(buyer);
        rep.record(&rating);
        assert_eq!(rep.negative_as_buyer, 1);
        assert_eq!(rep.score, Some(Decimal::ZERO));
    }

    #[test]
    fn score_rounds_to_one_decimal() {
        assert_eq!(score(2, 1), Some(Decimal::new(667, 1)));
        assert_eq!(score(1, 2), Some(Decimal::new(333, 1)));
        assert_eq!(score(0, 0), None);
    }

    #[test]
    fn strangers_and_open_orders_cannot_rate() {
        let (buyer, seller) = (TenantId::new(), TenantId::new());
        let order = completed_order(buyer, seller);
        assert_eq!(
            Rating::submit(&order, submit(TenantId::new(), RatingValue::Positive)).unwrap_err(),
            RatingError::NotAParty
        );

        let mut long = submit(buyer, RatingValue::Positive);
        long.comment = Some("x".repeat(MAX_COMMENT_LEN + 1));
        assert!(matches!(
            Rating::submit(&order, long),
            Err(RatingError::Domain(_))
        ));
    }

    #[test]
    fn open_orders_are_not_ratable() {
        let (buyer, seller) = (TenantId::new(), TenantId::new());
        let (order, _) = Order::place(&PlaceOrder {
            order_id: OrderId::new(AggregateId::new()),
            buyer_id: buyer,
            seller_id: seller,
            listing: completed_order(buyer, seller).listing().clone(),
            buyer_city: "Beograd".to_string(),
            occurred_at: Utc::now(),
        })
        .unwrap();

        assert!(matches!(
            Rating::submit(&order, submit(buyer, RatingValue::Positive)),
            Err(RatingError::NotRatable { .. })
        ));
    }

    proptest! {
        #[test]
        fn score_stays_within_bounds(positive in 0u64..10_000, negative in 0u64..10_000) {
            match score(positive, negative) {
                None => prop_assert_eq!(positive + negative, 0),
                Some(s) => {
                    prop_assert!(s >= Decimal::ZERO && s <= Decimal::ONE_HUNDRED);
                    prop_assert!(s.scale() <= 1);
                }
            }
        }
    }
}
