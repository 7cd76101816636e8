// Coupon Domain Model

use super::error::{DomainError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Coupon identity (live and archive key spaces are independent)
pub type CouponId = i64;

/// Coupon Type
///
/// Text that does not name a known type normalizes to `Unspecified`
/// instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CouponType {
    Restaurants,
    Electronics,
    Food,
    Health,
    Games,
    Sports,
    Camping,
    Travelling,
    Hotels,
    Vacations,
    Tools,
    Unspecified,
}

impl CouponType {
    pub const ALL: [CouponType; 12] = [
        CouponType::Restaurants,
        CouponType::Electronics,
        CouponType::Food,
        CouponType::Health,
        CouponType::Games,
        CouponType::Sports,
        CouponType::Camping,
        CouponType::Travelling,
        CouponType::Hotels,
        CouponType::Vacations,
        CouponType::Tools,
        CouponType::Unspecified,
    ];

    /// Stored (upper-case) representation
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponType::Restaurants => "RESTAURANTS",
            CouponType::Electronics => "ELECTRONICS",
            CouponType::Food => "FOOD",
            CouponType::Health => "HEALTH",
            CouponType::Games => "GAMES",
            CouponType::Sports => "SPORTS",
            CouponType::Camping => "CAMPING",
            CouponType::Travelling => "TRAVELLING",
            CouponType::Hotels => "HOTELS",
            CouponType::Vacations => "VACATIONS",
            CouponType::Tools => "TOOLS",
            CouponType::Unspecified => "UNSPECIFIED",
        }
    }

    /// Case-insensitive parse; unknown text maps to `Unspecified`
    pub fn parse_lenient(value: &str) -> Self {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(value))
            .unwrap_or(CouponType::Unspecified)
    }

    /// True when `value` is not a known type name (explicit "UNSPECIFIED" is known)
    pub fn is_unrecognized(value: &str) -> bool {
        Self::parse_lenient(value) == CouponType::Unspecified
            && !value.trim().eq_ignore_ascii_case(CouponType::Unspecified.as_str())
    }

    pub fn is_unspecified(&self) -> bool {
        *self == CouponType::Unspecified
    }
}

impl std::fmt::Display for CouponType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live coupon record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub title: String,
    pub message: String,
    pub image: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Remaining stock. Maintained independently of ownership relations.
    pub amount: u32,
    pub coupon_type: CouponType,
    pub price: f64,
}

impl Coupon {
    /// Create a coupon, rejecting negative or non-finite prices and inverted date ranges
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: CouponId,
        title: impl Into<String>,
        message: impl Into<String>,
        image: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        amount: u32,
        coupon_type: CouponType,
        price: f64,
    ) -> Result<Self> {
        if !price.is_finite() || price < 0.0 {
            return Err(DomainError::InvalidPrice(price));
        }
        if end_date < start_date {
            return Err(DomainError::ValidationError(format!(
                "coupon {} ends ({}) before it starts ({})",
                id, end_date, start_date
            )));
        }

        Ok(Self {
            id,
            title: title.into(),
            message: message.into(),
            image: image.into(),
            start_date,
            end_date,
            amount,
            coupon_type,
            price,
        })
    }

    /// Expired iff the end date is strictly before `today` (date-only comparison)
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.end_date < today
    }

    /// Create a coupon for testing (title derived from id, one-year validity)
    pub fn new_test(id: CouponId, end_date: NaiveDate) -> Self {
        Self {
            id,
            title: format!("coupon-{}", id),
            message: "test coupon".to_string(),
            image: format!("img/{}.png", id),
            start_date: end_date - chrono::Days::new(365),
            end_date,
            amount: 10,
            coupon_type: CouponType::Food,
            price: 9.99,
        }
    }
}

/// Archived coupon record
///
/// `id` comes from the archive key space; `old_id` points back at the
/// live identity the record was migrated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedCoupon {
    pub id: CouponId,
    pub old_id: CouponId,
    pub title: String,
    pub message: String,
    pub image: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub amount: u32,
    pub coupon_type: CouponType,
    pub price: f64,
}

impl ArchivedCoupon {
    /// Rebuild the attributes as they were in the live table
    pub fn to_original(&self) -> Coupon {
        Coupon {
            id: self.old_id,
            title: self.title.clone(),
            message: self.message.clone(),
            image: self.image.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            amount: self.amount,
            coupon_type: self.coupon_type,
            price: self.price,
        }
    }
}
