// Ownership Relation Domain Model

use super::coupon::CouponId;
use serde::{Deserialize, Serialize};

/// Company or customer identity
pub type OwnerId = i64;

/// Which side of the many-to-many link owns the coupon
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerKind {
    /// Company that issued the coupon
    Company,
    /// Customer that purchased the coupon
    Customer,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Company => "COMPANY",
            OwnerKind::Customer => "CUSTOMER",
        }
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (owner, coupon) link, unique per pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ownership {
    pub kind: OwnerKind,
    pub owner_id: OwnerId,
    pub coupon_id: CouponId,
}

impl Ownership {
    pub fn new(kind: OwnerKind, owner_id: OwnerId, coupon_id: CouponId) -> Self {
        Self {
            kind,
            owner_id,
            coupon_id,
        }
    }
}
