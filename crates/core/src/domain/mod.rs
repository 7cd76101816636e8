// Domain Layer - Coupon records and ownership links

pub mod coupon;
pub mod error;
pub mod ownership;

// Re-exports
pub use coupon::{ArchivedCoupon, Coupon, CouponId, CouponType};
pub use error::DomainError;
pub use ownership::{OwnerId, OwnerKind, Ownership};
