// Port Layer - Interfaces for external dependencies

pub mod coupon_repository;
pub mod store_error;
pub mod time_provider;

// Re-exports
pub use coupon_repository::CouponRepository;
pub use store_error::{classify, ConstraintKey, PoolError, StoreError, StoreResult};
pub use time_provider::{FixedTimeProvider, SystemTimeProvider, TimeProvider};
