// Coupon Repository Port (Interface)

use crate::domain::{Coupon, CouponId, OwnerId, OwnerKind};
use crate::port::store_error::StoreResult;
use async_trait::async_trait;

/// Store operations the archival pipeline relies on
///
/// Failures surface as classified [`StoreError`](crate::port::StoreError)s so
/// the caller can tell "already archived" apart from a broken store.
#[async_trait]
pub trait CouponRepository: Send + Sync {
    /// Load every live coupon
    async fn list_live(&self) -> StoreResult<Vec<Coupon>>;

    /// Copy a live coupon into the archive, returning the new archive identity
    ///
    /// Fails with `DuplicateKey` when the coupon was archived before.
    async fn insert_archived(&self, coupon: &Coupon) -> StoreResult<CouponId>;

    /// Owners linked to a live coupon
    async fn live_owners(&self, kind: OwnerKind, coupon_id: CouponId) -> StoreResult<Vec<OwnerId>>;

    /// Link an owner to an archived coupon
    async fn insert_archived_owner(
        &self,
        kind: OwnerKind,
        owner_id: OwnerId,
        archive_id: CouponId,
    ) -> StoreResult<()>;

    /// Delete a live coupon (its live links go with it)
    ///
    /// # Returns
    /// Number of coupon rows deleted (0 when already gone)
    async fn delete_live(&self, coupon_id: CouponId) -> StoreResult<u64>;
}

pub mod mocks {
    use super::*;
    use crate::domain::{ArchivedCoupon, Ownership};
    use crate::port::store_error::{classify, ConstraintKey, StoreError};
    use std::collections::{BTreeMap, BTreeSet, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    struct State {
        live: BTreeMap<CouponId, Coupon>,
        live_links: BTreeSet<(OwnerKind, OwnerId, CouponId)>,
        archive: Vec<ArchivedCoupon>,
        archive_links: HashSet<Ownership>,
        next_archive_id: CouponId,
        failing_owners: HashSet<(OwnerKind, OwnerId)>,
        fail_listing: bool,
        fail_owner_listing: bool,
    }

    /// In-memory repository with failure injection
    #[derive(Default)]
    pub struct InMemoryCouponRepository {
        state: Mutex<State>,
    }

    impl InMemoryCouponRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_live(&self, coupon: Coupon) {
            self.state.lock().unwrap().live.insert(coupon.id, coupon);
        }

        pub fn link(&self, kind: OwnerKind, owner_id: OwnerId, coupon_id: CouponId) {
            self.state
                .lock()
                .unwrap()
                .live_links
                .insert((kind, owner_id, coupon_id));
        }

        /// Make archived-link inserts for this owner fail with a named constraint violation
        pub fn fail_archived_owner(&self, kind: OwnerKind, owner_id: OwnerId) {
            self.state
                .lock()
                .unwrap()
                .failing_owners
                .insert((kind, owner_id));
        }

        pub fn fail_listing(&self) {
            self.state.lock().unwrap().fail_listing = true;
        }

        pub fn fail_owner_listing(&self) {
            self.state.lock().unwrap().fail_owner_listing = true;
        }

        pub fn live_ids(&self) -> Vec<CouponId> {
            self.state.lock().unwrap().live.keys().copied().collect()
        }

        pub fn live_link_count(&self, coupon_id: CouponId) -> usize {
            self.state
                .lock()
                .unwrap()
                .live_links
                .iter()
                .filter(|(_, _, c)| *c == coupon_id)
                .count()
        }

        pub fn archived(&self) -> Vec<ArchivedCoupon> {
            self.state.lock().unwrap().archive.clone()
        }

        pub fn archived_links(&self, kind: OwnerKind, archive_id: CouponId) -> Vec<OwnerId> {
            let mut owners: Vec<OwnerId> = self
                .state
                .lock()
                .unwrap()
                .archive_links
                .iter()
                .filter(|l| l.kind == kind && l.coupon_id == archive_id)
                .map(|l| l.owner_id)
                .collect();
            owners.sort_unstable();
            owners
        }
    }

    #[async_trait]
    impl CouponRepository for InMemoryCouponRepository {
        async fn list_live(&self) -> StoreResult<Vec<Coupon>> {
            let state = self.state.lock().unwrap();
            if state.fail_listing {
                return Err(classify("SELECT * FROM coupon", "disk I/O error"));
            }
            Ok(state.live.values().cloned().collect())
        }

        async fn insert_archived(&self, coupon: &Coupon) -> StoreResult<CouponId> {
            let mut state = self.state.lock().unwrap();
            if state.archive.iter().any(|a| a.old_id == coupon.id) {
                return Err(classify(
                    "INSERT INTO archive_coupon",
                    "UNIQUE constraint failed: archive_coupon.old_id",
                ));
            }
            // archive keys start far from live keys to keep the spaces visibly apart
            state.next_archive_id += 1;
            let id = 1000 + state.next_archive_id;
            state.archive.push(ArchivedCoupon {
                id,
                old_id: coupon.id,
                title: coupon.title.clone(),
                message: coupon.message.clone(),
                image: coupon.image.clone(),
                start_date: coupon.start_date,
                end_date: coupon.end_date,
                amount: coupon.amount,
                coupon_type: coupon.coupon_type,
                price: coupon.price,
            });
            Ok(id)
        }

        async fn live_owners(
            &self,
            kind: OwnerKind,
            coupon_id: CouponId,
        ) -> StoreResult<Vec<OwnerId>> {
            let state = self.state.lock().unwrap();
            if state.fail_owner_listing {
                return Err(StoreError::Unclassified {
                    query: "SELECT owner links".to_string(),
                    diagnostic: "database is locked".to_string(),
                });
            }
            Ok(state
                .live_links
                .iter()
                .filter(|(k, _, c)| *k == kind && *c == coupon_id)
                .map(|(_, o, _)| *o)
                .collect())
        }

        async fn insert_archived_owner(
            &self,
            kind: OwnerKind,
            owner_id: OwnerId,
            archive_id: CouponId,
        ) -> StoreResult<()> {
            let mut state = self.state.lock().unwrap();
            if state.failing_owners.contains(&(kind, owner_id)) {
                let key = match kind {
                    OwnerKind::Company => ConstraintKey::ArchiveCompany,
                    OwnerKind::Customer => ConstraintKey::ArchiveCustomer,
                };
                return Err(classify(
                    "INSERT INTO archive link",
                    &format!("a foreign key constraint fails (CONSTRAINT `{}`)", key),
                ));
            }
            let link = Ownership::new(kind, owner_id, archive_id);
            if !state.archive_links.insert(link) {
                return Err(classify("INSERT INTO archive link", "Duplicate entry"));
            }
            Ok(())
        }

        async fn delete_live(&self, coupon_id: CouponId) -> StoreResult<u64> {
            let mut state = self.state.lock().unwrap();
            let removed = state.live.remove(&coupon_id).is_some();
            state.live_links.retain(|(_, _, c)| *c != coupon_id);
            Ok(u64::from(removed))
        }
    }
}
