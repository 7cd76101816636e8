// Archival Pipeline
// Moves expired coupons, with their ownership links, from the live tables to the archive

pub mod constants;
mod scheduler;

pub use scheduler::{ArchivalConfig, ArchivalHandle, ArchivalScheduler};

use crate::domain::{Coupon, CouponId, OwnerKind};
use crate::error::Result;
use crate::port::{CouponRepository, StoreResult, TimeProvider};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Where the pipeline is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivalState {
    /// Waiting for the next cycle
    Idle,
    /// Loading live coupons
    Scanning,
    /// Evaluating and migrating coupons one by one
    Migrating,
    /// Shut down; no further cycles
    Stopped,
}

impl std::fmt::Display for ArchivalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchivalState::Idle => write!(f, "IDLE"),
            ArchivalState::Scanning => write!(f, "SCANNING"),
            ArchivalState::Migrating => write!(f, "MIGRATING"),
            ArchivalState::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// What one coupon migration did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub archive_id: CouponId,
    pub customer_links: usize,
    pub company_links: usize,
    pub relation_failures: usize,
    /// False when the live row was already gone or the delete failed
    pub deleted: bool,
}

/// Result of migrating one coupon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    Archived(MigrationReport),
    /// The archive already holds this coupon; nothing was touched
    AlreadyArchived,
}

/// Counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub expired: usize,
    pub archived: usize,
    pub already_archived: usize,
    pub failed: usize,
    pub relation_failures: usize,
    pub delete_anomalies: usize,
}

/// Archival pipeline
///
/// Migration is best-effort per coupon: a failed link or delete is logged
/// and the remaining steps still run. Nothing is rolled back.
pub struct ArchivalPipeline {
    repo: Arc<dyn CouponRepository>,
    time_provider: Arc<dyn TimeProvider>,
    state: watch::Sender<ArchivalState>,
}

impl ArchivalPipeline {
    pub fn new(repo: Arc<dyn CouponRepository>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let (state, _) = watch::channel(ArchivalState::Idle);
        Self {
            repo,
            time_provider,
            state,
        }
    }

    /// Current state
    pub fn state(&self) -> ArchivalState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ArchivalState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, state: ArchivalState) {
        self.state.send_replace(state);
    }

    /// Run one scan-and-migrate cycle
    ///
    /// Fails only when the live coupons cannot be listed; per-coupon
    /// failures are logged and counted in the report.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.set_state(ArchivalState::Scanning);

        let coupons = match self.repo.list_live().await {
            Ok(coupons) => coupons,
            Err(e) => {
                self.set_state(ArchivalState::Idle);
                return Err(e.escalate("Couldn't load coupons for archival"));
            }
        };

        self.set_state(ArchivalState::Migrating);
        let today = self.time_provider.today();
        let mut report = CycleReport::default();

        for coupon in &coupons {
            report.scanned += 1;

            if !coupon.is_expired(today) {
                debug!(coupon_id = coupon.id, end_date = %coupon.end_date, "Coupon not expired, skipping");
                continue;
            }
            report.expired += 1;

            match self.migrate(coupon).await {
                Ok(MigrationOutcome::Archived(migration)) => {
                    report.archived += 1;
                    report.relation_failures += migration.relation_failures;
                    if !migration.deleted {
                        report.delete_anomalies += 1;
                    }
                }
                Ok(MigrationOutcome::AlreadyArchived) => report.already_archived += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        coupon_id = coupon.id,
                        classification = e.classification(),
                        details = %e.details(),
                        "Unable to archive expired coupon"
                    );
                }
            }
        }

        self.set_state(ArchivalState::Idle);
        Ok(report)
    }

    /// Migrate one coupon into the archive
    ///
    /// A duplicate archive row means an earlier run already migrated this
    /// coupon, so the whole migration is skipped.
    pub async fn migrate(&self, coupon: &Coupon) -> StoreResult<MigrationOutcome> {
        // 1. Archive copy with a fresh identity
        let archive_id = match self.repo.insert_archived(coupon).await {
            Ok(id) => id,
            Err(e) if e.is_duplicate_key() => {
                info!(coupon_id = coupon.id, "Coupon already archived, skipping");
                return Ok(MigrationOutcome::AlreadyArchived);
            }
            Err(e) => return Err(e),
        };

        let mut migration = MigrationReport {
            archive_id,
            customer_links: 0,
            company_links: 0,
            relation_failures: 0,
            deleted: false,
        };

        // 2. + 3. Ownership links, re-keyed to the archive identity
        let (copied, failed) = self
            .archive_links(OwnerKind::Customer, coupon.id, archive_id)
            .await;
        migration.customer_links = copied;
        migration.relation_failures += failed;

        let (copied, failed) = self
            .archive_links(OwnerKind::Company, coupon.id, archive_id)
            .await;
        migration.company_links = copied;
        migration.relation_failures += failed;

        // 4. Drop the live row
        match self.repo.delete_live(coupon.id).await {
            Ok(0) => warn!(
                coupon_id = coupon.id,
                "Archived coupon was already deleted from the live table"
            ),
            Ok(_) => migration.deleted = true,
            Err(e) => error!(
                coupon_id = coupon.id,
                details = %e.details(),
                "Couldn't delete archived coupon from the live table"
            ),
        }

        info!(
            coupon_id = coupon.id,
            archive_id = archive_id,
            customer_links = migration.customer_links,
            company_links = migration.company_links,
            relation_failures = migration.relation_failures,
            deleted = migration.deleted,
            "Coupon archived"
        );

        Ok(MigrationOutcome::Archived(migration))
    }

    /// Copy every live link of `kind` onto the archived coupon
    ///
    /// # Returns
    /// (links copied, links that failed)
    async fn archive_links(
        &self,
        kind: OwnerKind,
        coupon_id: CouponId,
        archive_id: CouponId,
    ) -> (usize, usize) {
        let owners = match self.repo.live_owners(kind, coupon_id).await {
            Ok(owners) => owners,
            Err(e) => {
                warn!(
                    coupon_id = coupon_id,
                    kind = %kind,
                    details = %e.details(),
                    "Couldn't read ownership links for archival"
                );
                return (0, 1);
            }
        };

        let mut copied = 0;
        let mut failed = 0;
        for owner_id in owners {
            match self
                .repo
                .insert_archived_owner(kind, owner_id, archive_id)
                .await
            {
                Ok(()) => copied += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        coupon_id = coupon_id,
                        archive_id = archive_id,
                        owner_id = owner_id,
                        kind = %kind,
                        classification = e.classification(),
                        details = %e.details(),
                        "Couldn't archive ownership link"
                    );
                }
            }
        }

        (copied, failed)
    }
}
