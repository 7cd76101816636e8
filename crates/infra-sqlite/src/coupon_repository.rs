// SQLite CouponRepository Implementation

use crate::record_store::{map_sqlx_error, RecordStore, Rows, SqlValue};
use crate::sql_args;
use async_trait::async_trait;
use couponsys_core::domain::{ArchivedCoupon, Coupon, CouponId, CouponType, OwnerId, OwnerKind};
use couponsys_core::error::Result;
use couponsys_core::port::{CouponRepository, StoreError, StoreResult};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, info};

const COUPON_COLUMNS: &str = "title, start_date, end_date, amount, type, message, price, image";

/// Filter for archived coupon listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveFilter {
    pub coupon_type: Option<CouponType>,
    pub max_price: Option<f64>,
}

/// Link table and owner column for an ownership kind
fn link_table(kind: OwnerKind, archived: bool) -> (&'static str, &'static str) {
    match (kind, archived) {
        (OwnerKind::Company, false) => ("company_coupon", "comp_id"),
        (OwnerKind::Customer, false) => ("customer_coupon", "cust_id"),
        (OwnerKind::Company, true) => ("archive_company_coupon", "comp_id"),
        (OwnerKind::Customer, true) => ("archive_customer_coupon", "cust_id"),
    }
}

fn coupon_args(coupon: &Coupon) -> Vec<SqlValue> {
    sql_args![
        coupon.title.as_str(),
        coupon.start_date,
        coupon.end_date,
        coupon.amount,
        coupon.coupon_type.as_str(),
        coupon.message.as_str(),
        coupon.price,
        coupon.image.as_str(),
    ]
}

/// Decode the shared coupon columns; `id` is whatever the row's `id` column holds
fn decode_coupon(row: &SqliteRow, query: &str) -> StoreResult<Coupon> {
    let get_err = |e: sqlx::Error| map_sqlx_error(query, e);

    let id: i64 = row.try_get("id").map_err(get_err)?;
    let amount: i64 = row.try_get("amount").map_err(get_err)?;
    let amount = u32::try_from(amount).map_err(|_| StoreError::Unclassified {
        query: query.to_string(),
        diagnostic: format!("coupon {} has an out-of-range amount {}", id, amount),
    })?;

    let type_text: String = row.try_get("type").map_err(get_err)?;
    if CouponType::is_unrecognized(&type_text) {
        info!(coupon_id = id, coupon_type = %type_text, "NOTE: Unknown Coupon type.");
    }

    Ok(Coupon {
        id,
        title: row.try_get("title").map_err(get_err)?,
        message: row.try_get("message").map_err(get_err)?,
        image: row.try_get("image").map_err(get_err)?,
        start_date: row.try_get("start_date").map_err(get_err)?,
        end_date: row.try_get("end_date").map_err(get_err)?,
        amount,
        coupon_type: CouponType::parse_lenient(&type_text),
        price: row.try_get("price").map_err(get_err)?,
    })
}

fn decode_archived(row: &SqliteRow, query: &str) -> StoreResult<ArchivedCoupon> {
    let coupon = decode_coupon(row, query)?;
    let old_id: i64 = row
        .try_get("old_id")
        .map_err(|e| map_sqlx_error(query, e))?;

    Ok(ArchivedCoupon {
        id: coupon.id,
        old_id,
        title: coupon.title,
        message: coupon.message,
        image: coupon.image,
        start_date: coupon.start_date,
        end_date: coupon.end_date,
        amount: coupon.amount,
        coupon_type: coupon.coupon_type,
        price: coupon.price,
    })
}

fn decode_ids(rows: Rows, query: &str) -> StoreResult<Vec<i64>> {
    rows.iter()
        .map(|row| row.try_get::<i64, _>(0).map_err(|e| map_sqlx_error(query, e)))
        .collect()
}

/// DAO-style outcome: duplicate and foreign-key failures mean "could not complete"
fn outcome(result: StoreResult<u64>, message: &str) -> Result<bool> {
    match result {
        Ok(affected) => Ok(affected > 0),
        Err(e) if e.is_business_outcome() => {
            debug!(details = %e.details(), "{}", message);
            Ok(false)
        }
        Err(e) => Err(e.escalate(message)),
    }
}

pub struct SqliteCouponRepository {
    store: RecordStore,
}

impl SqliteCouponRepository {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub async fn create_company(
        &self,
        id: OwnerId,
        name: &str,
        password: &str,
        email: &str,
    ) -> Result<bool> {
        let result = self
            .store
            .execute(
                "INSERT INTO company (id, comp_name, password, email) VALUES (?, ?, ?, ?)",
                &sql_args![id, name, password, email],
            )
            .await;
        outcome(result, "Couldn't create Company.")
    }

    pub async fn create_customer(&self, id: OwnerId, name: &str, password: &str) -> Result<bool> {
        let result = self
            .store
            .execute(
                "INSERT INTO customer (id, cust_name, password) VALUES (?, ?, ?)",
                &sql_args![id, name, password],
            )
            .await;
        outcome(result, "Couldn't create Customer.")
    }

    /// Insert a live coupon; false when the id is taken
    pub async fn create_coupon(&self, coupon: &Coupon) -> Result<bool> {
        let query = format!(
            "INSERT INTO coupon (id, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            COUPON_COLUMNS
        );
        let mut args = sql_args![coupon.id];
        args.extend(coupon_args(coupon));

        let result = self.store.execute(&query, &args).await;
        outcome(result, "Couldn't create Coupon.")
    }

    pub async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let query = "SELECT * FROM coupon WHERE id = ?";
        let rows = self
            .store
            .query_rows(query, &sql_args![id])
            .await
            .map_err(|e| e.escalate("Couldn't load Coupon."))?;

        rows.first()
            .map(|row| decode_coupon(row, query))
            .transpose()
            .map_err(|e| e.escalate("Couldn't load Coupon."))
    }

    pub async fn coupon_exists(&self, id: CouponId) -> Result<bool> {
        let rows = self
            .store
            .query_rows("SELECT 1 FROM coupon WHERE id = ?", &sql_args![id])
            .await
            .map_err(|e| e.escalate("Couldn't check Coupon."))?;
        Ok(!rows.is_empty())
    }

    /// Delete a live coupon and its links; false when nothing was deleted
    pub async fn remove_coupon(&self, id: CouponId) -> Result<bool> {
        let result = self
            .store
            .execute("DELETE FROM coupon WHERE id = ?", &sql_args![id])
            .await;
        outcome(result, "Couldn't remove Coupon.")
    }

    /// Link an owner to a live coupon; false when already linked or either side is missing
    pub async fn add_owner(
        &self,
        kind: OwnerKind,
        owner_id: OwnerId,
        coupon_id: CouponId,
    ) -> Result<bool> {
        let (table, owner_col) = link_table(kind, false);
        let query = format!(
            "INSERT INTO {} ({}, coupon_id) VALUES (?, ?)",
            table, owner_col
        );
        let result = self
            .store
            .execute(&query, &sql_args![owner_id, coupon_id])
            .await;
        outcome(result, "Couldn't add coupon owner.")
    }

    pub async fn remove_owner(
        &self,
        kind: OwnerKind,
        owner_id: OwnerId,
        coupon_id: CouponId,
    ) -> Result<bool> {
        let (table, owner_col) = link_table(kind, false);
        let query = format!(
            "DELETE FROM {} WHERE {} = ? AND coupon_id = ?",
            table, owner_col
        );
        let result = self
            .store
            .execute(&query, &sql_args![owner_id, coupon_id])
            .await;
        outcome(result, "Couldn't remove coupon owner.")
    }

    pub async fn owns(&self, kind: OwnerKind, owner_id: OwnerId, coupon_id: CouponId) -> Result<bool> {
        let (table, owner_col) = link_table(kind, false);
        let query = format!(
            "SELECT 1 FROM {} WHERE {} = ? AND coupon_id = ?",
            table, owner_col
        );
        let rows = self
            .store
            .query_rows(&query, &sql_args![owner_id, coupon_id])
            .await
            .map_err(|e| e.escalate("Couldn't check coupon ownership."))?;
        Ok(!rows.is_empty())
    }

    /// Archived coupon by its archive identity
    pub async fn get_archived_coupon(&self, archive_id: CouponId) -> Result<Option<ArchivedCoupon>> {
        self.find_archived("SELECT * FROM archive_coupon WHERE id = ?", archive_id)
            .await
    }

    /// Archived coupon by the live identity it was migrated from
    pub async fn find_archived_by_old_id(&self, old_id: CouponId) -> Result<Option<ArchivedCoupon>> {
        self.find_archived("SELECT * FROM archive_coupon WHERE old_id = ?", old_id)
            .await
    }

    async fn find_archived(&self, query: &str, key: i64) -> Result<Option<ArchivedCoupon>> {
        let rows = self
            .store
            .query_rows(query, &sql_args![key])
            .await
            .map_err(|e| e.escalate("Couldn't load archived Coupon."))?;

        rows.first()
            .map(|row| decode_archived(row, query))
            .transpose()
            .map_err(|e| e.escalate("Couldn't load archived Coupon."))
    }

    pub async fn list_archived_coupons(&self, filter: &ArchiveFilter) -> Result<Vec<ArchivedCoupon>> {
        let mut query = String::from("SELECT * FROM archive_coupon WHERE 1 = 1");
        let mut args = Vec::new();
        if let Some(coupon_type) = filter.coupon_type {
            query.push_str(" AND type = ?");
            args.push(SqlValue::from(coupon_type.as_str()));
        }
        if let Some(max_price) = filter.max_price {
            query.push_str(" AND price <= ?");
            args.push(SqlValue::from(max_price));
        }
        query.push_str(" ORDER BY id");

        let rows = self
            .store
            .query_rows(&query, &args)
            .await
            .map_err(|e| e.escalate("Couldn't list archived Coupons."))?;

        rows.iter()
            .map(|row| decode_archived(row, &query))
            .collect::<StoreResult<Vec<_>>>()
            .map_err(|e| e.escalate("Couldn't list archived Coupons."))
    }

    pub async fn archived_owners(&self, kind: OwnerKind, archive_id: CouponId) -> Result<Vec<OwnerId>> {
        let (table, owner_col) = link_table(kind, true);
        let query = format!(
            "SELECT {} FROM {} WHERE coupon_id = ? ORDER BY {}",
            owner_col, table, owner_col
        );
        let rows = self
            .store
            .query_rows(&query, &sql_args![archive_id])
            .await
            .map_err(|e| e.escalate("Couldn't load archived coupon owners."))?;

        decode_ids(rows, &query).map_err(|e| e.escalate("Couldn't load archived coupon owners."))
    }
}

#[async_trait]
impl CouponRepository for SqliteCouponRepository {
    async fn list_live(&self) -> StoreResult<Vec<Coupon>> {
        let query = "SELECT * FROM coupon ORDER BY id";
        let rows = self.store.query_rows(query, &[]).await?;
        rows.iter().map(|row| decode_coupon(row, query)).collect()
    }

    async fn insert_archived(&self, coupon: &Coupon) -> StoreResult<CouponId> {
        let query = format!(
            "INSERT INTO archive_coupon (old_id, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            COUPON_COLUMNS
        );
        let mut args = sql_args![coupon.id];
        args.extend(coupon_args(coupon));

        self.store.insert_returning_key(&query, &args).await
    }

    async fn live_owners(&self, kind: OwnerKind, coupon_id: CouponId) -> StoreResult<Vec<OwnerId>> {
        let (table, owner_col) = link_table(kind, false);
        let query = format!(
            "SELECT {} FROM {} WHERE coupon_id = ? ORDER BY {}",
            owner_col, table, owner_col
        );
        let rows = self.store.query_rows(&query, &sql_args![coupon_id]).await?;
        decode_ids(rows, &query)
    }

    async fn insert_archived_owner(
        &self,
        kind: OwnerKind,
        owner_id: OwnerId,
        archive_id: CouponId,
    ) -> StoreResult<()> {
        let (table, owner_col) = link_table(kind, true);
        let query = format!(
            "INSERT INTO {} ({}, coupon_id) VALUES (?, ?)",
            table, owner_col
        );
        self.store
            .execute(&query, &sql_args![owner_id, archive_id])
            .await?;
        Ok(())
    }

    async fn delete_live(&self, coupon_id: CouponId) -> StoreResult<u64> {
        self.store
            .execute("DELETE FROM coupon WHERE id = ?", &sql_args![coupon_id])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{run_migrations, ConnectionPool, StoreConfig};
    use chrono::NaiveDate;
    use couponsys_core::AppError;

    async fn setup() -> SqliteCouponRepository {
        let options = StoreConfig::default().connect_options().unwrap();
        let pool = ConnectionPool::connect(&options, 2).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let repo = SqliteCouponRepository::new(RecordStore::new(pool));
        assert!(repo.create_company(1, "Acme", "pw", "acme@example.com").await.unwrap());
        assert!(repo.create_customer(10, "dana", "pw").await.unwrap());
        repo
    }

    fn end_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_coupon() {
        let repo = setup().await;
        let coupon = Coupon::new_test(5, end_date());

        assert!(repo.create_coupon(&coupon).await.unwrap());
        assert!(repo.coupon_exists(5).await.unwrap());
        assert_eq!(repo.get_coupon(5).await.unwrap(), Some(coupon));
        assert_eq!(repo.get_coupon(6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_records_report_false() {
        let repo = setup().await;
        let coupon = Coupon::new_test(5, end_date());
        assert!(repo.create_coupon(&coupon).await.unwrap());

        assert!(!repo.create_coupon(&coupon).await.unwrap());
        assert!(!repo.create_company(2, "Acme", "pw", "other@example.com").await.unwrap());
        assert!(!repo.create_customer(10, "someone", "pw").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_owner_outcomes() {
        let repo = setup().await;
        repo.create_coupon(&Coupon::new_test(5, end_date()))
            .await
            .unwrap();

        assert!(repo.add_owner(OwnerKind::Customer, 10, 5).await.unwrap());
        assert!(repo.owns(OwnerKind::Customer, 10, 5).await.unwrap());
        // already linked
        assert!(!repo.add_owner(OwnerKind::Customer, 10, 5).await.unwrap());
        // no such customer / coupon
        assert!(!repo.add_owner(OwnerKind::Customer, 99, 5).await.unwrap());
        assert!(!repo.add_owner(OwnerKind::Company, 1, 77).await.unwrap());

        assert!(repo.remove_owner(OwnerKind::Customer, 10, 5).await.unwrap());
        assert!(!repo.remove_owner(OwnerKind::Customer, 10, 5).await.unwrap());
        assert!(!repo.owns(OwnerKind::Customer, 10, 5).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_coupon_cascades_links() {
        let repo = setup().await;
        repo.create_coupon(&Coupon::new_test(5, end_date()))
            .await
            .unwrap();
        repo.add_owner(OwnerKind::Company, 1, 5).await.unwrap();
        repo.add_owner(OwnerKind::Customer, 10, 5).await.unwrap();

        assert!(repo.remove_coupon(5).await.unwrap());

        assert!(!repo.remove_coupon(5).await.unwrap());
        assert!(repo.live_owners(OwnerKind::Company, 5).await.unwrap().is_empty());
        assert!(repo.live_owners(OwnerKind::Customer, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_archived_rekeys_and_rejects_repeat() {
        let repo = setup().await;
        let coupon = Coupon::new_test(5, end_date());

        let archive_id = repo.insert_archived(&coupon).await.unwrap();
        let again = repo.insert_archived(&coupon).await.unwrap_err();

        assert!(again.is_duplicate_key());
        let archived = repo.get_archived_coupon(archive_id).await.unwrap().unwrap();
        assert_eq!(archived.old_id, 5);
        assert_eq!(archived.to_original(), coupon);
        assert_eq!(
            repo.find_archived_by_old_id(5).await.unwrap(),
            Some(archived)
        );
    }

    #[tokio::test]
    async fn test_archived_owner_needs_existing_owner() {
        let repo = setup().await;
        let archive_id = repo
            .insert_archived(&Coupon::new_test(5, end_date()))
            .await
            .unwrap();

        repo.insert_archived_owner(OwnerKind::Customer, 10, archive_id)
            .await
            .unwrap();
        let err = repo
            .insert_archived_owner(OwnerKind::Customer, 404, archive_id)
            .await
            .unwrap_err();

        assert!(err.is_foreign_key());
        assert_eq!(
            repo.archived_owners(OwnerKind::Customer, archive_id)
                .await
                .unwrap(),
            vec![10]
        );
    }

    #[tokio::test]
    async fn test_list_archived_coupons_filters() {
        let repo = setup().await;
        let mut cheap = Coupon::new_test(1, end_date());
        cheap.price = 5.0;
        let mut pricey = Coupon::new_test(2, end_date());
        pricey.price = 50.0;
        let mut hotel = Coupon::new_test(3, end_date());
        hotel.coupon_type = CouponType::Hotels;
        hotel.price = 20.0;
        for coupon in [&cheap, &pricey, &hotel] {
            repo.insert_archived(coupon).await.unwrap();
        }

        let all = repo
            .list_archived_coupons(&ArchiveFilter::default())
            .await
            .unwrap();
        let food_under_30 = repo
            .list_archived_coupons(&ArchiveFilter {
                coupon_type: Some(CouponType::Food),
                max_price: Some(30.0),
            })
            .await
            .unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(food_under_30.len(), 1);
        assert_eq!(food_under_30[0].old_id, 1);
    }

    #[tokio::test]
    async fn test_unknown_stored_type_reads_as_unspecified() {
        let repo = setup().await;
        repo.create_coupon(&Coupon::new_test(5, end_date()))
            .await
            .unwrap();
        repo.store()
            .execute("UPDATE coupon SET type = 'SPACESHIPS' WHERE id = 5", &[])
            .await
            .unwrap();

        let coupon = repo.get_coupon(5).await.unwrap().unwrap();

        assert_eq!(coupon.coupon_type, CouponType::Unspecified);
    }

    #[tokio::test]
    async fn test_unexpected_failure_escalates() {
        let repo = setup().await;
        repo.store()
            .execute("DROP TABLE customer_coupon", &[])
            .await
            .unwrap();

        let err = repo
            .add_owner(OwnerKind::Customer, 10, 5)
            .await
            .unwrap_err();

        match err {
            AppError::Unexpected { message, details } => {
                assert_eq!(message, "Couldn't add coupon owner.");
                assert!(details.contains("customer_coupon"));
            }
            other => panic!("expected Unexpected, got {:?}", other),
        }
    }
}
