//! PostgreSQL store on diesel-async with a deadpool connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use triage_core::Report;

use super::{CandidateOrder, TriageStore};
use crate::error::{Result, TriageError};
use crate::events::MembershipChange;
use crate::models::bucket::{Bucket, BucketChanges, NewBucket};
use crate::models::bug::{Bug, BugProvider, NewBug, NewBugProvider};
use crate::models::entry::{
    App, BreakageCategory, NewApp, NewReportEntry, OperatingSystem, ReportEntry, StoredEntry,
};
use crate::models::hit::{hit_adjustments, truncate_to_hour, BucketHit, HitAdjustment};
use crate::schema::{
    apps, breakage_categories, bucket_hits, buckets, bug_providers, bugs, operating_systems,
    report_entries,
};

pub type PgPool = Pool<AsyncPgConnection>;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect(database_url: &str, max_size: usize) -> Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| TriageError::Pool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn conn(&self) -> Result<Object<AsyncPgConnection>> {
        self.pool
            .get()
            .await
            .map_err(|e| TriageError::Pool(format!("diesel pool: {e}")))
    }

    /// Create the triage tables if missing.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        crate::migration::run_migration(&mut conn).await
    }
}

// ── Queries ──

async fn apply_hit(conn: &mut AsyncPgConnection, adjustment: HitAdjustment) -> Result<()> {
    match adjustment {
        HitAdjustment::Increment { bucket_id, begin_at } => {
            diesel::insert_into(bucket_hits::table)
                .values((
                    bucket_hits::bucket_id.eq(bucket_id),
                    bucket_hits::begin_at.eq(begin_at),
                    bucket_hits::count.eq(1),
                ))
                .on_conflict((bucket_hits::bucket_id, bucket_hits::begin_at))
                .do_update()
                .set(bucket_hits::count.eq(bucket_hits::count + 1))
                .execute(conn)
                .await?;
            crate::metrics::bucket_hit_changed("increment");
        }
        HitAdjustment::Decrement { bucket_id, begin_at } => {
            let updated = diesel::update(
                bucket_hits::table
                    .filter(bucket_hits::bucket_id.eq(bucket_id))
                    .filter(bucket_hits::begin_at.eq(begin_at))
                    .filter(bucket_hits::count.gt(0)),
            )
            .set(bucket_hits::count.eq(bucket_hits::count - 1))
            .execute(conn)
            .await?;
            if updated > 0 {
                crate::metrics::bucket_hit_changed("decrement");
            }
        }
    }
    Ok(())
}

async fn apply_hit_atomically(conn: &mut AsyncPgConnection, adjustment: HitAdjustment) -> Result<()> {
    conn.transaction::<_, TriageError, _>(|conn| {
        async move { apply_hit(conn, adjustment).await }.scope_boxed()
    })
    .await
}

async fn get_or_create_app(conn: &mut AsyncPgConnection, report: &Report) -> Result<i64> {
    diesel::insert_into(apps::table)
        .values(NewApp {
            channel: report.app_channel.as_deref(),
            name: &report.app_name,
            version: &report.app_version,
        })
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;

    let mut query = apps::table
        .filter(apps::name.eq(&report.app_name))
        .filter(apps::version.eq(&report.app_version))
        .select(apps::id)
        .into_boxed();
    query = match &report.app_channel {
        Some(channel) => query.filter(apps::channel.eq(channel)),
        None => query.filter(apps::channel.is_null()),
    };
    Ok(query.first(conn).await?)
}

async fn get_or_create_category(conn: &mut AsyncPgConnection, value: &str) -> Result<i64> {
    diesel::insert_into(breakage_categories::table)
        .values(breakage_categories::value.eq(value))
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;
    Ok(breakage_categories::table
        .filter(breakage_categories::value.eq(value))
        .select(breakage_categories::id)
        .first(conn)
        .await?)
}

async fn get_or_create_os(conn: &mut AsyncPgConnection, name: &str) -> Result<i64> {
    diesel::insert_into(operating_systems::table)
        .values(operating_systems::name.eq(name))
        .on_conflict_do_nothing()
        .execute(conn)
        .await?;
    Ok(operating_systems::table
        .filter(operating_systems::name.eq(name))
        .select(operating_systems::id)
        .first(conn)
        .await?)
}

async fn insert_entry(
    conn: &mut AsyncPgConnection,
    report: &Report,
    bucket_id: Option<i64>,
) -> Result<i64> {
    let app_id = get_or_create_app(conn, report).await?;
    let category_id = match &report.breakage_category {
        Some(value) => Some(get_or_create_category(conn, value).await?),
        None => None,
    };
    let os_id = get_or_create_os(conn, &report.os).await?;

    let new_entry = NewReportEntry::from_report(report, app_id, category_id, os_id, bucket_id);
    let entry_id: i64 = diesel::insert_into(report_entries::table)
        .values(&new_entry)
        .returning(report_entries::id)
        .get_result(conn)
        .await
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                TriageError::DuplicateReport(report.uuid)
            }
            other => TriageError::Database(other),
        })?;

    for adjustment in hit_adjustments(None, bucket_id, report.reported_at) {
        apply_hit(conn, adjustment).await?;
    }
    Ok(entry_id)
}

async fn load_entries(conn: &mut AsyncPgConnection, entry_ids: &[i64]) -> Result<Vec<StoredEntry>> {
    let rows: Vec<(ReportEntry, App, OperatingSystem, Option<BreakageCategory>)> =
        report_entries::table
            .inner_join(apps::table)
            .inner_join(operating_systems::table)
            .left_join(breakage_categories::table)
            .filter(report_entries::id.eq_any(entry_ids))
            .order(report_entries::id.asc())
            .select((
                ReportEntry::as_select(),
                App::as_select(),
                OperatingSystem::as_select(),
                Option::<BreakageCategory>::as_select(),
            ))
            .load(conn)
            .await?;

    rows.into_iter()
        .map(|(entry, app, os, category)| {
            let report = entry.to_report(&app, &os, category.as_ref())?;
            Ok(StoredEntry {
                id: entry.id,
                bucket_id: entry.bucket_id,
                report,
            })
        })
        .collect()
}

async fn set_membership(
    conn: &mut AsyncPgConnection,
    entry_ids: &[i64],
    target: Option<i64>,
) -> Result<Vec<MembershipChange>> {
    // Pre-update state, locked until the membership write below.
    let rows: Vec<(i64, Option<i64>, DateTime<Utc>)> = report_entries::table
        .filter(report_entries::id.eq_any(entry_ids))
        .order(report_entries::id.asc())
        .select((
            report_entries::id,
            report_entries::bucket_id,
            report_entries::reported_at,
        ))
        .for_update()
        .load(conn)
        .await?;

    let mut changes = Vec::with_capacity(rows.len());
    for (entry_id, previous, reported_at) in rows {
        for adjustment in hit_adjustments(previous, target, reported_at) {
            apply_hit(conn, adjustment).await?;
        }
        changes.push(MembershipChange {
            entry_id,
            previous,
            current: target,
            reported_at,
        });
    }

    diesel::update(report_entries::table.filter(report_entries::id.eq_any(entry_ids)))
        .set(report_entries::bucket_id.eq(target))
        .execute(conn)
        .await?;
    Ok(changes)
}

async fn delete_entry(
    conn: &mut AsyncPgConnection,
    entry_id: i64,
) -> Result<Option<MembershipChange>> {
    let row: Option<(Option<i64>, DateTime<Utc>)> = report_entries::table
        .find(entry_id)
        .select((report_entries::bucket_id, report_entries::reported_at))
        .for_update()
        .first(conn)
        .await
        .optional()?;
    let Some((previous, reported_at)) = row else {
        return Ok(None);
    };

    for adjustment in hit_adjustments(previous, None, reported_at) {
        apply_hit(conn, adjustment).await?;
    }
    diesel::delete(report_entries::table.find(entry_id))
        .execute(conn)
        .await?;
    Ok(Some(MembershipChange {
        entry_id,
        previous,
        current: None,
        reported_at,
    }))
}

#[async_trait]
impl TriageStore for PgStore {
    async fn create_bucket(&self, new_bucket: NewBucket) -> Result<Bucket> {
        let mut conn = self.conn().await?;
        let bucket = diesel::insert_into(buckets::table)
            .values(&new_bucket)
            .returning(Bucket::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(bucket)
    }

    async fn get_bucket(&self, bucket_id: i64) -> Result<Option<Bucket>> {
        let mut conn = self.conn().await?;
        let bucket = buckets::table
            .find(bucket_id)
            .select(Bucket::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(bucket)
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let mut conn = self.conn().await?;
        let results = buckets::table
            .order(buckets::id.asc())
            .select(Bucket::as_select())
            .load(&mut conn)
            .await?;
        Ok(results)
    }

    async fn bucket_ids_for_domain(&self, domain: &str) -> Result<Vec<i64>> {
        let mut conn = self.conn().await?;
        let ids = buckets::table
            .filter(buckets::domain.eq(domain))
            .select(buckets::id)
            .load(&mut conn)
            .await?;
        Ok(ids)
    }

    async fn update_bucket(&self, bucket_id: i64, changes: BucketChanges) -> Result<Bucket> {
        let mut conn = self.conn().await?;
        diesel::update(buckets::table.find(bucket_id))
            .set(&changes)
            .returning(Bucket::as_returning())
            .get_result(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| TriageError::NotFound(format!("bucket {bucket_id}")))
    }

    async fn delete_bucket(&self, bucket_id: i64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted = diesel::delete(buckets::table.find(bucket_id))
            .execute(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn try_begin_reassign(&self, bucket_id: i64) -> Result<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            buckets::table
                .find(bucket_id)
                .filter(buckets::reassign_in_progress.eq(false)),
        )
        .set(buckets::reassign_in_progress.eq(true))
        .execute(&mut conn)
        .await?;
        if updated > 0 {
            return Ok(true);
        }

        let exists: i64 = buckets::table
            .find(bucket_id)
            .count()
            .get_result(&mut conn)
            .await?;
        if exists == 0 {
            return Err(TriageError::NotFound(format!("bucket {bucket_id}")));
        }
        Ok(false)
    }

    async fn finish_reassign(&self, bucket_id: i64) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::update(buckets::table.find(bucket_id))
            .set(buckets::reassign_in_progress.eq(false))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn insert_entry(&self, report: &Report, bucket_id: Option<i64>) -> Result<i64> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, TriageError, _>(|conn| {
            async move { insert_entry(conn, report, bucket_id).await }.scope_boxed()
        })
        .await
    }

    async fn get_entry(&self, entry_id: i64) -> Result<Option<StoredEntry>> {
        let mut conn = self.conn().await?;
        Ok(load_entries(&mut conn, &[entry_id]).await?.into_iter().next())
    }

    async fn load_entries(&self, entry_ids: &[i64]) -> Result<Vec<StoredEntry>> {
        let mut conn = self.conn().await?;
        load_entries(&mut conn, entry_ids).await
    }

    async fn candidate_ids(
        &self,
        bucket: &Bucket,
        order: CandidateOrder,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Vec<i64>> {
        let offset = i64::try_from(offset)
            .map_err(|_| TriageError::InvalidPagination("offset out of range"))?;
        // A limit past i64::MAX caps nothing.
        let limit = limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut conn = self.conn().await?;
        let eligible_buckets = buckets::table
            .filter(
                buckets::priority
                    .lt(bucket.priority)
                    .or(buckets::id.eq(bucket.id)),
            )
            .select(buckets::id.nullable());

        let mut query = report_entries::table
            .filter(
                report_entries::bucket_id
                    .is_null()
                    .or(report_entries::bucket_id.eq_any(eligible_buckets)),
            )
            .select(report_entries::id)
            .offset(offset)
            .into_boxed();
        query = match order {
            CandidateOrder::NewestFirst => query.order(report_entries::id.desc()),
            CandidateOrder::Ascending => query.order(report_entries::id.asc()),
        };
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(query.load(&mut conn).await?)
    }

    async fn first_entry_in_bucket(&self, bucket_id: i64) -> Result<Option<StoredEntry>> {
        let mut conn = self.conn().await?;
        let first: Option<i64> = report_entries::table
            .filter(report_entries::bucket_id.eq(bucket_id))
            .order(report_entries::id.asc())
            .select(report_entries::id)
            .first(&mut conn)
            .await
            .optional()?;
        match first {
            Some(id) => Ok(load_entries(&mut conn, &[id]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn unbucketed_entries(&self, limit: usize) -> Result<Vec<StoredEntry>> {
        let mut conn = self.conn().await?;
        let ids: Vec<i64> = report_entries::table
            .filter(report_entries::bucket_id.is_null())
            .order(report_entries::id.desc())
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .select(report_entries::id)
            .load(&mut conn)
            .await?;
        let mut entries = load_entries(&mut conn, &ids).await?;
        entries.reverse();
        Ok(entries)
    }

    async fn set_membership(
        &self,
        entry_ids: &[i64],
        target: Option<i64>,
    ) -> Result<Vec<MembershipChange>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, TriageError, _>(|conn| {
            async move { set_membership(conn, entry_ids, target).await }.scope_boxed()
        })
        .await
    }

    async fn delete_entry(&self, entry_id: i64) -> Result<Option<MembershipChange>> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, TriageError, _>(|conn| {
            async move { delete_entry(conn, entry_id).await }.scope_boxed()
        })
        .await
    }

    async fn count_bucketed_entries(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        let count = report_entries::table
            .filter(report_entries::bucket_id.is_not_null())
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    async fn increment_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn().await?;
        let begin_at = truncate_to_hour(at);
        apply_hit_atomically(&mut conn, HitAdjustment::Increment { bucket_id, begin_at }).await
    }

    async fn decrement_hit(&self, bucket_id: i64, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn().await?;
        let begin_at = truncate_to_hour(at);
        apply_hit_atomically(&mut conn, HitAdjustment::Decrement { bucket_id, begin_at }).await
    }

    async fn bucket_hits(&self, bucket_id: i64) -> Result<Vec<BucketHit>> {
        let mut conn = self.conn().await?;
        let hits = bucket_hits::table
            .filter(bucket_hits::bucket_id.eq(bucket_id))
            .order(bucket_hits::begin_at.asc())
            .select(BucketHit::as_select())
            .load(&mut conn)
            .await?;
        Ok(hits)
    }

    async fn total_hits(&self) -> Result<i64> {
        let mut conn = self.conn().await?;
        let total: Option<i64> = bucket_hits::table
            .select(diesel::dsl::sum(bucket_hits::count))
            .first(&mut conn)
            .await?;
        Ok(total.unwrap_or(0))
    }

    async fn create_bug_provider(&self, provider: NewBugProvider) -> Result<BugProvider> {
        let mut conn = self.conn().await?;
        let provider = diesel::insert_into(bug_providers::table)
            .values(&provider)
            .returning(BugProvider::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(provider)
    }

    async fn create_bug(&self, bug: NewBug) -> Result<Bug> {
        let mut conn = self.conn().await?;
        let bug = diesel::insert_into(bugs::table)
            .values(&bug)
            .returning(Bug::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(bug)
    }

    async fn get_bug(&self, bug_id: i64) -> Result<Option<(Bug, BugProvider)>> {
        let mut conn = self.conn().await?;
        let bug = bugs::table
            .inner_join(bug_providers::table)
            .filter(bugs::id.eq(bug_id))
            .select((Bug::as_select(), BugProvider::as_select()))
            .first(&mut conn)
            .await
            .optional()?;
        Ok(bug)
    }
}
