use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;
use uuid::Uuid;

use skucast_core::{AggregateKey, BuildStats, FrequencyIndex, SkuYearRange, VinPrefixFrequency};

use super::{IndexSnapshot, IndexSnapshotRepository, RepositoryError};
use crate::DbPool;

pub struct SqlIndexSnapshotRepository {
    pool: DbPool,
}

impl SqlIndexSnapshotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn load_cells(
        &self,
        build_id: &str,
    ) -> Result<BTreeMap<AggregateKey, SkuYearRange>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                maker, series, normalized_description, part_identifier,
                observation_count, start_year, end_year
            FROM sku_year_ranges
            WHERE build_id = ?
            "#,
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(cell_from_row).collect()
    }

    async fn load_prefixes(
        &self,
        build_id: &str,
    ) -> Result<BTreeMap<String, VinPrefixFrequency>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT prefix, observation_count, maker FROM vin_prefix_frequencies WHERE build_id = ?",
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;

        let mut prefixes = BTreeMap::new();
        for row in &rows {
            let prefix: String = row.try_get("prefix")?;
            let mut frequency = VinPrefixFrequency::new(prefix.clone());
            frequency.count = count_from_row(row)?;
            frequency.maker = row.try_get("maker")?;
            prefixes.insert(prefix, frequency);
        }

        let makers = sqlx::query(
            "SELECT prefix, maker AS value, observation_count FROM vin_prefix_makers WHERE build_id = ?",
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;
        for row in &makers {
            let (prefix, maker, count) = histogram_entry_from_row(row)?;
            prefix_entry(&mut prefixes, &prefix)?.maker_counts.insert(maker, count);
        }

        let series = sqlx::query(
            "SELECT prefix, series AS value, observation_count FROM vin_prefix_series WHERE build_id = ?",
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;
        for row in &series {
            let (prefix, series, count) = histogram_entry_from_row(row)?;
            prefix_entry(&mut prefixes, &prefix)?.series_counts.insert(series, count);
        }

        Ok(prefixes)
    }
}

#[async_trait]
impl IndexSnapshotRepository for SqlIndexSnapshotRepository {
    async fn replace(
        &self,
        index: &FrequencyIndex,
        stats: &BuildStats,
    ) -> Result<String, RepositoryError> {
        let build_id = Uuid::new_v4().to_string();
        let stats_json = serde_json::to_string(stats)
            .map_err(|error| RepositoryError::Decode(format!("failed to encode build stats: {error}")))?;

        let mut tx = self.pool.begin().await?;

        // Child rows go with their build through ON DELETE CASCADE.
        sqlx::query("DELETE FROM index_builds").execute(&mut *tx).await?;

        sqlx::query(
            r#"
            INSERT INTO index_builds (id, as_of_year, ruleset_fingerprint, stats_json, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&build_id)
        .bind(stats.as_of_year)
        .bind(&stats.ruleset_fingerprint)
        .bind(&stats_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (key, range) in index.cells() {
            sqlx::query(
                r#"
                INSERT INTO sku_year_ranges (
                    build_id, maker, series, normalized_description, part_identifier,
                    observation_count, start_year, end_year
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&build_id)
            .bind(&key.maker)
            .bind(&key.series)
            .bind(&key.normalized_description)
            .bind(&key.part_identifier)
            .bind(i64::from(range.count))
            .bind(range.start_year)
            .bind(range.end_year)
            .execute(&mut *tx)
            .await?;
        }

        for prefix in index.prefixes() {
            sqlx::query(
                r#"
                INSERT INTO vin_prefix_frequencies (build_id, prefix, observation_count, maker)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&build_id)
            .bind(&prefix.prefix)
            .bind(i64::from(prefix.count))
            .bind(&prefix.maker)
            .execute(&mut *tx)
            .await?;

            for (maker, count) in &prefix.maker_counts {
                sqlx::query(
                    "INSERT INTO vin_prefix_makers (build_id, prefix, maker, observation_count)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&build_id)
                .bind(&prefix.prefix)
                .bind(maker)
                .bind(i64::from(*count))
                .execute(&mut *tx)
                .await?;
            }

            for (series, count) in &prefix.series_counts {
                sqlx::query(
                    "INSERT INTO vin_prefix_series (build_id, prefix, series, observation_count)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&build_id)
                .bind(&prefix.prefix)
                .bind(series)
                .bind(i64::from(*count))
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            event_name = "index.snapshot.replaced",
            build_id = %build_id,
            distinct_keys = index.distinct_keys(),
            distinct_prefixes = index.distinct_prefixes(),
            "stored index snapshot"
        );
        Ok(build_id)
    }

    async fn load(&self) -> Result<Option<IndexSnapshot>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, stats_json, created_at
            FROM index_builds
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let build_id: String = row.try_get("id")?;
        let stats_json: String = row.try_get("stats_json")?;
        let created_at: String = row.try_get("created_at")?;

        let stats: BuildStats = serde_json::from_str(&stats_json).map_err(|error| {
            RepositoryError::Decode(format!("invalid stats_json for build {build_id}: {error}"))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|timestamp| timestamp.with_timezone(&Utc))
            .map_err(|error| {
                RepositoryError::Decode(format!("invalid created_at for build {build_id}: {error}"))
            })?;

        let cells = self.load_cells(&build_id).await?;
        let prefixes = self.load_prefixes(&build_id).await?;

        Ok(Some(IndexSnapshot {
            build_id,
            created_at,
            index: FrequencyIndex::from_parts(cells, prefixes),
            stats,
        }))
    }
}

fn cell_from_row(row: &SqliteRow) -> Result<(AggregateKey, SkuYearRange), RepositoryError> {
    let key = AggregateKey {
        maker: row.try_get("maker")?,
        series: row.try_get("series")?,
        normalized_description: row.try_get("normalized_description")?,
        part_identifier: row.try_get("part_identifier")?,
    };
    let range = SkuYearRange {
        count: count_from_row(row)?,
        start_year: row.try_get("start_year")?,
        end_year: row.try_get("end_year")?,
    };
    Ok((key, range))
}

fn histogram_entry_from_row(row: &SqliteRow) -> Result<(String, String, u32), RepositoryError> {
    Ok((row.try_get("prefix")?, row.try_get("value")?, count_from_row(row)?))
}

fn count_from_row(row: &SqliteRow) -> Result<u32, RepositoryError> {
    let raw: i64 = row.try_get("observation_count")?;
    u32::try_from(raw)
        .map_err(|_| RepositoryError::Decode(format!("observation_count `{raw}` does not fit in u32")))
}

fn prefix_entry<'a>(
    prefixes: &'a mut BTreeMap<String, VinPrefixFrequency>,
    prefix: &str,
) -> Result<&'a mut VinPrefixFrequency, RepositoryError> {
    prefixes
        .get_mut(prefix)
        .ok_or_else(|| RepositoryError::Decode(format!("histogram row for unknown prefix {prefix}")))
}

#[cfg(test)]
mod tests {
    use skucast_core::{BuildStats, FrequencyIndex};

    use super::SqlIndexSnapshotRepository;
    use crate::repositories::{IndexSnapshotRepository, RepositoryError};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn migrated_pool() -> Result<DbPool, String> {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .map_err(|error| format!("connect: {error}"))?;
        migrations::run_pending(&pool).await.map_err(|error| format!("migrate: {error}"))?;
        Ok(pool)
    }

    #[tokio::test]
    async fn load_on_fresh_schema_returns_none() -> Result<(), String> {
        let repo = SqlIndexSnapshotRepository::new(migrated_pool().await?);

        let loaded = repo.load().await.map_err(|error| format!("load: {error}"))?;
        if loaded.is_some() {
            return Err("fresh schema should hold no snapshot".to_string());
        }
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_stats_surface_as_decode_error() -> Result<(), String> {
        let pool = migrated_pool().await?;
        sqlx::query(
            "INSERT INTO index_builds (id, as_of_year, ruleset_fingerprint, stats_json, created_at)
             VALUES ('b-1', 2024, 'abc', '{not json', '2024-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .map_err(|error| format!("seed: {error}"))?;
        let repo = SqlIndexSnapshotRepository::new(pool);

        match repo.load().await {
            Err(RepositoryError::Decode(message)) if message.contains("b-1") => Ok(()),
            other => Err(format!("expected decode error, got {other:?}")),
        }
    }

    #[tokio::test]
    async fn replacing_an_empty_index_keeps_a_single_build() -> Result<(), String> {
        let pool = migrated_pool().await?;
        let repo = SqlIndexSnapshotRepository::new(pool.clone());
        let stats = BuildStats { as_of_year: 2024, ..BuildStats::default() };

        repo.replace(&FrequencyIndex::default(), &stats)
            .await
            .map_err(|error| format!("first replace: {error}"))?;
        let latest = repo
            .replace(&FrequencyIndex::default(), &stats)
            .await
            .map_err(|error| format!("second replace: {error}"))?;

        let builds: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_builds")
            .fetch_one(&pool)
            .await
            .map_err(|error| format!("count builds: {error}"))?;
        if builds != 1 {
            return Err(format!("expected one build row, found {builds}"));
        }

        let snapshot = repo
            .load()
            .await
            .map_err(|error| format!("load: {error}"))?
            .ok_or_else(|| "snapshot missing".to_string())?;
        if snapshot.build_id != latest || !snapshot.index.is_empty() {
            return Err(format!("unexpected snapshot {snapshot:?}"));
        }
        Ok(())
    }
}
