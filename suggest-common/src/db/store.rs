//! SQLite implementation of the corpus store

use crate::db::init::{init_database, init_memory_database};
use crate::model::{
    Annotation, Fingerprint, Model, ModelFamily, Record, RecordId, TargetId, TargetTable,
};
use crate::store::CorpusStore;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Corpus store backed by a SQLite connection pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file
    pub async fn open(db_path: &Path) -> Result<Self> {
        Ok(Self::new(init_database(db_path).await?))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(init_memory_database().await?))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a curated record and its annotations
    ///
    /// The stored fingerprint is cleared so it is recomputed from the new text.
    pub async fn put_record(
        &self,
        id: RecordId,
        text: &str,
        annotations: &[Annotation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO records (record_id, text, curated, fingerprint, updated_at)
            VALUES (?, ?, 1, NULL, CURRENT_TIMESTAMP)
            ON CONFLICT(record_id) DO UPDATE SET
                text = excluded.text,
                fingerprint = NULL,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(id)
        .bind(text)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM annotations WHERE record_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        for (ordinal, annotation) in annotations.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO annotations (record_id, ordinal, prop_uri, value_uri, group_path)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(ordinal as i64)
            .bind(&annotation.prop_uri)
            .bind(&annotation.value_uri)
            .bind(serde_json::to_string(&annotation.group_path)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn set_curated(&self, id: RecordId, curated: bool) -> Result<()> {
        let result = sqlx::query("UPDATE records SET curated = ? WHERE record_id = ?")
            .bind(curated as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("record {}", id)));
        }
        Ok(())
    }

    /// Register a (property, value) pair as a target, returning its id
    pub async fn register_target(&self, prop_uri: &str, value_uri: &str) -> Result<TargetId> {
        sqlx::query("INSERT OR IGNORE INTO annotation_targets (prop_uri, value_uri) VALUES (?, ?)")
            .bind(prop_uri)
            .bind(value_uri)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query(
            "SELECT target_id FROM annotation_targets WHERE prop_uri = ? AND value_uri = ?",
        )
        .bind(prop_uri)
        .bind(value_uri)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("target_id"))
    }

    /// Advance a family watermark, returning the new value
    pub async fn increment_watermark(&self, family: ModelFamily) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO watermarks (family, value) VALUES (?, 1)
            ON CONFLICT(family) DO UPDATE SET value = value + 1
            "#,
        )
        .bind(family.as_str())
        .execute(&self.pool)
        .await?;

        self.family_watermark(family).await
    }
}

fn model_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Model> {
    let fingerprints: String = row.get("fingerprints");
    let contributions: String = row.get("contributions");
    let is_explicit: i64 = row.get("is_explicit");
    let target: TargetId = row.get("target_id");
    let fingerprints: Vec<Fingerprint> = serde_json::from_str(&fingerprints)?;
    let contributions: Vec<f64> = serde_json::from_str(&contributions)?;
    if fingerprints.len() != contributions.len() {
        return Err(Error::InvalidInput(format!(
            "model for target {} has {} fingerprints but {} contributions",
            target,
            fingerprints.len(),
            contributions.len()
        )));
    }
    Ok(Model {
        target,
        watermark: row.get("watermark"),
        fingerprints,
        contributions,
        calibration_low: row.get("calibration_low"),
        calibration_high: row.get("calibration_high"),
        roc_auc: row.get("roc_auc"),
        is_explicit: is_explicit != 0,
    })
}

#[async_trait]
impl CorpusStore for SqliteStore {
    async fn curated_record_ids(&self) -> Result<Vec<RecordId>> {
        let rows =
            sqlx::query("SELECT record_id FROM records WHERE curated != 0 ORDER BY record_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.iter().map(|row| row.get("record_id")).collect())
    }

    async fn record(&self, id: RecordId) -> Result<Option<Record>> {
        let row =
            sqlx::query("SELECT record_id, text, fingerprint FROM records WHERE record_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let fingerprint: Option<String> = row.get("fingerprint");
        let fingerprint = match fingerprint {
            Some(json) => Some(serde_json::from_str::<Vec<Fingerprint>>(&json)?),
            None => None,
        };

        let annotation_rows = sqlx::query(
            r#"
            SELECT prop_uri, value_uri, group_path
            FROM annotations
            WHERE record_id = ?
            ORDER BY ordinal
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut annotations = Vec::with_capacity(annotation_rows.len());
        for annotation in &annotation_rows {
            let group_path: String = annotation.get("group_path");
            annotations.push(Annotation {
                prop_uri: annotation.get("prop_uri"),
                value_uri: annotation.get("value_uri"),
                group_path: serde_json::from_str(&group_path)?,
            });
        }

        Ok(Some(Record {
            id: row.get("record_id"),
            text: row.get("text"),
            annotations,
            fingerprint,
        }))
    }

    async fn annotation_targets(&self) -> Result<TargetTable> {
        let rows = sqlx::query("SELECT target_id, prop_uri, value_uri FROM annotation_targets")
            .fetch_all(&self.pool)
            .await?;

        let mut table = TargetTable::new();
        for row in &rows {
            let prop_uri: String = row.get("prop_uri");
            let value_uri: String = row.get("value_uri");
            table.insert(&prop_uri, &value_uri, row.get("target_id"));
        }
        Ok(table)
    }

    async fn family_watermark(&self, family: ModelFamily) -> Result<i64> {
        let row = sqlx::query("SELECT value FROM watermarks WHERE family = ?")
            .bind(family.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")).unwrap_or(0))
    }

    async fn stored_model_watermark(
        &self,
        family: ModelFamily,
        target: TargetId,
    ) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT watermark FROM models WHERE family = ? AND target_id = ?")
            .bind(family.as_str())
            .bind(target)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("watermark")))
    }

    async fn stored_model(&self, family: ModelFamily, target: TargetId) -> Result<Option<Model>> {
        let row = sqlx::query(
            r#"
            SELECT target_id, watermark, is_explicit, fingerprints, contributions,
                   calibration_low, calibration_high, roc_auc
            FROM models
            WHERE family = ? AND target_id = ?
            "#,
        )
        .bind(family.as_str())
        .bind(target)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(model_from_row).transpose()
    }

    async fn publish_model(&self, family: ModelFamily, model: &Model) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO models (family, target_id, watermark, is_blank, is_explicit, fingerprints,
                                contributions, calibration_low, calibration_high, roc_auc, built_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(family, target_id) DO UPDATE SET
                watermark = excluded.watermark,
                is_blank = excluded.is_blank,
                is_explicit = excluded.is_explicit,
                fingerprints = excluded.fingerprints,
                contributions = excluded.contributions,
                calibration_low = excluded.calibration_low,
                calibration_high = excluded.calibration_high,
                roc_auc = excluded.roc_auc,
                built_at = excluded.built_at
            "#,
        )
        .bind(family.as_str())
        .bind(model.target)
        .bind(model.watermark)
        .bind(model.is_blank() as i64)
        .bind(model.is_explicit as i64)
        .bind(serde_json::to_string(&model.fingerprints)?)
        .bind(serde_json::to_string(&model.contributions)?)
        .bind(model.calibration_low)
        .bind(model.calibration_high)
        .bind(model.roc_auc)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn publish_blank_model(
        &self,
        family: ModelFamily,
        target: TargetId,
        watermark: i64,
    ) -> Result<()> {
        self.publish_model(family, &Model::blank(target, watermark)).await
    }

    async fn records_missing_fingerprint(&self) -> Result<Vec<RecordId>> {
        let rows = sqlx::query(
            r#"
            SELECT record_id FROM records
            WHERE fingerprint IS NULL AND TRIM(text) != ''
            ORDER BY record_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("record_id")).collect())
    }

    async fn set_record_fingerprint(
        &self,
        id: RecordId,
        source_text: &str,
        fingerprint: &[Fingerprint],
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE records SET fingerprint = ? WHERE record_id = ? AND text = ?")
                .bind(serde_json::to_string(fingerprint)?)
                .bind(id)
                .bind(source_text)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn block_id(&self, block: &str) -> Result<Fingerprint> {
        sqlx::query("INSERT OR IGNORE INTO text_blocks (block) VALUES (?)")
            .bind(block)
            .execute(&self.pool)
            .await?;

        let row = sqlx::query("SELECT block_id FROM text_blocks WHERE block = ?")
            .bind(block)
            .fetch_one(&self.pool)
            .await?;
        let id: i64 = row.get("block_id");
        Fingerprint::try_from(id)
            .map_err(|_| Error::Internal(format!("text block id {} out of range", id)))
    }
}
