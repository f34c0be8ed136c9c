use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use super::{DiagramStore, StoreError, StoreResult};
use crate::models::{
    apply_operation_to_cells, CellChange, Diagram, DiagramCreateRequest, DiagramPatchRequest, Operation,
    ThreatModel, ThreatModelCreateRequest,
};

const CREATE_THREAT_MODELS: &str = r#"
    CREATE TABLE IF NOT EXISTS threat_models (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        owner TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        modified_at TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_DIAGRAMS: &str = r#"
    CREATE TABLE IF NOT EXISTS diagrams (
        id UUID PRIMARY KEY,
        threat_model_id UUID NOT NULL REFERENCES threat_models(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        cells JSONB NOT NULL DEFAULT '[]'::jsonb,
        update_vector BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL,
        modified_at TIMESTAMPTZ NOT NULL
    )
"#;

const DIAGRAM_COLUMNS: &str = "id, threat_model_id, name, cells, update_vector, created_at, modified_at";

/// PostgreSQL backed store
pub struct DbDiagram {
    pool: PgPool,
}

impl DbDiagram {
    /// Create a new database connection pool and make sure the tables exist
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    ///
    /// # Returns
    /// * `Result<Self, SqlxError>` - Store or error
    pub async fn connect(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        sqlx::query(CREATE_THREAT_MODELS).execute(&pool).await?;
        sqlx::query(CREATE_DIAGRAMS).execute(&pool).await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    fn threat_model_from_row(row: &PgRow) -> Result<ThreatModel, SqlxError> {
        Ok(ThreatModel {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            owner: row.try_get("owner")?,
            created_at: row.try_get("created_at")?,
            modified_at: row.try_get("modified_at")?,
        })
    }

    fn diagram_from_row(row: &PgRow) -> Result<Diagram, SqlxError> {
        let cells: Json<Vec<Value>> = row.try_get("cells")?;
        Ok(Diagram {
            id: row.try_get("id")?,
            threat_model_id: row.try_get("threat_model_id")?,
            name: row.try_get("name")?,
            cells: cells.0,
            update_vector: row.try_get("update_vector")?,
            created_at: row.try_get("created_at")?,
            modified_at: row.try_get("modified_at")?,
        })
    }
}

#[async_trait]
impl DiagramStore for DbDiagram {
    async fn create_threat_model(&self, owner: &str, request: ThreatModelCreateRequest) -> StoreResult<ThreatModel> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO threat_models (id, name, description, owner, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING id, name, description, owner, created_at, modified_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(owner)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Self::threat_model_from_row(&row)?)
    }

    async fn get_threat_model(&self, id: &Uuid) -> StoreResult<Option<ThreatModel>> {
        let row = sqlx::query(
            "SELECT id, name, description, owner, created_at, modified_at FROM threat_models WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::threat_model_from_row).transpose()?)
    }

    async fn delete_threat_model(&self, id: &Uuid) -> StoreResult<bool> {
        // Diagrams go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM threat_models WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_diagram_ids(&self, threat_model_id: &Uuid) -> StoreResult<Vec<Uuid>> {
        let rows = sqlx::query("SELECT id FROM diagrams WHERE threat_model_id = $1")
            .bind(threat_model_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn create_diagram(&self, threat_model_id: &Uuid, request: DiagramCreateRequest) -> StoreResult<Diagram> {
        if self.get_threat_model(threat_model_id).await?.is_none() {
            return Err(StoreError::NotFound(format!("threat model {}", threat_model_id)));
        }

        let now = Utc::now();
        let sql = format!(
            "INSERT INTO diagrams (id, threat_model_id, name, cells, update_vector, created_at, modified_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $5) RETURNING {}",
            DIAGRAM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(threat_model_id)
            .bind(&request.name)
            .bind(Json(&request.cells))
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(Self::diagram_from_row(&row)?)
    }

    async fn get_diagram(&self, id: &Uuid) -> StoreResult<Option<Diagram>> {
        let sql = format!("SELECT {} FROM diagrams WHERE id = $1", DIAGRAM_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;

        Ok(row.as_ref().map(Self::diagram_from_row).transpose()?)
    }

    async fn update_diagram(&self, id: &Uuid, patch: DiagramPatchRequest) -> StoreResult<Option<Diagram>> {
        let sql = format!(
            "UPDATE diagrams SET \
                name = COALESCE($2, name), \
                cells = COALESCE($3, cells), \
                update_vector = update_vector + 1, \
                modified_at = $4 \
             WHERE id = $1 RETURNING {}",
            DIAGRAM_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(&patch.name)
            .bind(patch.cells.as_ref().map(Json))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::diagram_from_row).transpose()?)
    }

    async fn delete_diagram(&self, id: &Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM diagrams WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_operation(&self, diagram_id: &Uuid, operation: &Operation) -> StoreResult<CellChange> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!(
                    "Failed to acquire connection from pool: {}. Pool state: {} idle, {} total",
                    e,
                    self.pool.num_idle(),
                    self.pool.size()
                );
                return Err(e.into());
            }
        };

        let row = sqlx::query("SELECT cells FROM diagrams WHERE id = $1 FOR UPDATE")
            .bind(diagram_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("diagram {}", diagram_id)))?;

        let Json(mut cells): Json<Vec<Value>> = row.try_get("cells")?;
        let change = apply_operation_to_cells(&mut cells, operation).map_err(StoreError::InvalidOperation)?;

        if change == CellChange::Changed {
            sqlx::query(
                "UPDATE diagrams SET cells = $2, update_vector = update_vector + 1, modified_at = $3 WHERE id = $1",
            )
            .bind(diagram_id)
            .bind(Json(&cells))
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(change)
    }
}
