//! Postgres-backed `MetadataStore` (spec §4.1 reference relational
//! implementation).
//!
//! Grounded on `durable::persistence::postgres::PostgresWorkflowEventStore`:
//! a `Clone` wrapper around a `PgPool`, `#[instrument]`-annotated
//! methods, `sqlx::query` with explicit `.bind(...)` chains, and
//! `FOR UPDATE SKIP LOCKED` for atomic claiming (there: tasks; here:
//! outbox items). Lease acquisition is the one primitive with no
//! teacher analog — it is built directly from spec §4.1's conditional
//! `WHERE owner IS NULL OR lease_until < :now OR owner = :self` clause.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use hermod_crypto::Vault;
use hermod_types::{
    Approval, ApprovalStatus, AuditLogEntry, Connector, ConnectorType, FailureClass, ListFilter,
    NodeState, OutboxItem, OutboxStatus, Page, Schema, SchemaType, TraceStep, Worker, Workflow,
    WorkflowStatus, WorkflowVersionSnapshot,
};

use crate::error::StoreError;
use crate::migrate::{self, TableDef};
use crate::retry::with_busy_retry;
use crate::sensitive::{decrypt_config, encrypt_config};
use crate::traits::MetadataStore;

const CATALOG: &[TableDef] = &[
    TableDef {
        name: "hermod_workflows",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_workflows (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            vhost TEXT NOT NULL,
            workspace_id UUID,
            active BOOLEAN NOT NULL DEFAULT false,
            status TEXT NOT NULL,
            definition JSONB NOT NULL,
            owner_id TEXT,
            lease_until TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    },
    TableDef {
        name: "hermod_connectors",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_connectors (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            connector_type TEXT NOT NULL,
            vhost TEXT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT false,
            status TEXT NOT NULL,
            worker_id TEXT,
            config JSONB NOT NULL,
            sample JSONB,
            state JSONB
        )"#,
    },
    TableDef {
        name: "hermod_schemas",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_schemas (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            version INT NOT NULL,
            schema_type TEXT NOT NULL,
            definition JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    },
    TableDef {
        name: "hermod_outbox_items",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_outbox_items (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL,
            sink_id UUID NOT NULL,
            node_id TEXT NOT NULL,
            payload BYTEA NOT NULL,
            status TEXT NOT NULL,
            attempts INT NOT NULL DEFAULT 0,
            max_attempts INT NOT NULL,
            last_error TEXT,
            last_failure_class TEXT,
            available_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            claimed_by TEXT,
            claimed_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    },
    TableDef {
        name: "hermod_node_state",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_node_state (
            workflow_id UUID NOT NULL,
            node_id TEXT NOT NULL,
            state JSONB NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (workflow_id, node_id)
        )"#,
    },
    TableDef {
        name: "hermod_trace_steps",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_trace_steps (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL,
            instance_run_id UUID NOT NULL,
            node_id TEXT NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            duration_micros BIGINT NOT NULL,
            data JSONB,
            error TEXT
        )"#,
    },
    TableDef {
        name: "hermod_audit_log",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_audit_log (
            id UUID PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            detail JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    },
    TableDef {
        name: "hermod_approvals",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_approvals (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL,
            node_id TEXT NOT NULL,
            message_id UUID NOT NULL,
            status TEXT NOT NULL,
            requested_at TIMESTAMPTZ NOT NULL,
            resolved_at TIMESTAMPTZ,
            resolved_by TEXT
        )"#,
    },
    TableDef {
        name: "hermod_workflow_versions",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_workflow_versions (
            id UUID PRIMARY KEY,
            workflow_id UUID NOT NULL,
            version INT NOT NULL,
            definition JSONB NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )"#,
    },
    TableDef {
        name: "hermod_workers",
        create: r#"CREATE TABLE IF NOT EXISTS hermod_workers (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            host TEXT NOT NULL,
            port INT NOT NULL,
            token TEXT NOT NULL,
            last_seen TIMESTAMPTZ NOT NULL DEFAULT now(),
            cpu_usage DOUBLE PRECISION NOT NULL DEFAULT 0,
            mem_usage DOUBLE PRECISION NOT NULL DEFAULT 0
        )"#,
    },
];

#[derive(Clone)]
pub struct PostgresMetadataStore {
    pool: PgPool,
    vault: Vault,
}

impl PostgresMetadataStore {
    pub fn new(pool: PgPool, vault: Vault) -> Self {
        Self { pool, vault }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the self-migration pass; call once at process startup.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        migrate::self_migrate(&self.pool, CATALOG).await
    }
}

fn row_to_workflow(row: &sqlx::postgres::PgRow) -> Result<Workflow, StoreError> {
    let definition: serde_json::Value = row.get("definition");
    let mut workflow: Workflow =
        serde_json::from_value(definition).map_err(|e| StoreError::Serialization(e.to_string()))?;
    workflow.id = row.get("id");
    workflow.name = row.get("name");
    workflow.vhost = row.get("vhost");
    workflow.workspace_id = row.get("workspace_id");
    workflow.active = row.get("active");
    workflow.status = match row.get::<String, _>("status").as_str() {
        "starting" => WorkflowStatus::Starting,
        "running" => WorkflowStatus::Running,
        "reconnecting" => WorkflowStatus::Reconnecting,
        "failed" => WorkflowStatus::Failed,
        _ => WorkflowStatus::Stopped,
    };
    workflow.owner_id = row.get("owner_id");
    workflow.lease_until = row.get("lease_until");
    workflow.created_at = row.get("created_at");
    workflow.updated_at = row.get("updated_at");
    Ok(workflow)
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    #[instrument(skip(self, filter))]
    async fn list_workflows(&self, filter: ListFilter) -> Result<Page<Workflow>, StoreError> {
        let search = filter.search.clone().unwrap_or_default();
        let rows = sqlx::query(
            r#"SELECT * FROM hermod_workflows
               WHERE ($1 = '' OR name ILIKE '%' || $1 || '%' OR id::text ILIKE '%' || $1 || '%')
                 AND ($2::text IS NULL OR vhost = $2)
               ORDER BY created_at DESC
               OFFSET $3 LIMIT $4"#,
        )
        .bind(&search)
        .bind(&filter.vhost)
        .bind(filter.offset() as i64)
        .bind(if filter.limit == 0 { 1_000_000i64 } else { filter.limit as i64 })
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;

        let total: i64 = sqlx::query(
            r#"SELECT COUNT(*) AS c FROM hermod_workflows
               WHERE ($1 = '' OR name ILIKE '%' || $1 || '%')
                 AND ($2::text IS NULL OR vhost = $2)"#,
        )
        .bind(&search)
        .bind(&filter.vhost)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::database)?
        .get("c");

        let items = rows.iter().map(row_to_workflow).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: total as u64,
        })
    }

    #[instrument(skip(self))]
    async fn get_workflow(&self, id: Uuid) -> Result<Workflow, StoreError> {
        let row = sqlx::query("SELECT * FROM hermod_workflows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database)?
            .ok_or(StoreError::NotFound(id))?;
        row_to_workflow(&row)
    }

    #[instrument(skip(self, workflow))]
    async fn create_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        let definition =
            serde_json::to_value(&workflow).map_err(|e| StoreError::Serialization(e.to_string()))?;
        with_busy_retry(|| async {
            sqlx::query(
                r#"INSERT INTO hermod_workflows
                   (id, name, vhost, workspace_id, active, status, definition, owner_id, lease_until)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
            )
            .bind(workflow.id)
            .bind(&workflow.name)
            .bind(&workflow.vhost)
            .bind(workflow.workspace_id)
            .bind(workflow.active)
            .bind(workflow.status.to_string())
            .bind(&definition)
            .bind(&workflow.owner_id)
            .bind(workflow.lease_until)
            .execute(&self.pool)
            .await
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(StoreError::Database)?;
        Ok(())
    }

    #[instrument(skip(self, workflow))]
    async fn update_workflow(&self, workflow: Workflow) -> Result<(), StoreError> {
        let definition =
            serde_json::to_value(&workflow).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let result = with_busy_retry(|| async {
            sqlx::query(
                r#"UPDATE hermod_workflows SET
                   name = $2, vhost = $3, workspace_id = $4, active = $5, status = $6,
                   definition = $7, owner_id = $8, lease_until = $9, updated_at = now()
                   WHERE id = $1"#,
            )
            .bind(workflow.id)
            .bind(&workflow.name)
            .bind(&workflow.vhost)
            .bind(workflow.workspace_id)
            .bind(workflow.active)
            .bind(workflow.status.to_string())
            .bind(&definition)
            .bind(&workflow.owner_id)
            .bind(workflow.lease_until)
            .execute(&self.pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(|e| e.to_string())
        })
        .await
        .map_err(StoreError::Database)?;

        if result == 0 {
            return Err(StoreError::NotFound(workflow.id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_workflow(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM hermod_workflows WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_connectors(&self, filter: ListFilter) -> Result<Page<Connector>, StoreError> {
        let rows = sqlx::query("SELECT * FROM hermod_connectors OFFSET $1 LIMIT $2")
            .bind(filter.offset() as i64)
            .bind(if filter.limit == 0 { 1_000_000i64 } else { filter.limit as i64 })
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database)?;
        let total: i64 = sqlx::query("SELECT COUNT(*) AS c FROM hermod_connectors")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?
            .get("c");

        let items = rows
            .into_iter()
            .map(|row| self.row_to_connector(row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn get_connector(&self, id: Uuid) -> Result<Connector, StoreError> {
        let row = sqlx::query("SELECT * FROM hermod_connectors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database)?
            .ok_or(StoreError::NotFound(id))?;
        self.row_to_connector(row)
    }

    async fn create_connector(&self, mut connector: Connector) -> Result<(), StoreError> {
        encrypt_config(&mut connector.config, &self.vault);
        sqlx::query(
            r#"INSERT INTO hermod_connectors
               (id, name, kind, connector_type, vhost, active, status, worker_id, config, sample, state)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"#,
        )
        .bind(connector.id)
        .bind(&connector.name)
        .bind(if connector.kind == ConnectorType::Source { "source" } else { "sink" })
        .bind(&connector.connector_type)
        .bind(&connector.vhost)
        .bind(connector.active)
        .bind(&connector.status)
        .bind(&connector.worker_id)
        .bind(serde_json::Value::Object(connector.config.clone()))
        .bind(&connector.sample)
        .bind(&connector.state)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn update_connector(&self, mut connector: Connector) -> Result<(), StoreError> {
        encrypt_config(&mut connector.config, &self.vault);
        let result = sqlx::query(
            r#"UPDATE hermod_connectors SET
               name = $2, kind = $3, connector_type = $4, vhost = $5, active = $6,
               status = $7, worker_id = $8, config = $9, sample = $10, state = $11
               WHERE id = $1"#,
        )
        .bind(connector.id)
        .bind(&connector.name)
        .bind(if connector.kind == ConnectorType::Source { "source" } else { "sink" })
        .bind(&connector.connector_type)
        .bind(&connector.vhost)
        .bind(connector.active)
        .bind(&connector.status)
        .bind(&connector.worker_id)
        .bind(serde_json::Value::Object(connector.config.clone()))
        .bind(&connector.sample)
        .bind(&connector.state)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(connector.id));
        }
        Ok(())
    }

    async fn delete_connector(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM hermod_connectors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn list_schema_versions(&self, name: &str) -> Result<Vec<Schema>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM hermod_schemas WHERE name = $1 ORDER BY version ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;
        rows.iter().map(row_to_schema).collect()
    }

    async fn get_schema_version(&self, name: &str, version: u32) -> Result<Schema, StoreError> {
        let row = sqlx::query("SELECT * FROM hermod_schemas WHERE name = $1 AND version = $2")
            .bind(name)
            .bind(version as i32)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database)?
            .ok_or_else(|| StoreError::NotFound(Uuid::nil()))?;
        row_to_schema(&row)
    }

    async fn get_latest_schema(&self, name: &str) -> Result<Option<Schema>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM hermod_schemas WHERE name = $1 ORDER BY version DESC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;
        row.as_ref().map(row_to_schema).transpose()
    }

    async fn create_schema_version(&self, schema: Schema) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_schemas (id, name, version, schema_type, definition)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(schema.id)
        .bind(&schema.name)
        .bind(schema.version as i32)
        .bind(schema_type_str(schema.schema_type))
        .bind(&schema.definition)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn create_outbox_item(&self, item: OutboxItem) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_outbox_items
               (id, workflow_id, sink_id, node_id, payload, status, attempts, max_attempts, available_at)
               VALUES ($1, $2, $3, $4, $5, 'pending', 0, $6, $7)"#,
        )
        .bind(item.id)
        .bind(item.workflow_id)
        .bind(item.sink_id)
        .bind(&item.node_id)
        .bind(&item.payload)
        .bind(item.max_attempts as i32)
        .bind(item.available_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn get_outbox_item(&self, id: Uuid) -> Result<OutboxItem, StoreError> {
        let row = sqlx::query("SELECT * FROM hermod_outbox_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database)?
            .ok_or(StoreError::NotFound(id))?;
        row_to_outbox_item(&row)
    }

    #[instrument(skip(self))]
    async fn claim_outbox_items(
        &self,
        claimed_by: &str,
        max_items: u32,
    ) -> Result<Vec<OutboxItem>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::database)?;

        let rows = sqlx::query(
            r#"SELECT id FROM hermod_outbox_items
               WHERE status = 'pending' AND available_at <= now()
               ORDER BY available_at ASC
               LIMIT $1
               FOR UPDATE SKIP LOCKED"#,
        )
        .bind(max_items as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::database)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("id")).collect();
        if ids.is_empty() {
            tx.commit().await.map_err(StoreError::database)?;
            return Ok(vec![]);
        }

        sqlx::query(
            r#"UPDATE hermod_outbox_items
               SET status = 'in_flight', claimed_by = $1, claimed_at = now(), updated_at = now()
               WHERE id = ANY($2)"#,
        )
        .bind(claimed_by)
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database)?;

        let claimed = sqlx::query("SELECT * FROM hermod_outbox_items WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(StoreError::database)?;

        tx.commit().await.map_err(StoreError::database)?;

        claimed.iter().map(row_to_outbox_item).collect()
    }

    async fn complete_outbox_item(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM hermod_outbox_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn fail_outbox_item(
        &self,
        id: Uuid,
        error: &str,
        failure_class: FailureClass,
        next_available_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let item = self.get_outbox_item(id).await?;
        let next_status = if item.attempts + 1 >= item.max_attempts {
            "dead"
        } else {
            "pending"
        };
        sqlx::query(
            r#"UPDATE hermod_outbox_items SET
               status = $2, attempts = attempts + 1, last_error = $3, last_failure_class = $4,
               claimed_by = NULL, claimed_at = NULL, available_at = $5, updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(next_status)
        .bind(error)
        .bind(failure_class_str(failure_class))
        .bind(next_available_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn reclaim_stale_outbox_items(
        &self,
        claim_ttl: chrono::Duration,
    ) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            r#"UPDATE hermod_outbox_items
               SET status = 'pending', claimed_by = NULL, claimed_at = NULL, updated_at = now()
               WHERE status = 'in_flight' AND claimed_at < now() - $1::interval
               RETURNING id"#,
        )
        .bind(format!("{} seconds", claim_ttl.num_seconds()))
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(rows.into_iter().map(|r| r.get("id")).collect())
    }

    async fn requeue_dead_outbox_item(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE hermod_outbox_items
               SET status = 'pending', attempts = 0, available_at = now(), updated_at = now()
               WHERE id = $1 AND status = 'dead'"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn mark_outbox_item_dead(&self, id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE hermod_outbox_items
               SET status = 'dead', last_error = $2, claimed_by = NULL, claimed_at = NULL, updated_at = now()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn list_outbox_items(&self, filter: ListFilter) -> Result<Page<OutboxItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM hermod_outbox_items OFFSET $1 LIMIT $2")
            .bind(filter.offset() as i64)
            .bind(if filter.limit == 0 { 1_000_000i64 } else { filter.limit as i64 })
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database)?;
        let total: i64 = sqlx::query("SELECT COUNT(*) AS c FROM hermod_outbox_items")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?
            .get("c");
        let items = rows.iter().map(row_to_outbox_item).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn get_node_state(
        &self,
        workflow_id: Uuid,
        node_id: &str,
    ) -> Result<Option<NodeState>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM hermod_node_state WHERE workflow_id = $1 AND node_id = $2",
        )
        .bind(workflow_id)
        .bind(node_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(row.map(|r| NodeState {
            workflow_id: r.get("workflow_id"),
            node_id: r.get("node_id"),
            state: r.get("state"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn put_node_state(&self, state: NodeState) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_node_state (workflow_id, node_id, state, updated_at)
               VALUES ($1, $2, $3, now())
               ON CONFLICT (workflow_id, node_id) DO UPDATE SET state = $3, updated_at = now()"#,
        )
        .bind(state.workflow_id)
        .bind(&state.node_id)
        .bind(&state.state)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn record_trace_step(&self, step: TraceStep) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_trace_steps
               (id, workflow_id, instance_run_id, node_id, timestamp, duration_micros, data, error)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(step.id)
        .bind(step.workflow_id)
        .bind(step.instance_run_id)
        .bind(&step.node_id)
        .bind(step.timestamp)
        .bind(step.duration_micros as i64)
        .bind(&step.data)
        .bind(&step.error)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn list_trace_steps(
        &self,
        workflow_id: Uuid,
        filter: ListFilter,
    ) -> Result<Page<TraceStep>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM hermod_trace_steps WHERE workflow_id = $1
               ORDER BY timestamp ASC OFFSET $2 LIMIT $3"#,
        )
        .bind(workflow_id)
        .bind(filter.offset() as i64)
        .bind(if filter.limit == 0 { 1_000_000i64 } else { filter.limit as i64 })
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;
        let total: i64 = sqlx::query("SELECT COUNT(*) AS c FROM hermod_trace_steps WHERE workflow_id = $1")
            .bind(workflow_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?
            .get("c");

        let items = rows
            .iter()
            .map(|r| TraceStep {
                id: r.get("id"),
                workflow_id: r.get("workflow_id"),
                instance_run_id: r.get("instance_run_id"),
                node_id: r.get("node_id"),
                timestamp: r.get("timestamp"),
                duration_micros: r.get::<i64, _>("duration_micros") as u64,
                data: r.get("data"),
                error: r.get("error"),
            })
            .collect();
        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn record_audit_log(&self, entry: AuditLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_audit_log (id, actor, action, entity_type, entity_id, detail)
               VALUES ($1, $2, $3, $4, $5, $6)"#,
        )
        .bind(entry.id)
        .bind(&entry.actor)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn list_audit_log(&self, filter: ListFilter) -> Result<Page<AuditLogEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM hermod_audit_log ORDER BY created_at DESC OFFSET $1 LIMIT $2",
        )
        .bind(filter.offset() as i64)
        .bind(if filter.limit == 0 { 1_000_000i64 } else { filter.limit as i64 })
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;
        let total: i64 = sqlx::query("SELECT COUNT(*) AS c FROM hermod_audit_log")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?
            .get("c");

        let items = rows
            .iter()
            .map(|r| AuditLogEntry {
                id: r.get("id"),
                actor: r.get("actor"),
                action: r.get("action"),
                entity_type: r.get("entity_type"),
                entity_id: r.get("entity_id"),
                detail: r.get("detail"),
                created_at: r.get("created_at"),
            })
            .collect();
        Ok(Page {
            items,
            total: total as u64,
        })
    }

    async fn create_approval(&self, approval: Approval) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_approvals
               (id, workflow_id, node_id, message_id, status, requested_at)
               VALUES ($1, $2, $3, $4, 'pending', $5)"#,
        )
        .bind(approval.id)
        .bind(approval.workflow_id)
        .bind(&approval.node_id)
        .bind(approval.message_id)
        .bind(approval.requested_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn resolve_approval(
        &self,
        id: Uuid,
        status: ApprovalStatus,
        resolved_by: &str,
    ) -> Result<Approval, StoreError> {
        let status_str = match status {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        };
        let row = sqlx::query(
            r#"UPDATE hermod_approvals
               SET status = $2, resolved_at = now(), resolved_by = $3
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(status_str)
        .bind(resolved_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?
        .ok_or(StoreError::NotFound(id))?;

        row_to_approval(&row)
    }

    async fn list_pending_approvals(&self, workflow_id: Uuid) -> Result<Vec<Approval>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM hermod_approvals WHERE workflow_id = $1 AND status = 'pending'",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;
        rows.iter().map(row_to_approval).collect()
    }

    async fn record_workflow_version(
        &self,
        snapshot: WorkflowVersionSnapshot,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_workflow_versions (id, workflow_id, version, definition)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(snapshot.id)
        .bind(snapshot.workflow_id)
        .bind(snapshot.version as i32)
        .bind(&snapshot.definition)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn acquire_lease(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE hermod_workflows
               SET owner_id = $2, lease_until = now() + $3::interval
               WHERE id = $1
                 AND (owner_id IS NULL OR lease_until < now() OR owner_id = $2)"#,
        )
        .bind(workflow_id)
        .bind(owner_id)
        .bind(format!("{} seconds", ttl.num_seconds()))
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn renew_lease(
        &self,
        workflow_id: Uuid,
        owner_id: &str,
        ttl: chrono::Duration,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"UPDATE hermod_workflows
               SET lease_until = now() + $3::interval
               WHERE id = $1 AND owner_id = $2 AND lease_until >= now()"#,
        )
        .bind(workflow_id)
        .bind(owner_id)
        .bind(format!("{} seconds", ttl.num_seconds()))
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_lease(&self, workflow_id: Uuid, owner_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE hermod_workflows SET owner_id = NULL, lease_until = NULL
               WHERE id = $1 AND owner_id = $2"#,
        )
        .bind(workflow_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn register_worker(&self, worker: Worker) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO hermod_workers (id, name, host, port, token, last_seen, cpu_usage, mem_usage)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               ON CONFLICT (id) DO UPDATE SET name = $2, host = $3, port = $4, token = $5, last_seen = $6"#,
        )
        .bind(&worker.id)
        .bind(&worker.name)
        .bind(&worker.host)
        .bind(worker.port as i32)
        .bind(&worker.token)
        .bind(worker.last_seen)
        .bind(worker.cpu_usage)
        .bind(worker.mem_usage)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn worker_heartbeat(
        &self,
        worker_id: &str,
        cpu_usage: f64,
        mem_usage: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE hermod_workers SET last_seen = now(), cpu_usage = $2, mem_usage = $3
               WHERE id = $1"#,
        )
        .bind(worker_id)
        .bind(cpu_usage)
        .bind(mem_usage)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        let rows = sqlx::query("SELECT * FROM hermod_workers")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database)?;
        Ok(rows
            .iter()
            .map(|r| Worker {
                id: r.get("id"),
                name: r.get("name"),
                host: r.get("host"),
                port: r.get::<i32, _>("port") as u16,
                token: r.get("token"),
                last_seen: r.get("last_seen"),
                cpu_usage: r.get("cpu_usage"),
                mem_usage: r.get("mem_usage"),
            })
            .collect())
    }

    async fn deregister_worker(&self, worker_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM hermod_workers WHERE id = $1")
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }
}

impl PostgresMetadataStore {
    fn row_to_connector(&self, row: sqlx::postgres::PgRow) -> Result<Connector, StoreError> {
        let config_value: serde_json::Value = row.get("config");
        let mut config = match config_value {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        decrypt_config(&mut config, &self.vault);

        Ok(Connector {
            id: row.get("id"),
            name: row.get("name"),
            kind: if row.get::<String, _>("kind") == "source" {
                ConnectorType::Source
            } else {
                ConnectorType::Sink
            },
            connector_type: row.get("connector_type"),
            vhost: row.get("vhost"),
            active: row.get("active"),
            status: row.get("status"),
            worker_id: row.get("worker_id"),
            config,
            sample: row.get("sample"),
            state: row.get("state"),
        })
    }
}

fn row_to_schema(row: &sqlx::postgres::PgRow) -> Result<Schema, StoreError> {
    let type_str: String = row.get("schema_type");
    Ok(Schema {
        id: row.get("id"),
        name: row.get("name"),
        version: row.get::<i32, _>("version") as u32,
        schema_type: match type_str.as_str() {
            "avro" => SchemaType::Avro,
            "protobuf" => SchemaType::Protobuf,
            _ => SchemaType::Json,
        },
        definition: row.get("definition"),
        created_at: row.get("created_at"),
    })
}

fn row_to_outbox_item(row: &sqlx::postgres::PgRow) -> Result<OutboxItem, StoreError> {
    let status_str: String = row.get("status");
    let failure_class_str: Option<String> = row.get("last_failure_class");
    Ok(OutboxItem {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        sink_id: row.get("sink_id"),
        node_id: row.get("node_id"),
        payload: row.get("payload"),
        status: match status_str.as_str() {
            "in_flight" => OutboxStatus::InFlight,
            "failed" => OutboxStatus::Failed,
            "dead" => OutboxStatus::Dead,
            _ => OutboxStatus::Pending,
        },
        attempts: row.get::<i32, _>("attempts") as u32,
        max_attempts: row.get::<i32, _>("max_attempts") as u32,
        last_error: row.get("last_error"),
        last_failure_class: failure_class_str.map(|s| {
            if s == "permanent" {
                FailureClass::Permanent
            } else {
                FailureClass::Transient
            }
        }),
        available_at: row.get("available_at"),
        claimed_by: row.get("claimed_by"),
        claimed_at: row.get("claimed_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_approval(row: &sqlx::postgres::PgRow) -> Result<Approval, StoreError> {
    let status_str: String = row.get("status");
    Ok(Approval {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        node_id: row.get("node_id"),
        message_id: row.get("message_id"),
        status: match status_str.as_str() {
            "approved" => ApprovalStatus::Approved,
            "rejected" => ApprovalStatus::Rejected,
            _ => ApprovalStatus::Pending,
        },
        requested_at: row.get("requested_at"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
    })
}

fn schema_type_str(t: SchemaType) -> &'static str {
    match t {
        SchemaType::Json => "json",
        SchemaType::Avro => "avro",
        SchemaType::Protobuf => "protobuf",
    }
}

fn failure_class_str(c: FailureClass) -> &'static str {
    match c {
        FailureClass::Transient => "transient",
        FailureClass::Permanent => "permanent",
    }
}
