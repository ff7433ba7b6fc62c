use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowpay_core::{LedgerStore, PaymentKind, PaymentRecord, PaymentStatus, Project};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

const SCHEMA: [&str; 8] = [
    r#"
    CREATE TABLE IF NOT EXISTS escrow_projects (
        id UUID PRIMARY KEY,
        status TEXT NOT NULL,
        document JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS escrow_milestones (
        id UUID PRIMARY KEY,
        project_id UUID NOT NULL REFERENCES escrow_projects (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS escrow_payments (
        id UUID PRIMARY KEY,
        project_id UUID NOT NULL,
        milestone_id UUID,
        kind TEXT NOT NULL,
        amount NUMERIC NOT NULL,
        from_party TEXT NOT NULL,
        to_party TEXT NOT NULL,
        tx_ref TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        confirmed_at TIMESTAMPTZ
    )
    "#,
    // Unconstrained so stored amounts keep the exact scale of the Decimal.
    "ALTER TABLE escrow_payments ALTER COLUMN amount TYPE NUMERIC",
    "CREATE INDEX IF NOT EXISTS escrow_payments_project ON escrow_payments (project_id)",
    "CREATE INDEX IF NOT EXISTS escrow_projects_created ON escrow_projects (created_at DESC)",
    // At most one lock per project and one release per milestone, even if two
    // coordinators ever share a database.
    "CREATE UNIQUE INDEX IF NOT EXISTS escrow_payments_single_lock ON escrow_payments (project_id) WHERE kind = 'escrow_lock'",
    "CREATE UNIQUE INDEX IF NOT EXISTS escrow_payments_single_release ON escrow_payments (milestone_id) WHERE kind = 'milestone_release'",
];

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to apply escrow schema")?;
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn insert_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO escrow_projects (id, status, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(project.id)
        .bind(project.status.as_str())
        .bind(Json(project))
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await?;

        for milestone in &project.milestones {
            sqlx::query("INSERT INTO escrow_milestones (id, project_id) VALUES ($1, $2)")
                .bind(milestone.id)
                .bind(project.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn project(&self, project_id: Uuid) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query("SELECT document FROM escrow_projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let Json(project): Json<Project> = row.try_get("document")?;
        Ok(Some(project))
    }

    async fn projects(&self, party: Option<&str>) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query(
            r#"
            SELECT document FROM escrow_projects
            WHERE $1::TEXT IS NULL
               OR document->>'client' = $1
               OR document->>'freelancer' = $1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(party)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let Json(project): Json<Project> = row.try_get("document")?;
                Ok(project)
            })
            .collect()
    }

    async fn project_for_milestone(&self, milestone_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        let project_id =
            sqlx::query_scalar("SELECT project_id FROM escrow_milestones WHERE id = $1")
                .bind(milestone_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(project_id)
    }

    async fn payments(&self, project_id: Uuid) -> anyhow::Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, project_id, milestone_id, kind, amount, from_party, to_party, tx_ref,
                   status, created_at, confirmed_at
            FROM escrow_payments
            WHERE project_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }

    async fn commit(
        &self,
        project: &Project,
        payment: Option<&PaymentRecord>,
    ) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(record) = payment {
            sqlx::query(
                r#"
                INSERT INTO escrow_payments (
                    id, project_id, milestone_id, kind, amount, from_party, to_party, tx_ref,
                    status, created_at, confirmed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                "#,
            )
            .bind(record.id)
            .bind(record.project_id)
            .bind(record.milestone_id)
            .bind(record.kind.as_str())
            .bind(record.amount)
            .bind(&record.from)
            .bind(&record.to)
            .bind(&record.tx_ref)
            .bind(record.status.as_str())
            .bind(record.created_at)
            .bind(record.confirmed_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to append {} record", record.kind))?;
        }

        let updated = sqlx::query(
            r#"
            UPDATE escrow_projects
            SET status = $2, document = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(project.status.as_str())
        .bind(Json(project))
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            anyhow::bail!("project {} not found", project.id);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn has_payment(
        &self,
        project_id: Uuid,
        milestone_id: Option<Uuid>,
        kind: PaymentKind,
    ) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM escrow_payments
                WHERE project_id = $1
                  AND milestone_id IS NOT DISTINCT FROM $2
                  AND kind = $3
            )
            "#,
        )
        .bind(project_id)
        .bind(milestone_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}

fn payment_from_row(row: &PgRow) -> anyhow::Result<PaymentRecord> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let amount: Decimal = row.try_get("amount")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(PaymentRecord {
        id: row.try_get("id")?,
        project_id: row.try_get("project_id")?,
        milestone_id: row.try_get("milestone_id")?,
        kind: kind.parse::<PaymentKind>()?,
        amount: amount.normalize(),
        from: row.try_get("from_party")?,
        to: row.try_get("to_party")?,
        tx_ref: row.try_get("tx_ref")?,
        status: status.parse::<PaymentStatus>()?,
        created_at,
        confirmed_at: row.try_get("confirmed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_amounts_are_not_rounded() {
        let payments = SCHEMA
            .iter()
            .find(|statement| statement.contains("CREATE TABLE IF NOT EXISTS escrow_payments"))
            .unwrap();
        assert!(payments.contains("amount NUMERIC NOT NULL"));
        assert!(!SCHEMA.iter().any(|statement| statement.contains("NUMERIC(")));
        assert!(SCHEMA.contains(&"ALTER TABLE escrow_payments ALTER COLUMN amount TYPE NUMERIC"));
    }
}
