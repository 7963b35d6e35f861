use anyhow::{anyhow, Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use w3b_schemas::{AuditStatus, CommitmentAuditEntry, SerialRecord};

/// Env var used by DB-backed tests.
pub const ENV_DB_URL: &str = "W3B_DATABASE_URL";

/// Connect to Postgres. The URL comes from resolved secrets, never from config.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Connect using `W3B_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_serial_table: bool,
    pub has_audit_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let rows = sqlx::query(
        r#"
        select table_name::text as table_name
        from information_schema.tables
        where table_schema = 'public'
          and table_name in ('serial_records', 'commitment_audit')
        "#,
    )
    .fetch_all(pool)
    .await
    .context("status table-exists query failed")?;

    let mut has_serial_table = false;
    let mut has_audit_table = false;
    for row in rows {
        let name: String = row.try_get("table_name")?;
        match name.as_str() {
            "serial_records" => has_serial_table = true,
            "commitment_audit" => has_audit_table = true,
            _ => {}
        }
    }

    Ok(DbStatus {
        ok: one == 1,
        has_serial_table,
        has_audit_table,
    })
}

// ---------------------------------------------------------------------------
// Serial ledger
// ---------------------------------------------------------------------------

/// Every serial number, ordered ascending by byte value.
pub async fn fetch_serial_numbers(pool: &PgPool) -> Result<Vec<String>> {
    let rows = sqlx::query(
        r#"
        select serial_number
        from serial_records
        order by serial_number collate "C" asc
        "#,
    )
    .fetch_all(pool)
    .await
    .context("fetch_serial_numbers failed")?;

    rows.iter()
        .map(|r| r.try_get::<String, _>("serial_number").map_err(Into::into))
        .collect()
}

/// Insert a serial row. Returns `false` if the serial already existed.
///
/// Ingestion is owned elsewhere; this exists for fixtures and operator repair.
pub async fn insert_serial(pool: &PgPool, rec: &SerialRecord) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into serial_records (serial_number, batch_id, included_in_commitment)
        values ($1, $2, $3)
        on conflict (serial_number) do nothing
        "#,
    )
    .bind(&rec.serial_number)
    .bind(&rec.batch_id)
    .bind(&rec.included_in_commitment)
    .execute(pool)
    .await
    .context("insert_serial failed")?;
    Ok(res.rows_affected() == 1)
}

pub async fn fetch_serial(pool: &PgPool, serial_number: &str) -> Result<Option<SerialRecord>> {
    let row = sqlx::query(
        r#"
        select serial_number, batch_id, included_in_commitment
        from serial_records
        where serial_number = $1
        "#,
    )
    .bind(serial_number)
    .fetch_optional(pool)
    .await
    .context("fetch_serial failed")?;

    row.map(|r| {
        Ok(SerialRecord {
            serial_number: r.try_get("serial_number")?,
            batch_id: r.try_get("batch_id")?,
            included_in_commitment: r.try_get("included_in_commitment")?,
        })
    })
    .transpose()
}

/// Stamp not-yet-stamped rows among `serials` with `root_hex`.
///
/// Rows ingested after the ledger read are left alone; the next run picks
/// them up. Returns the number of rows stamped.
pub async fn stamp_unreconciled_serials(
    pool: &PgPool,
    root_hex: &str,
    serials: &[String],
) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update serial_records
        set included_in_commitment = $1
        where included_in_commitment is null
          and serial_number = any($2)
        "#,
    )
    .bind(root_hex)
    .bind(serials)
    .execute(pool)
    .await
    .context("stamp_unreconciled_serials failed")?;
    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Commitment audit
// ---------------------------------------------------------------------------

/// Idempotent on `root_hash`. Status only moves forward
/// (PUBLISHED -> ATTESTED -> COMPLETE); a known signature is never erased.
pub async fn upsert_commitment_audit(pool: &PgPool, entry: &CommitmentAuditEntry) -> Result<()> {
    let total = i64::try_from(entry.total_serials)
        .map_err(|_| anyhow!("total_serials {} exceeds i64", entry.total_serials))?;

    sqlx::query(
        r#"
        insert into commitment_audit (root_hash, total_serials, on_chain_tx_signature, status)
        values ($1, $2, $3, $4)
        on conflict (root_hash) do update
        set total_serials = excluded.total_serials,
            on_chain_tx_signature = coalesce(excluded.on_chain_tx_signature,
                                             commitment_audit.on_chain_tx_signature),
            status = case
                when array_position(array['PUBLISHED','ATTESTED','COMPLETE'], excluded.status)
                   > array_position(array['PUBLISHED','ATTESTED','COMPLETE'], commitment_audit.status)
                then excluded.status
                else commitment_audit.status
            end,
            updated_at = now()
        "#,
    )
    .bind(&entry.root_hash)
    .bind(total)
    .bind(&entry.on_chain_tx_signature)
    .bind(entry.status.as_str())
    .execute(pool)
    .await
    .context("upsert_commitment_audit failed")?;
    Ok(())
}

pub async fn fetch_commitment_audit(
    pool: &PgPool,
    root_hash: &str,
) -> Result<Option<CommitmentAuditEntry>> {
    let row = sqlx::query(
        r#"
        select root_hash, total_serials, on_chain_tx_signature, status
        from commitment_audit
        where root_hash = $1
        "#,
    )
    .bind(root_hash)
    .fetch_optional(pool)
    .await
    .context("fetch_commitment_audit failed")?;

    let Some(r) = row else {
        return Ok(None);
    };

    let total: i64 = r.try_get("total_serials")?;
    let status: String = r.try_get("status")?;
    Ok(Some(CommitmentAuditEntry {
        root_hash: r.try_get("root_hash")?,
        total_serials: u64::try_from(total)
            .map_err(|_| anyhow!("negative total_serials {total} in commitment_audit"))?,
        on_chain_tx_signature: r.try_get("on_chain_tx_signature")?,
        status: AuditStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown commitment_audit status '{status}'"))?,
    }))
}

pub async fn count_commitment_audit_rows(pool: &PgPool, root_hash: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        "select count(*)::bigint from commitment_audit where root_hash = $1",
    )
    .bind(root_hash)
    .fetch_one(pool)
    .await
    .context("count_commitment_audit_rows failed")?;
    Ok(n)
}
