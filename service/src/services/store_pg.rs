// service/src/services/store_pg.rs

use crate::errors::{AppError, Result as AppResult};
use crate::models::{Enrollment, NewConfirmation, NewOrder, Order, PaymentConfirmation};
use crate::services::store::{check_capture_applicable, check_failable, FinalizeOutcome, PaymentStore};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info, instrument};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, order_number, student_id, program_id, base_amount, final_amount, currency, \
   status, gateway, gateway_order_id, gateway_transaction_id, failure_reason, created_at, updated_at";

const ENROLLMENT_COLUMNS: &str = "id, student_id, program_id, order_id, status, enrolled_at";

const CONFIRMATION_COLUMNS: &str = "gateway_payment_id, gateway_order_id, amount, currency, gateway_status, \
   payload, received_at, applied_at, last_error, parked_at";

/// Postgres-backed store. Runtime-checked queries; schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgPaymentStore {
  pool: PgPool,
}

impl PgPaymentStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str) -> AppResult<Self> {
    let pool = PgPool::connect(database_url).await.map_err(|e| {
      error!(error = %e, "Failed to connect to the database.");
      AppError::Sqlx(e)
    })?;
    info!("Successfully connected to the database.");
    Ok(Self::new(pool))
  }

  pub async fn run_migrations(&self) -> AppResult<()> {
    sqlx::migrate!("./migrations")
      .run(&self.pool)
      .await
      .map_err(|e| AppError::Sqlx(e.into()))?;
    info!("Database migrations applied.");
    Ok(())
  }
}

const ONE_PENDING_PER_ENROLLMENT: &str = "orders_one_pending_per_enrollment";

/// Names the conflict behind a unique violation on `orders`.
fn order_conflict_message(constraint: Option<&str>, new_order: &NewOrder) -> String {
  match constraint {
    Some(ONE_PENDING_PER_ENROLLMENT) => "Another checkout for this program is already in progress".to_string(),
    Some(name) if name.contains("gateway_order_id") => {
      format!("Order {} already exists", new_order.gateway_order_id)
    }
    Some(name) if name.contains("order_number") => {
      format!("Order number {} already exists", new_order.order_number)
    }
    _ => "Order conflicts with an existing order".to_string(),
  }
}

fn map_order_insert_error(err: sqlx::Error, new_order: &NewOrder) -> AppError {
  match &err {
    sqlx::Error::Database(db) if db.is_unique_violation() => {
      AppError::Conflict(order_conflict_message(db.constraint(), new_order))
    }
    _ => AppError::Sqlx(err),
  }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
  async fn find_enrollment(&self, student_id: Uuid, program_id: Uuid) -> AppResult<Option<Enrollment>> {
    let enrollment = sqlx::query_as(&format!(
      "SELECT {} FROM enrollments WHERE student_id = $1 AND program_id = $2",
      ENROLLMENT_COLUMNS
    ))
    .bind(student_id)
    .bind(program_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(enrollment)
  }

  async fn find_pending_order(&self, student_id: Uuid, program_id: Uuid) -> AppResult<Option<Order>> {
    let order = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE student_id = $1 AND program_id = $2 AND status = 'pending' \
       ORDER BY created_at DESC LIMIT 1",
      ORDER_COLUMNS
    ))
    .bind(student_id)
    .bind(program_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  #[instrument(name = "store::insert_order", skip(self, new_order), fields(gateway_order_id = %new_order.gateway_order_id), err(Display))]
  async fn insert_order(&self, new_order: NewOrder) -> AppResult<Order> {
    sqlx::query_as(&format!(
      "INSERT INTO orders (id, order_number, student_id, program_id, base_amount, final_amount, currency, \
         status, gateway, gateway_order_id, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $5, $6, 'pending', $7, $8, now(), now()) \
       RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&new_order.order_number)
    .bind(new_order.student_id)
    .bind(new_order.program_id)
    .bind(new_order.amount)
    .bind(&new_order.currency)
    .bind(&new_order.gateway)
    .bind(&new_order.gateway_order_id)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| map_order_insert_error(e, &new_order))
  }

  async fn find_order_by_gateway_id(&self, gateway_order_id: &str) -> AppResult<Option<Order>> {
    let order = sqlx::query_as(&format!("SELECT {} FROM orders WHERE gateway_order_id = $1", ORDER_COLUMNS))
      .bind(gateway_order_id)
      .fetch_optional(&self.pool)
      .await?;
    Ok(order)
  }

  async fn record_confirmation(&self, confirmation: NewConfirmation) -> AppResult<PaymentConfirmation> {
    let record = sqlx::query_as(&format!(
      "INSERT INTO payment_confirmations \
         (gateway_payment_id, gateway_order_id, amount, currency, gateway_status, payload, received_at) \
       VALUES ($1, $2, $3, $4, $5, $6, now()) \
       ON CONFLICT (gateway_payment_id) DO UPDATE SET \
         amount = EXCLUDED.amount, currency = EXCLUDED.currency, \
         gateway_status = EXCLUDED.gateway_status, payload = EXCLUDED.payload \
       RETURNING {}",
      CONFIRMATION_COLUMNS
    ))
    .bind(&confirmation.gateway_payment_id)
    .bind(&confirmation.gateway_order_id)
    .bind(confirmation.amount)
    .bind(&confirmation.currency)
    .bind(&confirmation.gateway_status)
    .bind(&confirmation.payload)
    .fetch_one(&self.pool)
    .await?;
    Ok(record)
  }

  #[instrument(name = "store::finalize_capture", skip(self), err(Display))]
  async fn finalize_capture(
    &self,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    captured_amount: i64,
  ) -> AppResult<FinalizeOutcome> {
    // Dropping `tx` on any early return rolls everything back.
    let mut tx = self.pool.begin().await?;

    let order: Option<Order> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE gateway_order_id = $1 FOR UPDATE",
      ORDER_COLUMNS
    ))
    .bind(gateway_order_id)
    .fetch_optional(&mut *tx)
    .await?;
    let order = order.ok_or_else(|| AppError::NotFound(format!("Order {} not found", gateway_order_id)))?;
    let already_applied = check_capture_applicable(&order, gateway_payment_id)?;

    let order: Order = if already_applied {
      order
    } else {
      sqlx::query_as(&format!(
        "UPDATE orders SET status = 'paid', gateway_transaction_id = $2, final_amount = $3, updated_at = now() \
         WHERE id = $1 RETURNING {}",
        ORDER_COLUMNS
      ))
      .bind(order.id)
      .bind(gateway_payment_id)
      .bind(captured_amount)
      .fetch_one(&mut *tx)
      .await?
    };

    sqlx::query(
      "INSERT INTO enrollments (id, student_id, program_id, order_id, status, enrolled_at) \
       VALUES ($1, $2, $3, $4, 'active', now()) \
       ON CONFLICT (student_id, program_id) DO NOTHING",
    )
    .bind(Uuid::new_v4())
    .bind(order.student_id)
    .bind(order.program_id)
    .bind(order.id)
    .execute(&mut *tx)
    .await?;

    let enrollment: Enrollment = sqlx::query_as(&format!(
      "SELECT {} FROM enrollments WHERE student_id = $1 AND program_id = $2",
      ENROLLMENT_COLUMNS
    ))
    .bind(order.student_id)
    .bind(order.program_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
      "UPDATE payment_confirmations SET applied_at = COALESCE(applied_at, now()), last_error = NULL \
       WHERE gateway_payment_id = $1",
    )
    .bind(gateway_payment_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(FinalizeOutcome {
      order,
      enrollment,
      already_applied,
    })
  }

  #[instrument(name = "store::mark_order_failed", skip(self), err(Display))]
  async fn mark_order_failed(&self, gateway_order_id: &str, reason: &str) -> AppResult<Order> {
    let mut tx = self.pool.begin().await?;
    let order: Option<Order> = sqlx::query_as(&format!(
      "SELECT {} FROM orders WHERE gateway_order_id = $1 FOR UPDATE",
      ORDER_COLUMNS
    ))
    .bind(gateway_order_id)
    .fetch_optional(&mut *tx)
    .await?;
    let order = order.ok_or_else(|| AppError::NotFound(format!("Order {} not found", gateway_order_id)))?;
    check_failable(&order)?;

    let failed: Order = sqlx::query_as(&format!(
      "UPDATE orders SET status = 'failed', failure_reason = $2, updated_at = now() WHERE id = $1 RETURNING {}",
      ORDER_COLUMNS
    ))
    .bind(order.id)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(failed)
  }

  async fn note_confirmation_error(&self, gateway_payment_id: &str, error: &str) -> AppResult<()> {
    sqlx::query("UPDATE payment_confirmations SET last_error = $2 WHERE gateway_payment_id = $1")
      .bind(gateway_payment_id)
      .bind(error)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn park_confirmation(&self, gateway_payment_id: &str, reason: &str) -> AppResult<()> {
    sqlx::query(
      "UPDATE payment_confirmations SET parked_at = COALESCE(parked_at, now()), last_error = $2 \
       WHERE gateway_payment_id = $1",
    )
    .bind(gateway_payment_id)
    .bind(reason)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn unapplied_confirmations(&self, limit: i64) -> AppResult<Vec<PaymentConfirmation>> {
    let records = sqlx::query_as(&format!(
      "SELECT {} FROM payment_confirmations WHERE applied_at IS NULL AND parked_at IS NULL \
       ORDER BY received_at ASC, gateway_payment_id ASC LIMIT $1",
      CONFIRMATION_COLUMNS
    ))
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;
    Ok(records)
  }
}
