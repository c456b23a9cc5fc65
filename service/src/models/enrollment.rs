// service/src/models/enrollment.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

pub const ENROLLMENT_ACTIVE: &str = "active";

/// Links a student to a program. Unique per (student_id, program_id).
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
  pub id: Uuid,
  pub student_id: Uuid,
  pub program_id: Uuid,
  pub order_id: Option<Uuid>,
  pub status: String,
  pub enrolled_at: DateTime<Utc>,
}
