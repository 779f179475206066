//! Tipos de consulta e suas durações

use sqlx::SqlitePool;
use validator::Validate;

use crate::error::{ClinicError, Result};
use crate::models::{AppointmentType, AppointmentTypeInput};

use super::ensure_affected;

pub async fn create(pool: &SqlitePool, input: AppointmentTypeInput) -> Result<AppointmentType> {
    input.validate()?;
    let result =
        sqlx::query("INSERT INTO tipos_consulta (nome, duracao_minutos, valor) VALUES (?, ?, ?)")
            .bind(input.nome.trim())
            .bind(input.duracao_minutos)
            .bind(input.valor)
            .execute(pool)
            .await?;
    get(pool, result.last_insert_rowid()).await
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<AppointmentType> {
    sqlx::query_as::<_, AppointmentType>(
        "SELECT id, nome, duracao_minutos, valor FROM tipos_consulta WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::NotFound(format!("Tipo de consulta {}", id)))
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<AppointmentType>> {
    let types = sqlx::query_as::<_, AppointmentType>(
        "SELECT id, nome, duracao_minutos, valor FROM tipos_consulta ORDER BY nome",
    )
    .fetch_all(pool)
    .await?;
    Ok(types)
}

/// Consultas desse tipo ficam sem tipo (e passam a usar a duração de reserva)
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM tipos_consulta WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Tipo de consulta", id)
}
