//! Cadastro de médicos

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{ClinicError, Result};
use crate::models::{Doctor, DoctorInput};

use super::ensure_affected;

async fn ensure_crm_free(pool: &SqlitePool, crm: &str, except_id: Option<i64>) -> Result<()> {
    let existing: Option<(i64, String)> =
        sqlx::query_as("SELECT id, nome FROM medicos WHERE crm = ?")
            .bind(crm)
            .fetch_optional(pool)
            .await?;
    match existing {
        Some((id, nome)) if Some(id) != except_id => Err(ClinicError::Conflict(format!(
            "CRM {} já cadastrado para {}",
            crm, nome
        ))),
        _ => Ok(()),
    }
}

pub async fn create(pool: &SqlitePool, input: DoctorInput) -> Result<Doctor> {
    let input = input.prepare()?;
    ensure_crm_free(pool, &input.crm, None).await?;

    let result = sqlx::query(
        "INSERT INTO medicos (nome, especialidade, crm, telefone, usuario_id) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&input.nome)
    .bind(&input.especialidade)
    .bind(&input.crm)
    .bind(&input.telefone)
    .bind(input.usuario_id)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!("Médico {} cadastrado: {} ({})", id, input.nome, input.crm);
    get(pool, id).await
}

pub async fn update(pool: &SqlitePool, id: i64, input: DoctorInput) -> Result<Doctor> {
    let input = input.prepare()?;
    ensure_crm_free(pool, &input.crm, Some(id)).await?;

    let result = sqlx::query(
        "UPDATE medicos SET nome = ?, especialidade = ?, crm = ?, telefone = ?, usuario_id = ?
         WHERE id = ?",
    )
    .bind(&input.nome)
    .bind(&input.especialidade)
    .bind(&input.crm)
    .bind(&input.telefone)
    .bind(input.usuario_id)
    .bind(id)
    .execute(pool)
    .await?;

    ensure_affected(result.rows_affected(), "Médico", id)?;
    get(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM medicos WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Médico", id)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Doctor> {
    sqlx::query_as::<_, Doctor>(
        "SELECT id, nome, especialidade, crm, telefone, usuario_id FROM medicos WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::NotFound(format!("Médico {}", id)))
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Doctor>> {
    let doctors = sqlx::query_as::<_, Doctor>(
        "SELECT id, nome, especialidade, crm, telefone, usuario_id FROM medicos
         ORDER BY nome COLLATE NOCASE",
    )
    .fetch_all(pool)
    .await?;
    Ok(doctors)
}

/// Médico ligado a uma conta de usuário (tela do próprio médico)
pub async fn find_by_user(pool: &SqlitePool, usuario_id: i64) -> Result<Option<Doctor>> {
    let doctor = sqlx::query_as::<_, Doctor>(
        "SELECT id, nome, especialidade, crm, telefone, usuario_id FROM medicos WHERE usuario_id = ?",
    )
    .bind(usuario_id)
    .fetch_optional(pool)
    .await?;
    Ok(doctor)
}

/// Liga (ou desliga, com `None`) o médico a uma conta de usuário
pub async fn link_user(pool: &SqlitePool, id: i64, usuario_id: Option<i64>) -> Result<()> {
    let result = sqlx::query("UPDATE medicos SET usuario_id = ? WHERE id = ?")
        .bind(usuario_id)
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Médico", id)
}
