//! Horários de atendimento dos médicos

use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::info;

use crate::error::Result;
use crate::format::time_to_db;
use crate::models::{WorkingHours, WorkingHoursInput};

use super::ensure_affected;

pub async fn add(pool: &SqlitePool, input: WorkingHoursInput) -> Result<i64> {
    let input = input.prepare()?;
    let result = sqlx::query(
        "INSERT INTO horarios_disponiveis (medico_id, dia_semana, hora_inicio, hora_fim)
         VALUES (?, ?, ?, ?)",
    )
    .bind(input.medico_id)
    .bind(input.dia_semana)
    .bind(time_to_db(input.hora_inicio))
    .bind(time_to_db(input.hora_fim))
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_for_doctor(pool: &SqlitePool, medico_id: i64) -> Result<Vec<WorkingHours>> {
    let rows = sqlx::query_as::<_, WorkingHours>(
        "SELECT id, medico_id, dia_semana, hora_inicio, hora_fim FROM horarios_disponiveis
         WHERE medico_id = ? ORDER BY dia_semana, hora_inicio",
    )
    .bind(medico_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_for_weekday<'e, E>(
    executor: E,
    medico_id: i64,
    dia_semana: i64,
) -> Result<Vec<WorkingHours>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, WorkingHours>(
        "SELECT id, medico_id, dia_semana, hora_inicio, hora_fim FROM horarios_disponiveis
         WHERE medico_id = ? AND dia_semana = ? ORDER BY hora_inicio",
    )
    .bind(medico_id)
    .bind(dia_semana)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM horarios_disponiveis WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Horário", id)
}

/// Troca todas as janelas de um dia da semana de uma vez
pub async fn replace_weekday(
    pool: &SqlitePool,
    medico_id: i64,
    dia_semana: i64,
    janelas: &[(chrono::NaiveTime, chrono::NaiveTime)],
) -> Result<()> {
    let inputs = janelas
        .iter()
        .map(|(inicio, fim)| {
            WorkingHoursInput {
                medico_id,
                dia_semana,
                hora_inicio: *inicio,
                hora_fim: *fim,
            }
            .prepare()
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM horarios_disponiveis WHERE medico_id = ? AND dia_semana = ?")
        .bind(medico_id)
        .bind(dia_semana)
        .execute(&mut *tx)
        .await?;
    for input in &inputs {
        sqlx::query(
            "INSERT INTO horarios_disponiveis (medico_id, dia_semana, hora_inicio, hora_fim)
             VALUES (?, ?, ?, ?)",
        )
        .bind(input.medico_id)
        .bind(input.dia_semana)
        .bind(time_to_db(input.hora_inicio))
        .bind(time_to_db(input.hora_fim))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(
        "Horários do médico {} no dia {} substituídos ({} janelas)",
        medico_id,
        dia_semana,
        inputs.len()
    );
    Ok(())
}
