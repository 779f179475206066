//! Agendamento de consultas
//!
//! Criar e remarcar passam antes pela verificação de horário; um pedido
//! recusado vira `ClinicError::Conflict` com a mensagem do veredito.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::error::{ClinicError, Result};
use crate::format::time_to_db;
use crate::models::{AgendaEntry, Appointment, AppointmentInput};
use crate::repo::appointment_types;
use crate::schedule::{self, SlotRequest};

use super::ensure_affected;

const COLUMNS: &str = "id, paciente_id, medico_id, data, hora, status, observacoes, tipo_consulta_id";

/// Duração pedida: a do tipo, quando o tipo existe; senão a do formulário
async fn requested_duration(pool: &SqlitePool, input: &AppointmentInput) -> Result<i64> {
    match input.tipo_consulta_id {
        Some(tipo_id) => match appointment_types::get(pool, tipo_id).await {
            Ok(tipo) => Ok(tipo.duracao_minutos),
            Err(ClinicError::NotFound(_)) => Ok(input.duracao_minutos),
            Err(e) => Err(e),
        },
        None => Ok(input.duracao_minutos),
    }
}

async fn ensure_slot(
    conn: &mut SqliteConnection,
    input: &AppointmentInput,
    duracao_minutos: i64,
    excluir: Option<i64>,
) -> Result<()> {
    let req = SlotRequest {
        medico_id: input.medico_id,
        data: input.data,
        hora: input.hora,
        duracao_minutos,
        excluir_consulta_id: excluir,
    };
    let verdict = schedule::check_slot_on(conn, &req).await?;
    if !verdict.is_available() {
        warn!(
            "Horário recusado para médico {} em {} {}: {}",
            input.medico_id,
            input.data,
            input.hora,
            verdict.message()
        );
        return Err(ClinicError::Conflict(verdict.message()));
    }
    Ok(())
}

/// Agenda uma consulta
///
/// Não gera lançamento financeiro; o pagamento é registrado à parte.
pub async fn create(pool: &SqlitePool, input: AppointmentInput) -> Result<Appointment> {
    let input = input.prepare()?;
    let duracao = requested_duration(pool, &input).await?;

    let mut tx = pool.begin().await?;
    ensure_slot(&mut *tx, &input, duracao, None).await?;

    let result = sqlx::query(
        "INSERT INTO consultas (paciente_id, medico_id, data, hora, status, observacoes, tipo_consulta_id)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.paciente_id)
    .bind(input.medico_id)
    .bind(input.data)
    .bind(time_to_db(input.hora))
    .bind(&input.status)
    .bind(&input.observacoes)
    .bind(input.tipo_consulta_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let id = result.last_insert_rowid();
    info!(
        "Consulta {} agendada: paciente {} com médico {} em {} {}",
        id, input.paciente_id, input.medico_id, input.data, input.hora
    );
    get(pool, id).await
}

/// Remarca/edita; a própria consulta não conta como conflito
pub async fn update(pool: &SqlitePool, id: i64, input: AppointmentInput) -> Result<Appointment> {
    let input = input.prepare()?;
    get(pool, id).await?;
    let duracao = requested_duration(pool, &input).await?;

    let mut tx = pool.begin().await?;
    ensure_slot(&mut *tx, &input, duracao, Some(id)).await?;

    sqlx::query(
        "UPDATE consultas SET paciente_id = ?, medico_id = ?, data = ?, hora = ?, status = ?,
                observacoes = ?, tipo_consulta_id = ?
         WHERE id = ?",
    )
    .bind(input.paciente_id)
    .bind(input.medico_id)
    .bind(input.data)
    .bind(time_to_db(input.hora))
    .bind(&input.status)
    .bind(&input.observacoes)
    .bind(input.tipo_consulta_id)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    get(pool, id).await
}

pub async fn set_status(pool: &SqlitePool, id: i64, status: &str) -> Result<()> {
    let status = status.trim();
    if status.is_empty() {
        return Err(ClinicError::validation("status: obrigatório"));
    }
    let result = sqlx::query("UPDATE consultas SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Consulta", id)?;
    info!("Consulta {} agora está '{}'", id, status);
    Ok(())
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM consultas WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Consulta", id)
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Appointment> {
    sqlx::query_as::<_, Appointment>(&format!("SELECT {} FROM consultas WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ClinicError::NotFound(format!("Consulta {}", id)))
}

/// Consultas da data, de todos os médicos ou de um só
pub async fn list_by_date(
    pool: &SqlitePool,
    data: NaiveDate,
    medico_id: Option<i64>,
) -> Result<Vec<Appointment>> {
    let rows = sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {} FROM consultas WHERE data = ? AND (? IS NULL OR medico_id = ?)
         ORDER BY hora, id",
        COLUMNS
    ))
    .bind(data)
    .bind(medico_id)
    .bind(medico_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Histórico do paciente, mais recentes primeiro
pub async fn list_by_patient(pool: &SqlitePool, paciente_id: i64) -> Result<Vec<Appointment>> {
    let rows = sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {} FROM consultas WHERE paciente_id = ? ORDER BY data DESC, hora DESC",
        COLUMNS
    ))
    .bind(paciente_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Agenda do dia com nomes, para a tabela que se atualiza sozinha
pub async fn agenda(pool: &SqlitePool, data: NaiveDate) -> Result<Vec<AgendaEntry>> {
    let rows = sqlx::query_as::<_, AgendaEntry>(
        "SELECT c.id AS consulta_id, c.hora, p.nome AS paciente, m.nome AS medico, c.status,
                t.nome AS tipo
         FROM consultas c
         JOIN pacientes p ON p.id = c.paciente_id
         JOIN medicos m ON m.id = c.medico_id
         LEFT JOIN tipos_consulta t ON t.id = c.tipo_consulta_id
         WHERE c.data = ?
         ORDER BY c.hora, m.nome",
    )
    .bind(data)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::TimeValue;
    use crate::models::{AppointmentTypeInput, WorkingHoursInput, STATUS_AGENDADO, STATUS_CONFIRMADO};
    use crate::repo::working_hours;
    use crate::schedule::{validate_slot, SlotVerdict};
    use crate::test_support::{fresh_pool, sample_doctor, sample_patient};
    use chrono::NaiveTime;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct Setup {
        _dir: tempfile::TempDir,
        pool: SqlitePool,
        paciente_id: i64,
        medico_id: i64,
    }

    async fn setup() -> Setup {
        let (dir, pool) = fresh_pool().await;
        let patient = sample_patient(&pool).await;
        let doctor = sample_doctor(&pool).await;
        working_hours::add(
            &pool,
            WorkingHoursInput {
                medico_id: doctor.id,
                dia_semana: 0,
                hora_inicio: hm(8, 0),
                hora_fim: hm(12, 0),
            },
        )
        .await
        .unwrap();
        Setup {
            _dir: dir,
            pool,
            paciente_id: patient.id,
            medico_id: doctor.id,
        }
    }

    fn input(s: &Setup, hora: NaiveTime, duracao: i64) -> AppointmentInput {
        AppointmentInput {
            paciente_id: s.paciente_id,
            medico_id: s.medico_id,
            data: monday(),
            hora,
            duracao_minutos: duracao,
            status: STATUS_AGENDADO.into(),
            observacoes: None,
            tipo_consulta_id: None,
        }
    }

    #[tokio::test]
    async fn worked_example_against_the_database() -> Result<()> {
        let s = setup().await;
        let tipo = appointment_types::create(
            &s.pool,
            AppointmentTypeInput {
                nome: "Consulta".into(),
                duracao_minutos: 30,
                valor: 20000,
            },
        )
        .await?;

        let existing = create(
            &s.pool,
            AppointmentInput {
                tipo_consulta_id: Some(tipo.id),
                ..input(&s, hm(9, 0), 30)
            },
        )
        .await?;
        assert_eq!(existing.hora, TimeValue::Text("09:00:00".into()));

        let req = |hora, duracao| SlotRequest {
            medico_id: s.medico_id,
            data: monday(),
            hora,
            duracao_minutos: duracao,
            excluir_consulta_id: None,
        };

        let overlap = validate_slot(&s.pool, &req(hm(9, 15), 20)).await;
        assert!(matches!(overlap, SlotVerdict::Conflict { inicio_minutos: 540, .. }));
        assert!(validate_slot(&s.pool, &req(hm(9, 30), 20)).await.is_available());
        assert_eq!(
            validate_slot(&s.pool, &req(hm(7, 30), 30)).await,
            SlotVerdict::OutsideWorkingHours
        );

        let refused = create(&s.pool, input(&s, hm(9, 15), 20)).await;
        match refused {
            Err(ClinicError::Conflict(msg)) => {
                assert_eq!(msg, "Conflito com consulta existente às 09:00")
            }
            other => panic!("esperava conflito, veio {:?}", other),
        }
        create(&s.pool, input(&s, hm(9, 30), 20)).await?;
        Ok(())
    }

    #[tokio::test]
    async fn editing_does_not_conflict_with_itself() -> Result<()> {
        let s = setup().await;
        let consulta = create(&s.pool, input(&s, hm(10, 0), 30)).await?;

        let moved = update(&s.pool, consulta.id, input(&s, hm(10, 15), 30)).await?;
        assert_eq!(moved.hora.minutes(), Some(615));

        let outro = create(&s.pool, input(&s, hm(11, 0), 30)).await?;
        let clash = update(&s.pool, outro.id, input(&s, hm(10, 30), 30)).await;
        assert!(matches!(clash, Err(ClinicError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn agenda_lists_names_in_time_order() -> Result<()> {
        let s = setup().await;
        let late = create(&s.pool, input(&s, hm(11, 0), 30)).await?;
        let early = create(&s.pool, input(&s, hm(8, 0), 30)).await?;
        set_status(&s.pool, early.id, STATUS_CONFIRMADO).await?;

        let agenda = agenda(&s.pool, monday()).await?;
        assert_eq!(agenda.len(), 2);
        assert_eq!(agenda[0].consulta_id, early.id);
        assert_eq!(agenda[0].hora, "08:00");
        assert_eq!(agenda[0].status, STATUS_CONFIRMADO);
        assert_eq!(agenda[0].paciente, "Maria da Silva");
        assert_eq!(agenda[1].consulta_id, late.id);

        assert_eq!(list_by_date(&s.pool, monday(), Some(s.medico_id)).await?.len(), 2);
        assert_eq!(list_by_date(&s.pool, monday(), Some(s.medico_id + 100)).await?.len(), 0);
        assert_eq!(list_by_patient(&s.pool, s.paciente_id).await?.len(), 2);

        delete(&s.pool, late.id).await?;
        assert!(matches!(get(&s.pool, late.id).await, Err(ClinicError::NotFound(_))));
        assert!(set_status(&s.pool, late.id, STATUS_CONFIRMADO).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn legacy_time_encodings_still_block_slots() -> Result<()> {
        let s = setup().await;
        // Hora gravada como segundos desde a meia-noite por versões antigas
        sqlx::query(
            "INSERT INTO consultas (paciente_id, medico_id, data, hora, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(s.paciente_id)
        .bind(s.medico_id)
        .bind(monday())
        .bind(9 * 3600_i64)
        .bind(STATUS_AGENDADO)
        .execute(&s.pool)
        .await?;
        // Hora ilegível: ignorada
        sqlx::query(
            "INSERT INTO consultas (paciente_id, medico_id, data, hora, status) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(s.paciente_id)
        .bind(s.medico_id)
        .bind(monday())
        .bind("depois do almoço")
        .bind(STATUS_AGENDADO)
        .execute(&s.pool)
        .await?;

        let stored: Vec<String> = sqlx::query_scalar(
            "SELECT typeof(hora) FROM consultas WHERE medico_id = ? ORDER BY id",
        )
        .bind(s.medico_id)
        .fetch_all(&s.pool)
        .await?;
        assert_eq!(stored, vec!["integer", "text"]);

        assert!(matches!(
            create(&s.pool, input(&s, hm(9, 0), 20)).await,
            Err(ClinicError::Conflict(_))
        ));
        create(&s.pool, input(&s, hm(10, 0), 20)).await?;

        let livres = schedule::free_slots(&s.pool, s.medico_id, monday(), 30, 60).await?;
        assert_eq!(livres, vec![hm(8, 0), hm(11, 0)]);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_saves_cannot_double_book() -> Result<()> {
        let s = setup().await;
        let (a, b) = tokio::join!(
            create(&s.pool, input(&s, hm(9, 0), 30)),
            create(&s.pool, input(&s, hm(9, 15), 30)),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(list_by_date(&s.pool, monday(), Some(s.medico_id)).await?.len(), 1);
        Ok(())
    }
}
