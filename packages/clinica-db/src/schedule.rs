//! Verificação de disponibilidade de horário na agenda
//!
//! Um pedido `[início, início + duração)` só é aceito se couber inteiro em
//! uma única janela de atendimento do médico naquele dia da semana e não
//! sobrepor nenhuma consulta já marcada. Janelas vizinhas não são unidas.

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, FromRow, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, error};

use crate::error::Result;
use crate::format::{self, TimeValue};
use crate::models::{decode_time, WorkingHours};
use crate::repo::working_hours;

/// Duração mínima assumida para consulta sem tipo conhecido
pub const MIN_FALLBACK_MINUTES: i64 = 10;

/// Pedido de horário
#[derive(Debug, Clone, PartialEq)]
pub struct SlotRequest {
    pub medico_id: i64,
    pub data: NaiveDate,
    pub hora: NaiveTime,
    pub duracao_minutos: i64,
    /// Consulta em edição, que não conflita consigo mesma
    pub excluir_consulta_id: Option<i64>,
}

/// Consulta já marcada, com a duração do seu tipo quando existir
#[derive(Debug, Clone, PartialEq)]
pub struct BookedSlot {
    pub consulta_id: i64,
    pub hora: TimeValue,
    pub duracao_tipo: Option<i64>,
}

impl FromRow<'_, SqliteRow> for BookedSlot {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            consulta_id: row.try_get("id")?,
            hora: decode_time(row, "hora")?,
            duracao_tipo: row.try_get("duracao_tipo")?,
        })
    }
}

/// Resultado da verificação
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "resultado", rename_all = "snake_case")]
pub enum SlotVerdict {
    Available,
    OutsideWorkingHours,
    Conflict { consulta_id: i64, inicio_minutos: i64 },
    /// Erro de banco convertido em falha genérica
    Failed { motivo: String },
}

impl SlotVerdict {
    pub fn is_available(&self) -> bool {
        matches!(self, SlotVerdict::Available)
    }

    /// Mensagem para a tela
    pub fn message(&self) -> String {
        match self {
            SlotVerdict::Available => "Horário disponível".to_string(),
            SlotVerdict::OutsideWorkingHours => "Médico não atende neste horário".to_string(),
            SlotVerdict::Conflict { inicio_minutos, .. } => format!(
                "Conflito com consulta existente às {}",
                format::format_minutes(*inicio_minutos)
            ),
            SlotVerdict::Failed { .. } => "Erro ao validar horário".to_string(),
        }
    }

    /// Par (disponível, mensagem) usado pelos formulários
    pub fn as_pair(&self) -> (bool, String) {
        (self.is_available(), self.message())
    }
}

/// Dia da semana com segunda = 0 ... domingo = 6
pub fn weekday_index(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_monday())
}

fn valid_duration(minutos: i64) -> bool {
    (1..=format::MINUTES_PER_DAY).contains(&minutos)
}

fn time_minutes(t: NaiveTime) -> i64 {
    TimeValue::Time(t).minutes().unwrap_or_default()
}

fn within_some_window(start: i64, end: i64, windows: &[&WorkingHours]) -> bool {
    windows.iter().any(|w| {
        match (w.hora_inicio.minutes(), w.hora_fim.minutes()) {
            (Some(inicio), Some(fim)) => inicio <= start && end <= fim,
            // Janela ilegível não contém nada
            _ => false,
        }
    })
}

/// Verifica o pedido contra as janelas do médico e as consultas do dia
///
/// `windows` pode trazer janelas de outros dias ou médicos; só as do
/// médico e do dia da semana do pedido contam. `booked` deve conter as
/// consultas do médico na data.
pub fn check_slot(req: &SlotRequest, windows: &[WorkingHours], booked: &[BookedSlot]) -> SlotVerdict {
    // Duração fora de um dia não cabe em janela alguma
    if !valid_duration(req.duracao_minutos) {
        return SlotVerdict::OutsideWorkingHours;
    }
    let start = time_minutes(req.hora);
    let end = start + req.duracao_minutos;
    let dia = weekday_index(req.data);

    let janelas: Vec<&WorkingHours> = windows
        .iter()
        .filter(|w| w.medico_id == req.medico_id && w.dia_semana == dia)
        .collect();

    if !within_some_window(start, end, &janelas) {
        return SlotVerdict::OutsideWorkingHours;
    }

    let fallback = req.duracao_minutos.max(MIN_FALLBACK_MINUTES);

    let mut existentes: Vec<(i64, i64, i64)> = booked
        .iter()
        .filter(|b| Some(b.consulta_id) != req.excluir_consulta_id)
        .filter_map(|b| {
            // Horário ilegível: registro ignorado
            let inicio = b.hora.minutes()?;
            let duracao = b.duracao_tipo.unwrap_or(fallback);
            Some((inicio, inicio.saturating_add(duracao), b.consulta_id))
        })
        .collect();
    existentes.sort();

    for (ex_start, ex_end, consulta_id) in existentes {
        if start < ex_end && ex_start < end {
            return SlotVerdict::Conflict {
                consulta_id,
                inicio_minutos: ex_start,
            };
        }
    }

    SlotVerdict::Available
}

/// Inícios possíveis, andando `passo_minutos` a partir do começo de cada janela
pub fn free_starts(
    medico_id: i64,
    data: NaiveDate,
    duracao_minutos: i64,
    passo_minutos: i64,
    windows: &[WorkingHours],
    booked: &[BookedSlot],
) -> Vec<NaiveTime> {
    let passo = passo_minutos.max(1);
    let dia = weekday_index(data);
    let mut livres = Vec::new();
    if !valid_duration(duracao_minutos) {
        return livres;
    }

    for janela in windows
        .iter()
        .filter(|w| w.medico_id == medico_id && w.dia_semana == dia)
    {
        let (Some(inicio), Some(fim)) = (janela.hora_inicio.minutes(), janela.hora_fim.minutes())
        else {
            continue;
        };
        let mut cursor = inicio;
        while cursor <= fim - duracao_minutos {
            if let Some(hora) = format::minutes_to_time(cursor) {
                let req = SlotRequest {
                    medico_id,
                    data,
                    hora,
                    duracao_minutos,
                    excluir_consulta_id: None,
                };
                if check_slot(&req, windows, booked).is_available() {
                    livres.push(hora);
                }
            }
            cursor = cursor.saturating_add(passo);
        }
    }

    livres.sort();
    livres.dedup();
    livres
}

/// Consultas do médico na data, com a duração do tipo (quando houver)
pub async fn load_booked<'e, E>(
    executor: E,
    medico_id: i64,
    data: NaiveDate,
    excluir_consulta_id: Option<i64>,
) -> Result<Vec<BookedSlot>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, BookedSlot>(
        "SELECT c.id, c.hora, t.duracao_minutos AS duracao_tipo
         FROM consultas c
         LEFT JOIN tipos_consulta t ON t.id = c.tipo_consulta_id
         WHERE c.medico_id = ? AND c.data = ? AND (? IS NULL OR c.id <> ?)
         ORDER BY c.hora",
    )
    .bind(medico_id)
    .bind(data)
    .bind(excluir_consulta_id)
    .bind(excluir_consulta_id)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

/// Verificação completa no banco, propagando erros
pub async fn try_check_slot(pool: &SqlitePool, req: &SlotRequest) -> Result<SlotVerdict> {
    let mut conn = pool.acquire().await?;
    check_slot_on(&mut *conn, req).await
}

/// Mesma verificação sobre uma conexão; dentro de uma transação, quem grava
/// a consulta enxerga a agenda que foi verificada
pub async fn check_slot_on(conn: &mut SqliteConnection, req: &SlotRequest) -> Result<SlotVerdict> {
    let windows =
        working_hours::list_for_weekday(&mut *conn, req.medico_id, weekday_index(req.data)).await?;
    let booked = load_booked(&mut *conn, req.medico_id, req.data, req.excluir_consulta_id).await?;
    let verdict = check_slot(req, &windows, &booked);
    debug!(
        medico_id = req.medico_id,
        data = %req.data,
        hora = %req.hora,
        "verificação de horário: {}",
        verdict.message()
    );
    Ok(verdict)
}

/// Verificação para a tela: nunca devolve erro, só o veredito
pub async fn validate_slot(pool: &SqlitePool, req: &SlotRequest) -> SlotVerdict {
    match try_check_slot(pool, req).await {
        Ok(verdict) => verdict,
        Err(e) => {
            error!("Erro ao validar horário: {}", e);
            SlotVerdict::Failed {
                motivo: e.to_string(),
            }
        }
    }
}

/// Horários livres do médico na data
pub async fn free_slots(
    pool: &SqlitePool,
    medico_id: i64,
    data: NaiveDate,
    duracao_minutos: i64,
    passo_minutos: i64,
) -> Result<Vec<NaiveTime>> {
    let windows = working_hours::list_for_weekday(pool, medico_id, weekday_index(data)).await?;
    let booked = load_booked(pool, medico_id, data, None).await?;
    Ok(free_starts(
        medico_id,
        data,
        duracao_minutos,
        passo_minutos,
        &windows,
        &booked,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(id: i64, dia: i64, inicio: &str, fim: &str) -> WorkingHours {
        WorkingHours {
            id,
            medico_id: 1,
            dia_semana: dia,
            hora_inicio: TimeValue::from(inicio),
            hora_fim: TimeValue::from(fim),
        }
    }

    fn booked(id: i64, hora: &str, duracao: Option<i64>) -> BookedSlot {
        BookedSlot {
            consulta_id: id,
            hora: TimeValue::from(hora),
            duracao_tipo: duracao,
        }
    }

    fn request(hora: NaiveTime, duracao: i64) -> SlotRequest {
        SlotRequest {
            medico_id: 1,
            data: monday(),
            hora,
            duracao_minutos: duracao,
            excluir_consulta_id: None,
        }
    }

    #[test]
    fn weekday_starts_on_monday() {
        assert_eq!(weekday_index(monday()), 0);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()), 6);
    }

    #[test]
    fn worked_example() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        let existing = vec![booked(10, "09:00", Some(30))];

        let verdict = check_slot(&request(hm(9, 15), 20), &windows, &existing);
        assert_eq!(
            verdict,
            SlotVerdict::Conflict { consulta_id: 10, inicio_minutos: 540 }
        );
        assert_eq!(verdict.message(), "Conflito com consulta existente às 09:00");

        assert!(check_slot(&request(hm(9, 30), 20), &windows, &existing).is_available());

        let outside = check_slot(&request(hm(7, 30), 30), &windows, &existing);
        assert_eq!(outside, SlotVerdict::OutsideWorkingHours);
        assert_eq!(outside.as_pair(), (false, "Médico não atende neste horário".to_string()));
    }

    #[test]
    fn window_edges_are_inclusive() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        assert!(check_slot(&request(hm(8, 0), 30), &windows, &[]).is_available());
        assert!(check_slot(&request(hm(11, 30), 30), &windows, &[]).is_available());
        assert_eq!(
            check_slot(&request(hm(11, 45), 30), &windows, &[]),
            SlotVerdict::OutsideWorkingHours
        );
    }

    #[test]
    fn adjacent_windows_are_not_merged() {
        let windows = vec![window(1, 0, "08:00", "10:00"), window(2, 0, "10:00", "12:00")];
        assert!(check_slot(&request(hm(9, 0), 60), &windows, &[]).is_available());
        assert!(check_slot(&request(hm(10, 0), 60), &windows, &[]).is_available());
        assert_eq!(
            check_slot(&request(hm(9, 30), 60), &windows, &[]),
            SlotVerdict::OutsideWorkingHours
        );
    }

    #[test]
    fn windows_of_other_days_or_doctors_do_not_count() {
        let mut other_doctor = window(2, 0, "08:00", "12:00");
        other_doctor.medico_id = 2;
        let windows = vec![window(1, 1, "08:00", "12:00"), other_doctor];
        assert_eq!(
            check_slot(&request(hm(9, 0), 30), &windows, &[]),
            SlotVerdict::OutsideWorkingHours
        );
    }

    #[test]
    fn touching_appointments_do_not_overlap() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        let existing = vec![booked(10, "09:00", Some(30))];
        assert!(check_slot(&request(hm(8, 30), 30), &windows, &existing).is_available());
        assert!(check_slot(&request(hm(9, 30), 30), &windows, &existing).is_available());
        assert!(!check_slot(&request(hm(8, 31), 30), &windows, &existing).is_available());
        assert!(!check_slot(&request(hm(8, 0), 240), &windows, &existing).is_available());
    }

    #[test]
    fn unknown_type_uses_requested_duration_with_floor() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        let existing = vec![booked(10, "09:00", None)];

        // Pedido de 45 min: a existente vale 45 min, ocupa até 09:45
        assert!(!check_slot(&request(hm(9, 40), 45), &windows, &existing).is_available());
        assert!(check_slot(&request(hm(9, 45), 45), &windows, &existing).is_available());

        // Pedido de 5 min: a existente vale o piso de 10 min
        assert!(!check_slot(&request(hm(9, 5), 5), &windows, &existing).is_available());
        assert!(check_slot(&request(hm(9, 10), 5), &windows, &existing).is_available());
    }

    #[test]
    fn excluded_appointment_does_not_conflict_with_itself() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        let existing = vec![booked(10, "09:00", Some(30))];
        let mut req = request(hm(9, 10), 30);
        assert!(!check_slot(&req, &windows, &existing).is_available());
        req.excluir_consulta_id = Some(10);
        assert!(check_slot(&req, &windows, &existing).is_available());
    }

    #[test]
    fn unreadable_records_are_skipped() {
        let windows = vec![
            window(1, 0, "oito horas", "12:00"),
            window(2, 0, "13:00", "17:00"),
        ];
        assert_eq!(
            check_slot(&request(hm(9, 0), 30), &windows, &[]),
            SlotVerdict::OutsideWorkingHours
        );

        let existing = vec![booked(10, "??", Some(30))];
        assert!(check_slot(&request(hm(13, 0), 30), &windows, &existing).is_available());
    }

    #[test]
    fn mixed_time_representations_are_understood() {
        let windows = vec![WorkingHours {
            id: 1,
            medico_id: 1,
            dia_semana: 0,
            hora_inicio: TimeValue::Seconds(8 * 3600),
            hora_fim: TimeValue::DayFraction(0.5),
        }];
        let existing = vec![BookedSlot {
            consulta_id: 10,
            hora: TimeValue::Time(hm(9, 0)),
            duracao_tipo: Some(30),
        }];
        assert!(check_slot(&request(hm(11, 0), 60), &windows, &existing).is_available());
        assert!(!check_slot(&request(hm(9, 15), 10), &windows, &existing).is_available());
    }

    #[test]
    fn first_conflict_in_time_order_is_reported() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        let existing = vec![booked(11, "10:00", Some(30)), booked(10, "09:00", Some(30))];
        assert_eq!(
            check_slot(&request(hm(8, 45), 120), &windows, &existing),
            SlotVerdict::Conflict { consulta_id: 10, inicio_minutos: 540 }
        );
    }

    #[test]
    fn request_past_midnight_never_fits() {
        let windows = vec![window(1, 0, "18:00", "23:59")];
        assert_eq!(
            check_slot(&request(hm(23, 30), 60), &windows, &[]),
            SlotVerdict::OutsideWorkingHours
        );
    }

    #[test]
    fn free_starts_skip_busy_times() {
        let windows = vec![window(1, 0, "08:00", "10:00")];
        let existing = vec![booked(10, "09:00", Some(30))];
        let livres = free_starts(1, monday(), 30, 30, &windows, &existing);
        assert_eq!(livres, vec![hm(8, 0), hm(8, 30), hm(9, 30)]);
    }

    #[test]
    fn durations_outside_one_day_are_refused() {
        let windows = vec![window(1, 0, "00:00", "23:59")];
        for duracao in [0, -30, format::MINUTES_PER_DAY + 1, i64::MAX, i64::MIN] {
            assert_eq!(
                check_slot(&request(hm(9, 0), duracao), &windows, &[]),
                SlotVerdict::OutsideWorkingHours
            );
            assert!(free_starts(1, monday(), duracao, 30, &windows, &[]).is_empty());
        }
    }

    #[test]
    fn huge_booked_duration_blocks_rest_of_day() {
        let windows = vec![window(1, 0, "08:00", "12:00")];
        let existing = vec![booked(10, "09:00", Some(i64::MAX))];
        assert!(check_slot(&request(hm(8, 0), 30), &windows, &existing).is_available());
        assert_eq!(
            check_slot(&request(hm(11, 0), 30), &windows, &existing),
            SlotVerdict::Conflict { consulta_id: 10, inicio_minutos: 540 }
        );
        assert_eq!(free_starts(1, monday(), 30, i64::MAX, &windows, &existing), vec![hm(8, 0)]);
    }
}
