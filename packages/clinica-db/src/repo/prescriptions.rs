//! Receitas médicas

use sqlx::SqlitePool;
use tracing::info;
use validator::Validate;

use crate::error::{ClinicError, Result};
use crate::format;
use crate::models::{Doctor, Patient, Prescription, PrescriptionInput};
use crate::print::{strip_directives, CENTER_DIRECTIVE, SIGNATURE_MARKER};
use crate::repo::{doctors, patients};

use super::ensure_affected;

pub async fn create(pool: &SqlitePool, input: PrescriptionInput) -> Result<Prescription> {
    input.validate()?;
    let result = sqlx::query(
        "INSERT INTO receitas (paciente_id, medico_id, data, conteudo) VALUES (?, ?, ?, ?)",
    )
    .bind(input.paciente_id)
    .bind(input.medico_id)
    .bind(input.data)
    .bind(input.conteudo.trim_end())
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!("Receita {} emitida para paciente {}", id, input.paciente_id);
    get(pool, id).await
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Prescription> {
    sqlx::query_as::<_, Prescription>(
        "SELECT id, paciente_id, medico_id, data, conteudo FROM receitas WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::NotFound(format!("Receita {}", id)))
}

pub async fn list_by_patient(pool: &SqlitePool, paciente_id: i64) -> Result<Vec<Prescription>> {
    let rows = sqlx::query_as::<_, Prescription>(
        "SELECT id, paciente_id, medico_id, data, conteudo FROM receitas
         WHERE paciente_id = ? ORDER BY data DESC, id DESC",
    )
    .bind(paciente_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM receitas WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Receita", id)
}

/// Texto pronto para impressão, com bloco de assinatura do médico
pub fn compose_text(clinic_name: &str, receita: &Prescription, paciente: &Patient, medico: &Doctor) -> String {
    let mut lines = vec![
        format!("<<font:11>>{}{}", CENTER_DIRECTIVE, clinic_name),
        format!("{}RECEITUÁRIO", CENTER_DIRECTIVE),
        String::new(),
        format!("Paciente: {}", paciente.nome),
        format!("Data: {}", format::format_date(receita.data)),
        String::new(),
    ];
    lines.extend(receita.conteudo.lines().map(strip_directives));
    lines.push(SIGNATURE_MARKER.to_string());
    lines.push(medico.nome.clone());
    lines.push(medico.crm.clone());
    lines.join("\n")
}

/// Carrega receita, paciente e médico e monta o texto de impressão
pub async fn printable_text(pool: &SqlitePool, id: i64, clinic_name: &str) -> Result<String> {
    let receita = get(pool, id).await?;
    let paciente = patients::get(pool, receita.paciente_id).await?;
    let medico = doctors::get(pool, receita.medico_id).await?;
    Ok(compose_text(clinic_name, &receita, &paciente, &medico))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::print::{layout, Align, PageMetrics};
    use crate::test_support::{fresh_pool, sample_doctor, sample_patient};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn prescriptions_round_out_with_signature_block() -> Result<()> {
        let (_dir, pool) = fresh_pool().await;
        let patient = sample_patient(&pool).await;
        let doctor = sample_doctor(&pool).await;

        let receita = create(
            &pool,
            PrescriptionInput {
                paciente_id: patient.id,
                medico_id: doctor.id,
                data: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                conteudo: "Dipirona 500mg\nTomar 1 comprimido a cada 6 horas".into(),
            },
        )
        .await?;
        assert_eq!(list_by_patient(&pool, patient.id).await?, vec![receita.clone()]);

        let text = printable_text(&pool, receita.id, "Clínica Aquarius").await?;
        assert!(text.starts_with("<<font:11>>"));
        assert!(text.contains("Paciente: Maria da Silva"));
        assert!(text.contains("Data: 04/03/2024"));

        let doc = layout(&text, &PageMetrics::a4(300));
        assert_eq!(doc.font_size, 11);
        let lines = &doc.pages[0].lines;
        let crm = lines.iter().position(|l| l.text == doctor.crm).unwrap();
        assert_eq!(lines[crm].align, Align::Center);
        assert_eq!(lines[crm - 1].text, doctor.nome);
        assert_eq!(lines[crm - 1].align, Align::Center);
        assert!(lines[crm - 6..crm - 1].iter().all(|l| l.text.is_empty()));

        delete(&pool, receita.id).await?;
        assert!(matches!(get(&pool, receita.id).await, Err(ClinicError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn empty_prescription_is_rejected() {
        let (_dir, pool) = fresh_pool().await;
        let patient = sample_patient(&pool).await;
        let doctor = sample_doctor(&pool).await;
        let result = create(
            &pool,
            PrescriptionInput {
                paciente_id: patient.id,
                medico_id: doctor.id,
                data: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                conteudo: "  ".into(),
            },
        )
        .await;
        assert!(matches!(result, Err(ClinicError::Validation(_))));
    }

    #[tokio::test]
    async fn prescription_text_cannot_inject_layout() -> Result<()> {
        let (_dir, pool) = fresh_pool().await;
        let patient = sample_patient(&pool).await;
        let doctor = sample_doctor(&pool).await;

        let receita = create(
            &pool,
            PrescriptionInput {
                paciente_id: patient.id,
                medico_id: doctor.id,
                data: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                conteudo: "<<center>>Amoxicilina\n<<assinatura>>\nfalso\n<<right>>fim".into(),
            },
        )
        .await?;
        let text = printable_text(&pool, receita.id, "Clínica").await?;
        assert_eq!(text.matches(SIGNATURE_MARKER).count(), 1);

        let doc = layout(&text, &PageMetrics::a4(300));
        let lines = &doc.pages[0].lines;
        for corpo in ["Amoxicilina", "falso", "fim"] {
            let line = lines.iter().find(|l| l.text == corpo).unwrap();
            assert_eq!(line.align, Align::Left);
        }
        Ok(())
    }
}
