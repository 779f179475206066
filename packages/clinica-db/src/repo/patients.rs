//! Cadastro de pacientes

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{ClinicError, Result};
use crate::format;
use crate::models::{Patient, PatientInput};

use super::ensure_affected;

const COLUMNS: &str = "id, nome, data_nascimento, cpf, telefone, telefone2, endereco, numero, \
                       bairro, cidade, estado, cep, observacoes";

async fn ensure_cpf_free(pool: &SqlitePool, cpf: Option<&str>, except_id: Option<i64>) -> Result<()> {
    let Some(cpf) = cpf else {
        return Ok(());
    };
    if let Some(existing) = find_by_cpf(pool, cpf).await? {
        if Some(existing.id) != except_id {
            return Err(ClinicError::Conflict(format!(
                "CPF {} já cadastrado para {}",
                format::format_cpf(cpf),
                existing.nome
            )));
        }
    }
    Ok(())
}

/// Cadastra um paciente novo
pub async fn create(pool: &SqlitePool, input: PatientInput) -> Result<Patient> {
    let input = input.prepare()?;
    ensure_cpf_free(pool, input.cpf.as_deref(), None).await?;

    let result = sqlx::query(
        "INSERT INTO pacientes (nome, data_nascimento, cpf, telefone, telefone2, endereco, numero,
                                bairro, cidade, estado, cep, observacoes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.nome)
    .bind(input.data_nascimento)
    .bind(&input.cpf)
    .bind(&input.telefone)
    .bind(&input.telefone2)
    .bind(&input.endereco)
    .bind(&input.numero)
    .bind(&input.bairro)
    .bind(&input.cidade)
    .bind(&input.estado)
    .bind(&input.cep)
    .bind(&input.observacoes)
    .execute(pool)
    .await?;

    let id = result.last_insert_rowid();
    info!("Paciente {} cadastrado: {}", id, input.nome);
    get(pool, id).await
}

/// Atualiza todos os campos do paciente
pub async fn update(pool: &SqlitePool, id: i64, input: PatientInput) -> Result<Patient> {
    let input = input.prepare()?;
    ensure_cpf_free(pool, input.cpf.as_deref(), Some(id)).await?;

    let result = sqlx::query(
        "UPDATE pacientes SET nome = ?, data_nascimento = ?, cpf = ?, telefone = ?, telefone2 = ?,
                endereco = ?, numero = ?, bairro = ?, cidade = ?, estado = ?, cep = ?, observacoes = ?
         WHERE id = ?",
    )
    .bind(&input.nome)
    .bind(input.data_nascimento)
    .bind(&input.cpf)
    .bind(&input.telefone)
    .bind(&input.telefone2)
    .bind(&input.endereco)
    .bind(&input.numero)
    .bind(&input.bairro)
    .bind(&input.cidade)
    .bind(&input.estado)
    .bind(&input.cep)
    .bind(&input.observacoes)
    .bind(id)
    .execute(pool)
    .await?;

    ensure_affected(result.rows_affected(), "Paciente", id)?;
    get(pool, id).await
}

/// Exclusão definitiva; consultas e prontuários caem junto pela FK
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM pacientes WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Paciente", id)?;
    info!("Paciente {} excluído", id);
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Patient> {
    sqlx::query_as::<_, Patient>(&format!("SELECT {} FROM pacientes WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ClinicError::NotFound(format!("Paciente {}", id)))
}

/// Busca por CPF, aceitando o valor com ou sem pontuação
pub async fn find_by_cpf(pool: &SqlitePool, cpf: &str) -> Result<Option<Patient>> {
    let digits = format::only_digits(cpf);
    let patient =
        sqlx::query_as::<_, Patient>(&format!("SELECT {} FROM pacientes WHERE cpf = ?", COLUMNS))
            .bind(digits)
            .fetch_optional(pool)
            .await?;
    Ok(patient)
}

/// Busca por trecho do nome, sem diferenciar maiúsculas
pub async fn search_by_name(pool: &SqlitePool, fragment: &str) -> Result<Vec<Patient>> {
    let pattern = format!("%{}%", fragment.trim());
    let patients = sqlx::query_as::<_, Patient>(&format!(
        "SELECT {} FROM pacientes WHERE nome LIKE ? ORDER BY nome COLLATE NOCASE",
        COLUMNS
    ))
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(patients)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Patient>> {
    let patients = sqlx::query_as::<_, Patient>(&format!(
        "SELECT {} FROM pacientes ORDER BY nome COLLATE NOCASE",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(patients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fresh_pool;
    use chrono::NaiveDate;

    fn maria() -> PatientInput {
        PatientInput {
            nome: "Maria da Silva".into(),
            data_nascimento: NaiveDate::from_ymd_opt(1980, 5, 17),
            cpf: Some("529.982.247-25".into()),
            telefone: Some("(11) 98765-4321".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_get_and_find_by_cpf() -> Result<()> {
        let (_dir, pool) = fresh_pool().await;

        let created = create(&pool, maria()).await?;
        assert_eq!(created.cpf.as_deref(), Some("52998224725"));
        assert_eq!(created.telefone.as_deref(), Some("11987654321"));

        let found = find_by_cpf(&pool, "529.982.247-25").await?;
        assert_eq!(found, Some(created.clone()));
        assert_eq!(get(&pool, created.id).await?, created);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_cpf_is_a_conflict() -> Result<()> {
        let (_dir, pool) = fresh_pool().await;
        create(&pool, maria()).await?;

        let again = PatientInput {
            nome: "Outra Maria".into(),
            ..maria()
        };
        assert!(matches!(create(&pool, again).await, Err(ClinicError::Conflict(_))));
        Ok(())
    }

    #[tokio::test]
    async fn update_keeps_own_cpf_and_delete_is_final() -> Result<()> {
        let (_dir, pool) = fresh_pool().await;
        let created = create(&pool, maria()).await?;

        let updated = update(
            &pool,
            created.id,
            PatientInput {
                cidade: Some("Santos".into()),
                ..maria()
            },
        )
        .await?;
        assert_eq!(updated.cidade.as_deref(), Some("Santos"));

        delete(&pool, created.id).await?;
        assert!(matches!(get(&pool, created.id).await, Err(ClinicError::NotFound(_))));
        assert!(matches!(delete(&pool, created.id).await, Err(ClinicError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_ordered() -> Result<()> {
        let (_dir, pool) = fresh_pool().await;
        for nome in ["Carlos Souza", "ana souza", "Bruno Lima"] {
            create(
                &pool,
                PatientInput {
                    nome: nome.into(),
                    ..Default::default()
                },
            )
            .await?;
        }

        let found: Vec<String> = search_by_name(&pool, "SOUZA")
            .await?
            .into_iter()
            .map(|p| p.nome)
            .collect();
        assert_eq!(found, vec!["ana souza", "Carlos Souza"]);
        assert_eq!(list(&pool).await?.len(), 3);
        Ok(())
    }
}
