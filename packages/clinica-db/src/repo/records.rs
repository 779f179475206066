//! Prontuário e modelos de texto

use std::collections::HashMap;

use sqlx::SqlitePool;
use tracing::info;
use validator::Validate;

use crate::error::{ClinicError, Result};
use crate::models::{MedicalRecord, TextTemplate, TextTemplateInput};

use super::ensure_affected;

/// Acrescenta uma entrada ao prontuário do paciente
pub async fn add_record(
    pool: &SqlitePool,
    paciente_id: i64,
    usuario_id: i64,
    conteudo: &str,
) -> Result<MedicalRecord> {
    let conteudo = conteudo.trim();
    if conteudo.is_empty() {
        return Err(ClinicError::validation("conteudo: obrigatório"));
    }
    let result =
        sqlx::query("INSERT INTO prontuarios (paciente_id, usuario_id, conteudo) VALUES (?, ?, ?)")
            .bind(paciente_id)
            .bind(usuario_id)
            .bind(conteudo)
            .execute(pool)
            .await?;

    let id = result.last_insert_rowid();
    info!("Prontuário {} registrado para paciente {}", id, paciente_id);
    sqlx::query_as::<_, MedicalRecord>(
        "SELECT id, paciente_id, usuario_id, conteudo, criado_em FROM prontuarios WHERE id = ?",
    )
    .bind(id)
    .fetch_one(pool)
    .await
    .map_err(Into::into)
}

/// Entradas do paciente, da mais recente para a mais antiga
pub async fn list_records(pool: &SqlitePool, paciente_id: i64) -> Result<Vec<MedicalRecord>> {
    let records = sqlx::query_as::<_, MedicalRecord>(
        "SELECT id, paciente_id, usuario_id, conteudo, criado_em FROM prontuarios
         WHERE paciente_id = ? ORDER BY criado_em DESC, id DESC",
    )
    .bind(paciente_id)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn delete_record(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM prontuarios WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Prontuário", id)
}

pub async fn create_template(pool: &SqlitePool, input: TextTemplateInput) -> Result<TextTemplate> {
    input.validate()?;
    let result =
        sqlx::query("INSERT INTO modelos_texto (nome, conteudo, usuario_id) VALUES (?, ?, ?)")
            .bind(input.nome.trim())
            .bind(&input.conteudo)
            .bind(input.usuario_id)
            .execute(pool)
            .await?;
    get_template(pool, result.last_insert_rowid()).await
}

pub async fn update_template(
    pool: &SqlitePool,
    id: i64,
    input: TextTemplateInput,
) -> Result<TextTemplate> {
    input.validate()?;
    let result = sqlx::query("UPDATE modelos_texto SET nome = ?, conteudo = ? WHERE id = ?")
        .bind(input.nome.trim())
        .bind(&input.conteudo)
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Modelo de texto", id)?;
    get_template(pool, id).await
}

pub async fn delete_template(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("DELETE FROM modelos_texto WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Modelo de texto", id)
}

pub async fn get_template(pool: &SqlitePool, id: i64) -> Result<TextTemplate> {
    sqlx::query_as::<_, TextTemplate>(
        "SELECT id, nome, conteudo, usuario_id FROM modelos_texto WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::NotFound(format!("Modelo de texto {}", id)))
}

/// Modelos do usuário mais os compartilhados (sem dono)
pub async fn list_templates(pool: &SqlitePool, usuario_id: Option<i64>) -> Result<Vec<TextTemplate>> {
    let templates = sqlx::query_as::<_, TextTemplate>(
        "SELECT id, nome, conteudo, usuario_id FROM modelos_texto
         WHERE usuario_id IS NULL OR usuario_id = ?
         ORDER BY nome",
    )
    .bind(usuario_id)
    .fetch_all(pool)
    .await?;
    Ok(templates)
}

/// Troca cada `{{chave}}` pelo valor correspondente; chaves sem valor ficam como estão
pub fn render_template(conteudo: &str, valores: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(conteudo.len());
    let mut rest = conteudo;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let chave = after[..end].trim();
                match valores.get(chave) {
                    Some(valor) => out.push_str(valor),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
