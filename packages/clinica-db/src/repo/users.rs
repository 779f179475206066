//! Usuários e autenticação
//!
//! Senhas são guardadas como hash Argon2id (formato PHC).

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{ClinicError, Result};
use crate::models::{User, UserInput};

use super::ensure_affected;

fn hash_password(senha: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(senha.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ClinicError::Internal(format!("Falha ao gerar hash de senha: {}", e)))
}

fn verify_password(senha: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(senha.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Hash de senha ilegível: {}", e);
            false
        }
    }
}

pub async fn create(pool: &SqlitePool, input: UserInput) -> Result<User> {
    let input = input.prepare()?;
    if get_by_login(pool, &input.login).await?.is_some() {
        return Err(ClinicError::Conflict(format!(
            "Login '{}' já existe",
            input.login
        )));
    }

    let hash = hash_password(&input.senha)?;
    let result =
        sqlx::query("INSERT INTO usuarios (login, senha, nome, perfil) VALUES (?, ?, ?, ?)")
            .bind(&input.login)
            .bind(hash)
            .bind(&input.nome)
            .bind(input.perfil)
            .execute(pool)
            .await?;

    let id = result.last_insert_rowid();
    info!("Usuário {} criado: {} ({})", id, input.login, input.perfil);
    get(pool, id).await
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<User> {
    sqlx::query_as::<_, User>(
        "SELECT id, login, senha, nome, perfil, ativo FROM usuarios WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ClinicError::NotFound(format!("Usuário {}", id)))
}

pub async fn get_by_login(pool: &SqlitePool, login: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, login, senha, nome, perfil, ativo FROM usuarios WHERE login = ?",
    )
    .bind(login.trim().to_lowercase())
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        "SELECT id, login, senha, nome, perfil, ativo FROM usuarios ORDER BY login",
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}

/// Confere login e senha; usuário inativo não entra
///
/// Login inexistente e senha errada devolvem a mesma mensagem.
pub async fn authenticate(pool: &SqlitePool, login: &str, senha: &str) -> Result<User> {
    let denied = || ClinicError::Validation("Login ou senha inválidos".to_string());
    let user = get_by_login(pool, login).await?.ok_or_else(denied)?;
    if !verify_password(senha, &user.senha) {
        warn!("Senha incorreta para {}", user.login);
        return Err(denied());
    }
    if !user.ativo {
        return Err(ClinicError::Validation(format!(
            "Usuário {} está desativado",
            user.login
        )));
    }
    info!("Login de {}", user.login);
    Ok(user)
}

pub async fn change_password(pool: &SqlitePool, id: i64, nova_senha: &str) -> Result<()> {
    if nova_senha.chars().count() < 6 {
        return Err(ClinicError::validation("senha: senha com pelo menos 6 caracteres"));
    }

    let hash = hash_password(nova_senha)?;
    let result = sqlx::query("UPDATE usuarios SET senha = ? WHERE id = ?")
        .bind(hash)
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Usuário", id)
}

pub async fn set_active(pool: &SqlitePool, id: i64, ativo: bool) -> Result<()> {
    let result = sqlx::query("UPDATE usuarios SET ativo = ? WHERE id = ?")
        .bind(ativo)
        .bind(id)
        .execute(pool)
        .await?;
    ensure_affected(result.rows_affected(), "Usuário", id)
}
