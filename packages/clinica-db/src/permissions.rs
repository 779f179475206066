//! Permissões por perfil, módulo e botão
//!
//! Dois armazenamentos: arquivo JSON (`modulo -> botao -> perfil -> bool`)
//! ou as tabelas `perfil`, `modulos`, `botoes` e `perfil_permissao`.
//! Qual deles vale é escolhido na configuração. Nos dois, `admin` pode
//! tudo e o que não estiver cadastrado é negado.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, PermissionBackend};
use crate::error::{ClinicError, Result};
use crate::models::Role;

pub type PermissionMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, bool>>>;

fn is_admin(perfil: &str) -> bool {
    perfil == Role::Admin.as_str()
}

/// Permissões guardadas em arquivo JSON
#[derive(Debug, Clone, Default)]
pub struct JsonPermissions {
    path: PathBuf,
    map: PermissionMap,
}

impl JsonPermissions {
    /// Lê o arquivo; se ele não existe, começa vazio
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let map = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                ClinicError::Config(format!("Falha ao ler {}: {}", path.display(), e))
            })?;
            serde_json::from_str(&content)?
        } else {
            warn!(
                "Arquivo de permissões {} não encontrado, começando vazio",
                path.display()
            );
            PermissionMap::new()
        };
        Ok(Self { path, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn map(&self) -> &PermissionMap {
        &self.map
    }

    pub fn can(&self, perfil: &str, modulo: &str, botao: &str) -> bool {
        if is_admin(perfil) {
            return true;
        }
        self.map
            .get(modulo)
            .and_then(|botoes| botoes.get(botao))
            .and_then(|perfis| perfis.get(perfil))
            .copied()
            .unwrap_or(false)
    }

    pub fn set(&mut self, modulo: &str, botao: &str, perfil: &str, permitido: bool) {
        self.map
            .entry(modulo.to_string())
            .or_default()
            .entry(botao.to_string())
            .or_default()
            .insert(perfil.to_string(), permitido);
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClinicError::Config(format!("Falha ao criar {}: {}", parent.display(), e))
            })?;
        }
        let content = serde_json::to_string_pretty(&self.map)?;
        std::fs::write(&self.path, content).map_err(|e| {
            ClinicError::Config(format!("Falha ao gravar {}: {}", self.path.display(), e))
        })?;
        info!("Permissões gravadas em {}", self.path.display());
        Ok(())
    }
}

/// Linha da listagem de permissões de um perfil
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct PermissionEntry {
    pub modulo: String,
    pub botao: String,
    pub permitido: bool,
}

/// Permissões guardadas nas tabelas do banco
#[derive(Debug, Clone)]
pub struct DbPermissions {
    pool: SqlitePool,
}

impl DbPermissions {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn can(&self, perfil: &str, modulo: &str, botao: &str) -> Result<bool> {
        if is_admin(perfil) {
            return Ok(true);
        }
        let permitido: Option<bool> = sqlx::query_scalar(
            "SELECT pp.permitido
             FROM perfil_permissao pp
             JOIN perfil p ON p.id = pp.perfil_id
             JOIN botoes b ON b.id = pp.botao_id
             JOIN modulos m ON m.id = b.modulo_id
             WHERE p.nome = ? AND m.nome = ? AND b.nome = ?",
        )
        .bind(perfil)
        .bind(modulo)
        .bind(botao)
        .fetch_optional(&self.pool)
        .await?;
        Ok(permitido.unwrap_or(false))
    }

    async fn upsert(&self, perfil: &str, modulo: &str, botao: &str, permitido: bool) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO perfil (nome) VALUES (?)")
            .bind(perfil)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO modulos (nome) VALUES (?)")
            .bind(modulo)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT OR IGNORE INTO botoes (modulo_id, nome)
             SELECT id, ? FROM modulos WHERE nome = ?",
        )
        .bind(botao)
        .bind(modulo)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO perfil_permissao (perfil_id, botao_id, permitido)
             SELECT p.id, b.id, ?
             FROM perfil p, botoes b JOIN modulos m ON m.id = b.modulo_id
             WHERE p.nome = ? AND m.nome = ? AND b.nome = ?
             ON CONFLICT (perfil_id, botao_id) DO UPDATE SET permitido = excluded.permitido",
        )
        .bind(permitido)
        .bind(perfil)
        .bind(modulo)
        .bind(botao)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(perfil, modulo, botao, permitido, "permissão atualizada");
        Ok(())
    }

    pub async fn grant(&self, perfil: &str, modulo: &str, botao: &str) -> Result<()> {
        self.upsert(perfil, modulo, botao, true).await
    }

    pub async fn revoke(&self, perfil: &str, modulo: &str, botao: &str) -> Result<()> {
        self.upsert(perfil, modulo, botao, false).await
    }

    /// Tudo que está cadastrado para o perfil, por módulo e botão
    pub async fn list_for_role(&self, perfil: &str) -> Result<Vec<PermissionEntry>> {
        let rows = sqlx::query_as::<_, PermissionEntry>(
            "SELECT m.nome AS modulo, b.nome AS botao, pp.permitido
             FROM perfil_permissao pp
             JOIN perfil p ON p.id = pp.perfil_id
             JOIN botoes b ON b.id = pp.botao_id
             JOIN modulos m ON m.id = b.modulo_id
             WHERE p.nome = ?
             ORDER BY m.nome, b.nome",
        )
        .bind(perfil)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// Verificador montado a partir da configuração
#[derive(Debug, Clone)]
pub enum PermissionChecker {
    Json(JsonPermissions),
    Database(DbPermissions),
}

impl PermissionChecker {
    /// Falha se a configuração não disser qual armazenamento usar
    pub fn from_config(config: &AppConfig, pool: &SqlitePool) -> Result<Self> {
        let backend = config.required_permission_backend()?;
        let checker = match backend {
            PermissionBackend::Json => {
                PermissionChecker::Json(JsonPermissions::load(config.permissions_file.clone())?)
            }
            PermissionBackend::Database => PermissionChecker::Database(DbPermissions::new(pool.clone())),
        };
        info!("Permissões lidas de {:?}", backend);
        Ok(checker)
    }

    pub async fn can(&self, perfil: &str, modulo: &str, botao: &str) -> Result<bool> {
        match self {
            PermissionChecker::Json(store) => Ok(store.can(perfil, modulo, botao)),
            PermissionChecker::Database(store) => store.can(perfil, modulo, botao).await,
        }
    }
}
