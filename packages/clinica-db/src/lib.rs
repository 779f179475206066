//! Clinica DB - núcleo da aplicação da clínica
//!
//! Esta biblioteca fornece:
//! - Configuração da aplicação e conexão com o banco
//! - Migrações automáticas do banco de dados
//! - Modelos tipados e controladores de cada cadastro
//! - Verificação de conflitos de agenda
//! - Permissões de tela (arquivo JSON ou tabelas)
//! - Diagramação de texto para impressão

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{error, info};

pub mod config;
pub mod error;
pub mod format;
pub mod migrations;
pub mod models;
pub mod permissions;
pub mod print;
pub mod repo;
pub mod schedule;

pub use error::{ClinicError, Result};

/// Configuração da conexão com o banco de dados
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Caminho para o arquivo SQLite
    pub db_path: String,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            db_path: "data/clinica.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Abre o pool de conexões e aplica as migrações pendentes
///
/// Falhas de conexão viram `ClinicError::ConnectionFailure`, para que a
/// aplicação mande o usuário para a configuração de conexão.
pub async fn init_db_pool(config: &DbConfig) -> Result<SqlitePool> {
    let db_path = Path::new(&config.db_path);

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClinicError::ConnectionFailure(format!(
                    "Falha ao criar diretório para banco de dados: {}",
                    e
                ))
            })?;
        }
    }

    let connection_options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .pragma("synchronous", "NORMAL");

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connection_options)
        .await
        .map_err(|e| {
            error!("Falha ao conectar ao banco de dados {}: {}", config.db_path, e);
            ClinicError::ConnectionFailure(e.to_string())
        })?;

    migrations::run_migrations(&pool)
        .await
        .map_err(|e| ClinicError::Migration(format!("{:#}", e)))?;

    info!("Banco de dados inicializado com sucesso: {}", config.db_path);
    Ok(pool)
}
