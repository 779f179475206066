//! Configuração da aplicação
//!
//! Lida de `~/.clinicas/config.json` (ou do legado `~/.pdv_aquarius/config.json`),
//! com sobrescrita por variáveis de ambiente e valores padrão para o resto.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ClinicError, Result};
use crate::DbConfig;

/// Diretório da configuração atual, relativo ao home
pub const CONFIG_DIR: &str = ".clinicas";
/// Diretório legado, só para leitura
pub const LEGACY_CONFIG_DIR: &str = ".pdv_aquarius";
/// Nome do arquivo de configuração
pub const CONFIG_FILE: &str = "config.json";

/// Onde ficam as permissões de tela
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionBackend {
    /// Arquivo JSON módulo → botão → perfil
    Json,
    /// Tabelas `perfil`, `modulos`, `botoes`, `perfil_permissao`
    Database,
}

impl std::str::FromStr for PermissionBackend {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(PermissionBackend::Json),
            "database" | "db" | "banco" => Ok(PermissionBackend::Database),
            other => Err(ClinicError::Config(format!(
                "Backend de permissões desconhecido: {}",
                other
            ))),
        }
    }
}

/// Parâmetros de conexão com o banco
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Caminho do arquivo SQLite
    pub path: PathBuf,
    /// Número máximo de conexões no pool
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: config_root().join("clinica.db"),
            max_connections: 5,
        }
    }
}

/// Configuração completa, persistida em JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    /// Sem valor padrão: a escolha do backend precisa ser explícita
    pub permission_backend: Option<PermissionBackend>,
    pub permissions_file: PathBuf,
    /// Impressora padrão para receitas e relatórios
    pub printer: Option<String>,
    /// Diretório de spool usado pelo driver de impressão em arquivo
    pub spool_dir: PathBuf,
    pub clinic_name: String,
    /// Intervalo de atualização da agenda, em segundos
    pub refresh_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            permission_backend: None,
            permissions_file: config_root().join("permissoes.json"),
            printer: None,
            spool_dir: config_root().join("spool"),
            clinic_name: "Clínica".to_string(),
            refresh_interval_secs: 30,
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Diretório `~/.clinicas`
pub fn config_root() -> PathBuf {
    home().join(CONFIG_DIR)
}

/// Caminho padrão do arquivo de configuração
pub fn default_config_path() -> PathBuf {
    config_root().join(CONFIG_FILE)
}

/// Caminho do arquivo legado
pub fn legacy_config_path() -> PathBuf {
    home().join(LEGACY_CONFIG_DIR).join(CONFIG_FILE)
}

impl AppConfig {
    /// Carrega a configuração padrão do usuário, aplicando o ambiente
    pub fn load() -> Result<Self> {
        let mut config = Self::load_first_existing(&[default_config_path(), legacy_config_path()])?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Lê o primeiro arquivo existente da lista; nenhum existindo, usa os padrões
    pub fn load_first_existing(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates {
            if path.exists() {
                return Self::load_from(path);
            }
        }
        info!("Nenhum arquivo de configuração encontrado, usando padrões");
        Ok(Self::default())
    }

    /// Lê um arquivo JSON específico
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClinicError::Config(format!("Falha ao ler {}: {}", path.display(), e))
        })?;
        let config: AppConfig = serde_json::from_str(&content)?;
        info!("Configuração carregada de {}", path.display());
        Ok(config)
    }

    /// Grava a configuração em JSON, criando o diretório se preciso
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClinicError::Config(format!("Falha ao criar {}: {}", parent.display(), e))
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| {
            ClinicError::Config(format!("Falha ao gravar {}: {}", path.display(), e))
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Grava no caminho padrão (nunca no legado)
    pub fn save(&self) -> Result<()> {
        self.save_to(&default_config_path())
    }

    /// Sobrescreve campos a partir de variáveis `CLINICA_*`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("CLINICA_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(max) = lookup("CLINICA_DB_MAX_CONNECTIONS") {
            match max.trim().parse() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!("CLINICA_DB_MAX_CONNECTIONS inválido: {}", max),
            }
        }
        if let Some(backend) = lookup("CLINICA_PERMISSION_BACKEND") {
            self.permission_backend = Some(backend.parse()?);
        }
        if let Some(printer) = lookup("CLINICA_PRINTER") {
            self.printer = Some(printer);
        }
        Ok(())
    }

    /// Backend de permissões escolhido, ou erro se ninguém escolheu
    pub fn required_permission_backend(&self) -> Result<PermissionBackend> {
        self.permission_backend.ok_or_else(|| {
            ClinicError::Config(
                "permission_backend não definido: escolha \"json\" ou \"database\"".to_string(),
            )
        })
    }

    /// Parâmetros de conexão para `init_db_pool`
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            db_path: self.database.path.to_string_lossy().into_owned(),
            max_connections: self.database.max_connections,
        }
    }
}
