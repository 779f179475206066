//! Definições de erro para a biblioteca clinica-db
//!
//! Todos os controladores devolvem `ClinicError`; a tela decide como exibir.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Resultado padrão das operações da biblioteca
pub type Result<T> = std::result::Result<T, ClinicError>;

/// Erros das operações de banco de dados e das regras de cadastro
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("Registro não encontrado: {0}")]
    NotFound(String),

    #[error("Conflito: {0}")]
    Conflict(String),

    #[error("Dados inválidos: {0}")]
    Validation(String),

    #[error("Falha de conexão com banco de dados: {0}")]
    ConnectionFailure(String),

    #[error("Erro de consulta: {0}")]
    Query(String),

    #[error("Erro de migração: {0}")]
    Migration(String),

    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro interno: {0}")]
    Internal(String),
}

impl ClinicError {
    /// Atalho para erros de validação montados a partir de texto
    pub fn validation(msg: impl Into<String>) -> Self {
        ClinicError::Validation(msg.into())
    }

    /// Indica se o erro é de indisponibilidade do banco (tela de conexão)
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ClinicError::ConnectionFailure(_))
    }
}

/// Conversão dos erros do SQLx pelo tipo, nunca pelo texto da mensagem
impl From<sqlx::Error> for ClinicError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => ClinicError::NotFound("Registro não encontrado".to_string()),
            sqlx::Error::Database(dbe) => match dbe.kind() {
                ErrorKind::UniqueViolation => ClinicError::Conflict(dbe.message().to_string()),
                ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => ClinicError::Validation(dbe.message().to_string()),
                _ => ClinicError::Query(dbe.message().to_string()),
            },
            sqlx::Error::ColumnNotFound(col) => {
                ClinicError::Query(format!("Coluna não encontrada: {}", col))
            }
            sqlx::Error::TypeNotFound { type_name } => {
                ClinicError::Query(format!("Tipo não encontrado: {}", type_name))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                ClinicError::Query(format!("Erro ao decodificar coluna {}: {}", index, source))
            }
            sqlx::Error::Io(io_err) => ClinicError::ConnectionFailure(io_err.to_string()),
            sqlx::Error::Configuration(conf_err) => {
                ClinicError::ConnectionFailure(conf_err.to_string())
            }
            sqlx::Error::PoolClosed => {
                ClinicError::ConnectionFailure("Pool de conexões fechado".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                ClinicError::ConnectionFailure("Timeout no pool de conexões".to_string())
            }
            sqlx::Error::WorkerCrashed => {
                ClinicError::Internal("Worker do banco de dados falhou".to_string())
            }
            _ => ClinicError::Internal(format!("Erro inesperado: {:?}", error)),
        }
    }
}

impl From<validator::ValidationErrors> for ClinicError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut campos: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(campo, erros)| {
                let detalhe = erros
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "valor inválido".to_string());
                format!("{}: {}", campo, detalhe)
            })
            .collect();
        campos.sort();
        ClinicError::Validation(campos.join("; "))
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(error: serde_json::Error) -> Self {
        ClinicError::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ClinicError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ClinicError::NotFound(_)));
    }

    #[test]
    fn pool_errors_are_connection_failures() {
        let err: ClinicError = sqlx::Error::PoolTimedOut.into();
        assert!(err.is_connection_failure());
        let err: ClinicError = sqlx::Error::PoolClosed.into();
        assert!(err.is_connection_failure());
    }

    #[test]
    fn validation_errors_are_joined_by_field() {
        let mut errors = validator::ValidationErrors::new();
        let mut e = validator::ValidationError::new("length");
        e.message = Some("obrigatório".into());
        errors.add("nome", e);
        let err: ClinicError = errors.into();
        match err {
            ClinicError::Validation(msg) => assert_eq!(msg, "nome: obrigatório"),
            other => panic!("esperava Validation, veio {:?}", other),
        }
    }
}
