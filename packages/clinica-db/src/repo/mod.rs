//! Controladores de cada cadastro
//!
//! Funções assíncronas sobre o pool compartilhado. Toda gravação valida a
//! entrada do formulário antes de montar o SQL.

pub mod appointment_types;
pub mod appointments;
pub mod doctors;
pub mod patients;
pub mod payments;
pub mod prescriptions;
pub mod records;
pub mod users;
pub mod working_hours;

use crate::error::{ClinicError, Result};

/// Converte "nenhuma linha afetada" em `NotFound`
pub(crate) fn ensure_affected(rows: u64, what: &str, id: i64) -> Result<()> {
    if rows == 0 {
        return Err(ClinicError::NotFound(format!("{} {}", what, id)));
    }
    Ok(())
}
