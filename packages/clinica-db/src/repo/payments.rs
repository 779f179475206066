//! Financeiro: pagamentos e conta do cliente (Pendura)
//!
//! Pendura não recebe na hora: o lançamento fica pendente e o valor entra
//! no saldo da conta do paciente, na mesma transação.

use chrono::NaiveDate;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;
use validator::Validate;

use crate::error::{ClinicError, Result};
use crate::format::format_brl;
use crate::models::{
    CustomerTab, FinancialEntry, MethodTotal, PaymentInput, PaymentMethod, PaymentStatus,
};

const COLUMNS: &str =
    "id, paciente_id, consulta_id, descricao, valor, forma_pagamento, status, data";

async fn insert_entry(
    tx: &mut Transaction<'_, Sqlite>,
    input: &PaymentInput,
    status: PaymentStatus,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO financeiro (paciente_id, consulta_id, descricao, valor, forma_pagamento, status, data)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(input.paciente_id)
    .bind(input.consulta_id)
    .bind(input.descricao.trim())
    .bind(input.valor)
    .bind(input.forma_pagamento)
    .bind(status)
    .bind(input.data)
    .execute(&mut **tx)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Registra um pagamento (ou um lançamento na conta, se Pendura)
pub async fn register(pool: &SqlitePool, input: PaymentInput) -> Result<FinancialEntry> {
    input.validate()?;

    let mut tx = pool.begin().await?;
    let id = if input.forma_pagamento.defers_charge() {
        let paciente_id = input.paciente_id.ok_or_else(|| {
            ClinicError::validation("paciente_id: Pendura exige um paciente")
        })?;
        let id = insert_entry(&mut tx, &input, PaymentStatus::Pendente).await?;
        sqlx::query(
            "INSERT INTO contas_cliente (paciente_id, saldo) VALUES (?, ?)
             ON CONFLICT (paciente_id) DO UPDATE
             SET saldo = saldo + excluded.saldo, atualizado_em = CURRENT_TIMESTAMP",
        )
        .bind(paciente_id)
        .bind(input.valor)
        .execute(&mut *tx)
        .await?;
        info!(
            "Lançado {} na conta do paciente {}",
            format_brl(input.valor),
            paciente_id
        );
        id
    } else {
        insert_entry(&mut tx, &input, PaymentStatus::Pago).await?
    };
    tx.commit().await?;

    get(pool, id).await
}

/// Quita parte ou todo o saldo da conta do paciente
///
/// Zerando o saldo, os lançamentos pendentes passam a pagos.
pub async fn settle_tab(
    pool: &SqlitePool,
    paciente_id: i64,
    valor: i64,
    forma_pagamento: PaymentMethod,
    data: NaiveDate,
) -> Result<FinancialEntry> {
    if forma_pagamento.defers_charge() {
        return Err(ClinicError::validation(
            "forma_pagamento: conta não pode ser quitada com Pendura",
        ));
    }
    if valor <= 0 {
        return Err(ClinicError::validation("valor: deve ser positivo"));
    }

    let mut tx = pool.begin().await?;
    let saldo: i64 = sqlx::query_scalar("SELECT saldo FROM contas_cliente WHERE paciente_id = ?")
        .bind(paciente_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(0);

    if valor > saldo {
        return Err(ClinicError::Validation(format!(
            "Valor {} maior que o saldo em aberto {}",
            format_brl(valor),
            format_brl(saldo)
        )));
    }

    let restante = saldo - valor;
    sqlx::query(
        "UPDATE contas_cliente SET saldo = ?, atualizado_em = CURRENT_TIMESTAMP WHERE paciente_id = ?",
    )
    .bind(restante)
    .bind(paciente_id)
    .execute(&mut *tx)
    .await?;

    let input = PaymentInput {
        paciente_id: Some(paciente_id),
        consulta_id: None,
        descricao: "Pagamento de conta cliente".to_string(),
        valor,
        forma_pagamento,
        data,
    };
    let id = insert_entry(&mut tx, &input, PaymentStatus::Pago).await?;

    if restante == 0 {
        sqlx::query(
            "UPDATE financeiro SET status = 'pago' WHERE paciente_id = ? AND status = 'pendente'",
        )
        .bind(paciente_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    info!(
        "Conta do paciente {} recebeu {}, restam {}",
        paciente_id,
        format_brl(valor),
        format_brl(restante)
    );
    get(pool, id).await
}

/// Conta do paciente, se ele já usou Pendura
pub async fn tab(pool: &SqlitePool, paciente_id: i64) -> Result<Option<CustomerTab>> {
    let tab = sqlx::query_as::<_, CustomerTab>(
        "SELECT paciente_id, saldo, atualizado_em FROM contas_cliente WHERE paciente_id = ?",
    )
    .bind(paciente_id)
    .fetch_optional(pool)
    .await?;
    Ok(tab)
}

/// Saldo em aberto (zero para quem nunca pendurou)
pub async fn tab_balance(pool: &SqlitePool, paciente_id: i64) -> Result<i64> {
    Ok(tab(pool, paciente_id).await?.map(|t| t.saldo).unwrap_or(0))
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<FinancialEntry> {
    sqlx::query_as::<_, FinancialEntry>(&format!("SELECT {} FROM financeiro WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ClinicError::NotFound(format!("Lançamento {}", id)))
}

/// Lançamentos entre duas datas, inclusive
pub async fn list_entries(
    pool: &SqlitePool,
    inicio: NaiveDate,
    fim: NaiveDate,
) -> Result<Vec<FinancialEntry>> {
    let rows = sqlx::query_as::<_, FinancialEntry>(&format!(
        "SELECT {} FROM financeiro WHERE data BETWEEN ? AND ? ORDER BY data, id",
        COLUMNS
    ))
    .bind(inicio)
    .bind(fim)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fechamento do dia por forma de pagamento
pub async fn daily_totals(pool: &SqlitePool, data: NaiveDate) -> Result<Vec<MethodTotal>> {
    let rows = sqlx::query_as::<_, MethodTotal>(
        "SELECT forma_pagamento, SUM(valor) AS total, COUNT(*) AS quantidade
         FROM financeiro WHERE data = ?
         GROUP BY forma_pagamento ORDER BY forma_pagamento",
    )
    .bind(data)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
