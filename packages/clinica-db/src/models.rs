//! Modelos de dados da clínica
//!
//! Cada cadastro tem um registro tipado (o que sai do banco) e uma entrada
//! validada (o que vem do formulário). A validação fica toda aqui.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::format::{self, TimeValue};

/// Status usuais de consulta; o campo continua texto livre
pub const STATUS_AGENDADO: &str = "Agendado";
pub const STATUS_CONFIRMADO: &str = "Confirmado";
pub const STATUS_REALIZADO: &str = "Realizado";
pub const STATUS_CANCELADO: &str = "Cancelado";

fn not_in_future(date: &NaiveDate) -> std::result::Result<(), ValidationError> {
    if *date > Local::now().date_naive() {
        let mut err = ValidationError::new("future_date");
        err.message = Some("data no futuro".into());
        return Err(err);
    }
    Ok(())
}

fn non_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("obrigatório".into());
        return Err(err);
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn digits_or_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| format::only_digits(&v))
        .filter(|v| !v.is_empty())
}

/// Lê uma coluna de horário aceitando texto, inteiro (segundos) ou real (fração do dia)
pub(crate) fn decode_time(row: &SqliteRow, column: &str) -> sqlx::Result<TimeValue> {
    if let Ok(text) = row.try_get::<String, _>(column) {
        return Ok(TimeValue::Text(text));
    }
    if let Ok(secs) = row.try_get::<i64, _>(column) {
        return Ok(TimeValue::Seconds(secs));
    }
    row.try_get::<f64, _>(column).map(TimeValue::DayFraction)
}

// ---------------------------------------------------------------------------
// Pacientes
// ---------------------------------------------------------------------------

/// Paciente cadastrado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: i64,
    pub nome: String,
    pub data_nascimento: Option<NaiveDate>,
    /// Apenas dígitos
    pub cpf: Option<String>,
    pub telefone: Option<String>,
    pub telefone2: Option<String>,
    pub endereco: Option<String>,
    pub numero: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub cep: Option<String>,
    pub observacoes: Option<String>,
}

/// Dados do formulário de paciente
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PatientInput {
    #[validate(custom = "non_blank")]
    pub nome: String,
    #[validate(custom = "not_in_future")]
    pub data_nascimento: Option<NaiveDate>,
    #[validate(length(equal = 11, message = "CPF deve ter 11 dígitos"))]
    pub cpf: Option<String>,
    #[validate(length(min = 8, max = 13, message = "telefone inválido"))]
    pub telefone: Option<String>,
    #[validate(length(min = 8, max = 13, message = "telefone inválido"))]
    pub telefone2: Option<String>,
    pub endereco: Option<String>,
    pub numero: Option<String>,
    pub bairro: Option<String>,
    pub cidade: Option<String>,
    #[validate(length(equal = 2, message = "UF deve ter 2 letras"))]
    pub estado: Option<String>,
    #[validate(length(equal = 8, message = "CEP deve ter 8 dígitos"))]
    pub cep: Option<String>,
    pub observacoes: Option<String>,
}

impl PatientInput {
    /// Normaliza CPF/telefones/CEP para dígitos e valida o formulário
    pub fn prepare(mut self) -> Result<Self> {
        self.nome = self.nome.trim().to_string();
        self.cpf = match trimmed(self.cpf) {
            Some(cpf) => Some(format::normalize_cpf(&cpf)?),
            None => None,
        };
        self.telefone = digits_or_none(self.telefone);
        self.telefone2 = digits_or_none(self.telefone2);
        self.cep = digits_or_none(self.cep);
        self.estado = trimmed(self.estado).map(|uf| uf.to_uppercase());
        self.endereco = trimmed(self.endereco);
        self.numero = trimmed(self.numero);
        self.bairro = trimmed(self.bairro);
        self.cidade = trimmed(self.cidade);
        self.observacoes = trimmed(self.observacoes);
        self.validate()?;
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Médicos
// ---------------------------------------------------------------------------

/// Médico cadastrado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Doctor {
    pub id: i64,
    pub nome: String,
    pub especialidade: Option<String>,
    pub crm: String,
    pub telefone: Option<String>,
    pub usuario_id: Option<i64>,
}

/// Dados do formulário de médico
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DoctorInput {
    #[validate(custom = "non_blank")]
    pub nome: String,
    pub especialidade: Option<String>,
    #[validate(custom = "non_blank")]
    pub crm: String,
    #[validate(length(min = 8, max = 13, message = "telefone inválido"))]
    pub telefone: Option<String>,
    pub usuario_id: Option<i64>,
}

impl DoctorInput {
    pub fn prepare(mut self) -> Result<Self> {
        self.nome = self.nome.trim().to_string();
        self.crm = self.crm.trim().to_uppercase();
        self.especialidade = trimmed(self.especialidade);
        self.telefone = digits_or_none(self.telefone);
        self.validate()?;
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Tipos de consulta e horários de atendimento
// ---------------------------------------------------------------------------

/// Tipo de consulta com duração configurada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AppointmentType {
    pub id: i64,
    pub nome: String,
    pub duracao_minutos: i64,
    /// Valor em centavos
    pub valor: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppointmentTypeInput {
    #[validate(custom = "non_blank")]
    pub nome: String,
    #[validate(range(min = 1, max = 1440, message = "duração deve ser positiva"))]
    pub duracao_minutos: i64,
    #[validate(range(min = 0, message = "valor negativo"))]
    pub valor: i64,
}

/// Janela de atendimento de um médico em um dia da semana
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingHours {
    pub id: i64,
    pub medico_id: i64,
    /// 0 = segunda ... 6 = domingo
    pub dia_semana: i64,
    pub hora_inicio: TimeValue,
    pub hora_fim: TimeValue,
}

impl FromRow<'_, SqliteRow> for WorkingHours {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            medico_id: row.try_get("medico_id")?,
            dia_semana: row.try_get("dia_semana")?,
            hora_inicio: decode_time(row, "hora_inicio")?,
            hora_fim: decode_time(row, "hora_fim")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorkingHoursInput {
    pub medico_id: i64,
    #[validate(range(min = 0, max = 6, message = "dia da semana entre 0 e 6"))]
    pub dia_semana: i64,
    pub hora_inicio: chrono::NaiveTime,
    pub hora_fim: chrono::NaiveTime,
}

impl WorkingHoursInput {
    pub fn prepare(self) -> Result<Self> {
        self.validate()?;
        if self.hora_inicio >= self.hora_fim {
            return Err(crate::ClinicError::validation(
                "hora_inicio deve ser anterior a hora_fim",
            ));
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Consultas
// ---------------------------------------------------------------------------

/// Consulta agendada
#[derive(Debug, Clone, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub paciente_id: i64,
    pub medico_id: i64,
    pub data: NaiveDate,
    pub hora: TimeValue,
    /// Texto livre: "Agendado", "Confirmado", ...
    pub status: String,
    pub observacoes: Option<String>,
    pub tipo_consulta_id: Option<i64>,
}

impl FromRow<'_, SqliteRow> for Appointment {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            paciente_id: row.try_get("paciente_id")?,
            medico_id: row.try_get("medico_id")?,
            data: row.try_get("data")?,
            hora: decode_time(row, "hora")?,
            status: row.try_get("status")?,
            observacoes: row.try_get("observacoes")?,
            tipo_consulta_id: row.try_get("tipo_consulta_id")?,
        })
    }
}

/// Dados do formulário de agendamento
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppointmentInput {
    pub paciente_id: i64,
    pub medico_id: i64,
    pub data: NaiveDate,
    pub hora: chrono::NaiveTime,
    /// Usada quando o tipo não informa duração
    #[validate(range(min = 1, max = 1440, message = "duração deve ser positiva"))]
    pub duracao_minutos: i64,
    #[validate(custom = "non_blank")]
    pub status: String,
    pub observacoes: Option<String>,
    pub tipo_consulta_id: Option<i64>,
}

impl AppointmentInput {
    pub fn prepare(mut self) -> Result<Self> {
        self.status = self.status.trim().to_string();
        self.observacoes = trimmed(self.observacoes);
        self.validate()?;
        Ok(self)
    }
}

/// Linha da agenda do dia, já com nomes para exibição
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgendaEntry {
    pub consulta_id: i64,
    pub hora: String,
    pub paciente: String,
    pub medico: String,
    pub status: String,
    pub tipo: Option<String>,
}

impl FromRow<'_, SqliteRow> for AgendaEntry {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let hora = decode_time(row, "hora")?;
        Ok(Self {
            consulta_id: row.try_get("consulta_id")?,
            hora: hora
                .minutes()
                .map(format::format_minutes)
                .unwrap_or_else(|| "--:--".to_string()),
            paciente: row.try_get("paciente")?,
            medico: row.try_get("medico")?,
            status: row.try_get("status")?,
            tipo: row.try_get("tipo")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Usuários
// ---------------------------------------------------------------------------

/// Perfil de acesso do usuário
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Medico,
    Recepcao,
    Financeiro,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Medico => "medico",
            Role::Recepcao => "recepcao",
            Role::Financeiro => "financeiro",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::ClinicError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "medico" => Ok(Role::Medico),
            "recepcao" => Ok(Role::Recepcao),
            "financeiro" => Ok(Role::Financeiro),
            other => Err(crate::ClinicError::validation(format!(
                "Perfil desconhecido: {}",
                other
            ))),
        }
    }
}

/// Usuário do sistema; a senha nunca sai serializada
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub login: String,
    #[serde(skip)]
    pub senha: String,
    pub nome: String,
    pub perfil: Role,
    pub ativo: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserInput {
    #[validate(length(min = 3, max = 50, message = "login entre 3 e 50 caracteres"))]
    pub login: String,
    #[validate(length(min = 6, message = "senha com pelo menos 6 caracteres"))]
    pub senha: String,
    #[validate(custom = "non_blank")]
    pub nome: String,
    pub perfil: Role,
}

impl UserInput {
    pub fn prepare(mut self) -> Result<Self> {
        self.login = self.login.trim().to_lowercase();
        self.nome = self.nome.trim().to_string();
        self.validate()?;
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Prontuário, modelos de texto e receitas
// ---------------------------------------------------------------------------

/// Entrada de prontuário
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MedicalRecord {
    pub id: i64,
    pub paciente_id: i64,
    pub usuario_id: i64,
    pub conteudo: String,
    pub criado_em: NaiveDateTime,
}

/// Modelo de texto reutilizável (atestados, pedidos de exame)
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct TextTemplate {
    pub id: i64,
    pub nome: String,
    pub conteudo: String,
    pub usuario_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TextTemplateInput {
    #[validate(custom = "non_blank")]
    pub nome: String,
    #[validate(custom = "non_blank")]
    pub conteudo: String,
    pub usuario_id: Option<i64>,
}

/// Receita emitida
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Prescription {
    pub id: i64,
    pub paciente_id: i64,
    pub medico_id: i64,
    pub data: NaiveDate,
    pub conteudo: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PrescriptionInput {
    pub paciente_id: i64,
    pub medico_id: i64,
    pub data: NaiveDate,
    #[validate(custom = "non_blank")]
    pub conteudo: String,
}

// ---------------------------------------------------------------------------
// Financeiro
// ---------------------------------------------------------------------------

/// Forma de pagamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PaymentMethod {
    Dinheiro,
    CartaoCredito,
    CartaoDebito,
    Pix,
    /// Pendura / Conta Cliente: lança na conta do paciente
    Pendura,
}

impl PaymentMethod {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Dinheiro => "Dinheiro",
            PaymentMethod::CartaoCredito => "Cartão de Crédito",
            PaymentMethod::CartaoDebito => "Cartão de Débito",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::Pendura => "Pendura / Conta Cliente",
        }
    }

    /// Indica se o valor vai para a conta do cliente em vez de ser recebido
    pub fn defers_charge(&self) -> bool {
        matches!(self, PaymentMethod::Pendura)
    }
}

/// Situação de um lançamento
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pago,
    Pendente,
}

/// Lançamento financeiro
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct FinancialEntry {
    pub id: i64,
    pub paciente_id: Option<i64>,
    pub consulta_id: Option<i64>,
    pub descricao: String,
    /// Centavos
    pub valor: i64,
    pub forma_pagamento: PaymentMethod,
    pub status: PaymentStatus,
    pub data: NaiveDate,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentInput {
    pub paciente_id: Option<i64>,
    pub consulta_id: Option<i64>,
    #[validate(custom = "non_blank")]
    pub descricao: String,
    #[validate(range(min = 1, message = "valor deve ser positivo"))]
    pub valor: i64,
    pub forma_pagamento: PaymentMethod,
    pub data: NaiveDate,
}

/// Saldo da conta do cliente (Pendura)
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct CustomerTab {
    pub paciente_id: i64,
    /// Centavos em aberto
    pub saldo: i64,
    pub atualizado_em: NaiveDateTime,
}

/// Total do dia por forma de pagamento
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MethodTotal {
    pub forma_pagamento: PaymentMethod,
    pub total: i64,
    pub quantidade: i64,
}
