//! Formatação e conversão de valores vindos dos formulários
//!
//! CPF e telefone são gravados só com dígitos; datas chegam no formato
//! brasileiro (`dd/mm/aaaa`) ou ISO; horários chegam em várias formas.

use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::error::{ClinicError, Result};

/// Minutos em um dia
pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// Remove tudo que não for dígito
pub fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normaliza um CPF digitado (com ou sem pontuação) para 11 dígitos
pub fn normalize_cpf(value: &str) -> Result<String> {
    let digits = only_digits(value);
    if digits.len() != 11 {
        return Err(ClinicError::validation(format!(
            "CPF deve ter 11 dígitos, recebeu {}",
            digits.len()
        )));
    }
    if !cpf::valid(&digits) {
        return Err(ClinicError::validation("CPF inválido"));
    }
    Ok(digits)
}

/// Exibe um CPF de 11 dígitos como `000.000.000-00`
pub fn format_cpf(digits: &str) -> String {
    let d = only_digits(digits);
    if d.len() != 11 {
        return digits.to_string();
    }
    format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11])
}

/// Exibe um telefone: `(00) 00000-0000` ou `(00) 0000-0000`
pub fn format_phone(digits: &str) -> String {
    let d = only_digits(digits);
    match d.len() {
        11 => format!("({}) {}-{}", &d[0..2], &d[2..7], &d[7..11]),
        10 => format!("({}) {}-{}", &d[0..2], &d[2..6], &d[6..10]),
        _ => d,
    }
}

/// Lê uma data em `dd/mm/aaaa` ou `aaaa-mm-dd`
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .map_err(|_| ClinicError::validation(format!("Data inválida: '{}'", value)))
}

/// Exibe uma data no formato brasileiro
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Exibe um valor em centavos como `R$ 1.234,56`
pub fn format_brl(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let reais = (cents / 100).to_string();
    let mut grouped = String::with_capacity(reais.len() + reais.len() / 3);
    for (i, c) in reais.chars().enumerate() {
        if i > 0 && (reais.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    format!("{}R$ {},{:02}", sign, grouped, cents % 100)
}

/// Valor de horário como chega do banco ou do formulário
///
/// Cada forma tem seu próprio caminho de conversão; um valor que não
/// converte em nenhum deles é ignorado por quem consome.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeValue {
    /// Hora já tipada
    Time(NaiveTime),
    /// Texto `HH:MM`, `HH:MM:SS` ou `HH:MM:SS.fff`
    Text(String),
    /// Duração desde a meia-noite, em segundos
    Seconds(i64),
    /// Fração do dia (0.5 = 12:00)
    DayFraction(f64),
}

impl TimeValue {
    /// Minutos desde a meia-noite, se o valor for reconhecido
    pub fn minutes(&self) -> Option<i64> {
        match self {
            TimeValue::Time(t) => Some(i64::from(t.hour()) * 60 + i64::from(t.minute())),
            TimeValue::Text(s) => text_minutes(s),
            TimeValue::Seconds(secs) => seconds_minutes(*secs),
            TimeValue::DayFraction(f) => fraction_minutes(*f),
        }
    }

    /// Converte para `NaiveTime`, se reconhecido
    pub fn to_time(&self) -> Option<NaiveTime> {
        self.minutes().and_then(minutes_to_time)
    }
}

impl From<NaiveTime> for TimeValue {
    fn from(t: NaiveTime) -> Self {
        TimeValue::Time(t)
    }
}

impl From<&str> for TimeValue {
    fn from(s: &str) -> Self {
        TimeValue::Text(s.to_string())
    }
}

fn seconds_minutes(secs: i64) -> Option<i64> {
    (0..MINUTES_PER_DAY * 60).contains(&secs).then(|| secs / 60)
}

fn fraction_minutes(f: f64) -> Option<i64> {
    (f.is_finite() && (0.0..1.0).contains(&f)).then(|| (f * MINUTES_PER_DAY as f64).round() as i64)
}

/// Texto de horário; número em texto vale como segundos ou fração do dia
fn text_minutes(value: &str) -> Option<i64> {
    if let Some(t) = parse_time_text(value) {
        return Some(i64::from(t.hour()) * 60 + i64::from(t.minute()));
    }
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return seconds_minutes(secs);
    }
    value.parse::<f64>().ok().and_then(fraction_minutes)
}

fn parse_time_text(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    ["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
}

/// Lê um horário digitado, devolvendo erro de validação quando inválido
pub fn parse_time(value: &str) -> Result<NaiveTime> {
    parse_time_text(value)
        .ok_or_else(|| ClinicError::validation(format!("Horário inválido: '{}'", value)))
}

/// Texto `HH:MM:SS` usado para gravar horários
pub fn time_to_db(t: NaiveTime) -> String {
    t.format("%H:%M:%S").to_string()
}

/// Minutos desde a meia-noite para `NaiveTime` (apenas dentro do dia)
pub fn minutes_to_time(minutes: i64) -> Option<NaiveTime> {
    if !(0..MINUTES_PER_DAY).contains(&minutes) {
        return None;
    }
    NaiveTime::from_hms_opt((minutes / 60) as u32, (minutes % 60) as u32, 0)
}

/// Exibe minutos desde a meia-noite como `HH:MM`
pub fn format_minutes(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}
