//! Sistema de migrações para banco de dados
//!
//! As migrações são aplicadas em ordem e a versão fica em `PRAGMA user_version`.

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_cadastros_e_agenda.sql
    r#"
    CREATE TABLE IF NOT EXISTS usuarios (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        login TEXT NOT NULL UNIQUE,
        senha TEXT NOT NULL,
        nome TEXT NOT NULL,
        perfil TEXT NOT NULL CHECK (perfil IN ('admin', 'medico', 'recepcao', 'financeiro')),
        ativo BOOLEAN NOT NULL DEFAULT 1,
        criado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS pacientes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nome TEXT NOT NULL,
        data_nascimento DATE,
        cpf TEXT UNIQUE,
        telefone TEXT,
        telefone2 TEXT,
        endereco TEXT,
        numero TEXT,
        bairro TEXT,
        cidade TEXT,
        estado TEXT,
        cep TEXT,
        observacoes TEXT,
        criado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS medicos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nome TEXT NOT NULL,
        especialidade TEXT,
        crm TEXT NOT NULL UNIQUE,
        telefone TEXT,
        usuario_id INTEGER,
        FOREIGN KEY (usuario_id) REFERENCES usuarios (id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS tipos_consulta (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nome TEXT NOT NULL UNIQUE,
        duracao_minutos INTEGER NOT NULL CHECK (duracao_minutos > 0),
        valor INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS consultas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        paciente_id INTEGER NOT NULL,
        medico_id INTEGER NOT NULL,
        data DATE NOT NULL,
        -- sem tipo: segundos e fração do dia de bases antigas ficam como número
        hora NOT NULL,
        status TEXT NOT NULL DEFAULT 'Agendado',
        observacoes TEXT,
        tipo_consulta_id INTEGER,
        criado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (paciente_id) REFERENCES pacientes (id) ON DELETE CASCADE,
        FOREIGN KEY (medico_id) REFERENCES medicos (id) ON DELETE CASCADE,
        FOREIGN KEY (tipo_consulta_id) REFERENCES tipos_consulta (id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS horarios_disponiveis (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        medico_id INTEGER NOT NULL,
        dia_semana INTEGER NOT NULL CHECK (dia_semana BETWEEN 0 AND 6),
        hora_inicio NOT NULL,
        hora_fim NOT NULL,
        FOREIGN KEY (medico_id) REFERENCES medicos (id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_pacientes_nome ON pacientes (nome);
    CREATE INDEX IF NOT EXISTS idx_consultas_medico_data ON consultas (medico_id, data);
    CREATE INDEX IF NOT EXISTS idx_consultas_paciente ON consultas (paciente_id);
    CREATE INDEX IF NOT EXISTS idx_horarios_medico_dia ON horarios_disponiveis (medico_id, dia_semana);
    "#,

    // 002_prontuario_e_financeiro.sql
    r#"
    CREATE TABLE IF NOT EXISTS prontuarios (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        paciente_id INTEGER NOT NULL,
        usuario_id INTEGER NOT NULL,
        conteudo TEXT NOT NULL,
        criado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (paciente_id) REFERENCES pacientes (id) ON DELETE CASCADE,
        FOREIGN KEY (usuario_id) REFERENCES usuarios (id)
    );

    CREATE TABLE IF NOT EXISTS modelos_texto (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nome TEXT NOT NULL,
        conteudo TEXT NOT NULL,
        usuario_id INTEGER,
        FOREIGN KEY (usuario_id) REFERENCES usuarios (id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS receitas (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        paciente_id INTEGER NOT NULL,
        medico_id INTEGER NOT NULL,
        data DATE NOT NULL,
        conteudo TEXT NOT NULL,
        FOREIGN KEY (paciente_id) REFERENCES pacientes (id) ON DELETE CASCADE,
        FOREIGN KEY (medico_id) REFERENCES medicos (id)
    );

    CREATE TABLE IF NOT EXISTS financeiro (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        paciente_id INTEGER,
        consulta_id INTEGER,
        descricao TEXT NOT NULL,
        valor INTEGER NOT NULL CHECK (valor > 0),
        forma_pagamento TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('pago', 'pendente')),
        data DATE NOT NULL,
        FOREIGN KEY (paciente_id) REFERENCES pacientes (id) ON DELETE SET NULL,
        FOREIGN KEY (consulta_id) REFERENCES consultas (id) ON DELETE SET NULL
    );

    CREATE TABLE IF NOT EXISTS contas_cliente (
        paciente_id INTEGER PRIMARY KEY NOT NULL,
        saldo INTEGER NOT NULL DEFAULT 0,
        atualizado_em TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (paciente_id) REFERENCES pacientes (id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_prontuarios_paciente ON prontuarios (paciente_id);
    CREATE INDEX IF NOT EXISTS idx_receitas_paciente ON receitas (paciente_id);
    CREATE INDEX IF NOT EXISTS idx_financeiro_data ON financeiro (data);
    "#,

    // 003_permissoes.sql
    r#"
    CREATE TABLE IF NOT EXISTS perfil (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nome TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS modulos (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        nome TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS botoes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        modulo_id INTEGER NOT NULL,
        nome TEXT NOT NULL,
        UNIQUE (modulo_id, nome),
        FOREIGN KEY (modulo_id) REFERENCES modulos (id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS perfil_permissao (
        perfil_id INTEGER NOT NULL,
        botao_id INTEGER NOT NULL,
        permitido BOOLEAN NOT NULL DEFAULT 0,
        PRIMARY KEY (perfil_id, botao_id),
        FOREIGN KEY (perfil_id) REFERENCES perfil (id) ON DELETE CASCADE,
        FOREIGN KEY (botao_id) REFERENCES botoes (id) ON DELETE CASCADE
    );

    INSERT OR IGNORE INTO perfil (nome) VALUES ('admin'), ('medico'), ('recepcao'), ('financeiro');
    "#,
];

/// Número de migrações conhecidas
pub fn latest_version() -> i64 {
    MIGRATIONS.len() as i64
}

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    let mut version: i64 = 0;
    match sqlx::query_scalar("PRAGMA user_version").fetch_one(pool).await {
        Ok(v) => version = v,
        Err(e) => {
            // Primeira execução em arquivo novo
            error!("Erro ao obter versão do banco: {}", e);
        }
    }

    info!("Versão atual do banco: {}", version);

    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        if migration_version <= version {
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        let mut tx = pool
            .begin()
            .await
            .with_context(|| format!("Falha ao iniciar transação para migração {}", migration_version))?;

        sqlx::query(migration_sql)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Falha ao executar migração {}", migration_version))?;

        sqlx::query(&format!("PRAGMA user_version = {}", migration_version))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Falha ao atualizar versão para {}", migration_version))?;

        tx.commit()
            .await
            .with_context(|| format!("Falha ao confirmar transação para migração {}", migration_version))?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", latest_version());
    Ok(())
}
