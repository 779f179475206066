//! Clinica Desk - ponto de entrada da aplicação da clínica
//!
//! Uso:
//!   clinica-desk [config.json]
//!   clinica-desk [config.json] print <arquivo> [impressora]
//!   clinica-desk [config.json] receita <id> [impressora]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clinica_db::config::{self, AppConfig};
use clinica_db::permissions::PermissionChecker;
use clinica_db::print::{self, SpoolDirDriver};
use clinica_db::repo::{appointments, prescriptions};
use clinica_db::{init_db_pool, ClinicError};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Agenda,
    PrintFile { file: PathBuf, printer: Option<String> },
    PrintPrescription { id: i64, printer: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Cli {
    config_path: Option<PathBuf>,
    command: Command,
}

fn parse_args(mut args: Vec<String>) -> Result<Cli> {
    let config_path = match args.first() {
        Some(first) if first != "print" && first != "receita" => Some(PathBuf::from(args.remove(0))),
        _ => None,
    };

    let command = match args.first().map(String::as_str) {
        None => Command::Agenda,
        Some("print") => {
            let file = args.get(1).context("uso: print <arquivo> [impressora]")?;
            Command::PrintFile {
                file: PathBuf::from(file),
                printer: args.get(2).cloned(),
            }
        }
        Some("receita") => {
            let id = args
                .get(1)
                .context("uso: receita <id> [impressora]")?
                .parse()
                .context("id da receita inválido")?;
            Command::PrintPrescription {
                id,
                printer: args.get(2).cloned(),
            }
        }
        Some(other) => bail!("comando desconhecido: {}", other),
    };

    Ok(Cli {
        config_path,
        command,
    })
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("Falha ao ler configuração {}", path.display()))?,
        None => AppConfig::load().context("Falha ao ler configuração")?,
    };
    if path.is_some() {
        config.apply_overrides(|key| std::env::var(key).ok())?;
    }
    Ok(config)
}

fn pick_printer(requested: Option<String>, config: &AppConfig) -> Result<String> {
    requested
        .or_else(|| config.printer.clone())
        .context("nenhuma impressora informada e `printer` ausente na configuração")
}

fn print_text(config: &AppConfig, printer: Option<String>, job: &str, text: &str) -> Result<()> {
    let printer = pick_printer(printer, config)?;
    let driver = SpoolDirDriver::new(&config.spool_dir);
    let doc = print::print_text(&driver, &printer, job, text)
        .with_context(|| format!("Falha ao imprimir em {}", printer))?;
    info!("{} página(s) enviadas para {}", doc.pages.len(), printer);
    Ok(())
}

async fn refresh_agenda(pool: &SqlitePool) -> Result<()> {
    let today = Local::now().date_naive();
    let entries = appointments::agenda(pool, today).await?;
    info!("Agenda de {}: {} consulta(s)", today.format("%d/%m/%Y"), entries.len());
    for entry in &entries {
        debug!(
            "{} {} com {} ({})",
            entry.hora, entry.paciente, entry.medico, entry.status
        );
    }
    Ok(())
}

/// Checagem de partida: sem `permission_backend` escolhido a agenda não sobe
fn require_permission_backend(config: &AppConfig, pool: &SqlitePool) -> Result<PermissionChecker> {
    PermissionChecker::from_config(config, pool)
        .context("Defina `permission_backend` (\"json\" ou \"database\") na configuração")
}

async fn run_agenda(pool: &SqlitePool, config: &AppConfig) -> Result<()> {
    require_permission_backend(config, pool)?;

    let every = Duration::from_secs(config.refresh_interval_secs.max(1));
    let mut ticker = tokio::time::interval(every);
    info!("Atualizando a agenda a cada {}s (Ctrl-C encerra)", every.as_secs());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = refresh_agenda(pool).await {
                    warn!("Falha ao atualizar agenda: {:#}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Encerrando");
                break;
            }
        }
    }
    Ok(())
}

/// `RUST_LOG` controla o filtro; `CLINICA_LOG_JSON` troca para saída JSON
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var_os("CLINICA_LOG_JSON").is_some() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = parse_args(std::env::args().skip(1).collect())?;
    let config = load_config(cli.config_path.as_ref())?;

    if let Command::PrintFile { file, printer } = &cli.command {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("Falha ao ler {}", file.display()))?;
        let job = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "documento".to_string());
        return print_text(&config, printer.clone(), &job, &text);
    }

    let pool = match init_db_pool(&config.db_config()).await {
        Ok(pool) => pool,
        Err(ClinicError::ConnectionFailure(e)) => {
            error!("Não foi possível abrir o banco de dados: {}", e);
            error!(
                "Revise a seção `database` em {}",
                cli.config_path
                    .clone()
                    .unwrap_or_else(config::default_config_path)
                    .display()
            );
            bail!("falha de conexão com o banco de dados");
        }
        Err(e) => return Err(e.into()),
    };

    match cli.command {
        Command::PrintPrescription { id, printer } => {
            let text = prescriptions::printable_text(&pool, id, &config.clinic_name).await?;
            print_text(&config, printer, &format!("receita-{}", id), &text)?;
        }
        Command::Agenda => run_agenda(&pool, &config).await?,
        Command::PrintFile { .. } => {}
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_runs_the_agenda() {
        let cli = parse_args(vec![]).unwrap();
        assert_eq!(cli.config_path, None);
        assert_eq!(cli.command, Command::Agenda);
    }

    #[test]
    fn config_path_comes_first() {
        let cli = parse_args(args(&["/etc/clinica.json", "print", "r.txt", "recepcao"])).unwrap();
        assert_eq!(cli.config_path, Some(PathBuf::from("/etc/clinica.json")));
        assert_eq!(
            cli.command,
            Command::PrintFile {
                file: PathBuf::from("r.txt"),
                printer: Some("recepcao".into())
            }
        );
    }

    #[test]
    fn prescription_needs_numeric_id() {
        let cli = parse_args(args(&["receita", "42"])).unwrap();
        assert_eq!(
            cli.command,
            Command::PrintPrescription {
                id: 42,
                printer: None
            }
        );
        assert!(parse_args(args(&["receita", "x"])).is_err());
        assert!(parse_args(args(&["print"])).is_err());
        assert!(parse_args(args(&["c.json", "limpar"])).is_err());
    }

    #[test]
    fn printer_falls_back_to_config() {
        let mut config = AppConfig::default();
        assert!(pick_printer(None, &config).is_err());
        config.printer = Some("recepcao".into());
        assert_eq!(pick_printer(None, &config).unwrap(), "recepcao");
        assert_eq!(pick_printer(Some("sala2".into()), &config).unwrap(), "sala2");
    }

    #[test]
    fn print_file_lands_in_spool() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("recepcao")).unwrap();
        let config = AppConfig {
            spool_dir: dir.path().to_path_buf(),
            printer: Some("recepcao".into()),
            ..Default::default()
        };
        print_text(&config, None, "teste", "<<center>>Olá").unwrap();
        let jobs = std::fs::read_dir(dir.path().join("recepcao")).unwrap().count();
        assert_eq!(jobs, 1);
    }

    #[tokio::test]
    async fn agenda_refuses_to_start_without_permission_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig {
            permissions_file: dir.path().join("permissoes.json"),
            ..Default::default()
        };
        config.database.path = dir.path().join("clinica.db");
        let pool = init_db_pool(&config.db_config()).await.unwrap();

        let err = require_permission_backend(&config, &pool).unwrap_err();
        assert!(format!("{:#}", err).contains("permission_backend"));

        config.permission_backend = Some(clinica_db::config::PermissionBackend::Json);
        assert!(require_permission_backend(&config, &pool).is_ok());
    }
}
