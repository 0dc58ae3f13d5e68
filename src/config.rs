//! Configuração do serviço carregada a partir de `pentest.toml`.
//!
//! A struct [`ServiceConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis de ambiente `EXECUTOR_MAX_WORKERS` e `FRONTEND_ORIGIN` têm
//! precedência sobre o arquivo.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Arquivo lido quando nenhum caminho é passado via `--config`.
pub const DEFAULT_CONFIG_FILE: &str = "pentest.toml";

/// Configuração de nível superior carregada de `pentest.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Endereço onde o servidor HTTP escuta.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Número de slots do worker pool (tarefas executando simultaneamente).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Única origem permitida pela política CORS.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    /// Teto de duração de um job, em segundos.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Tempo máximo de espera pelos jobs em andamento no desligamento.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Scanner externo executado por cada job.
    #[serde(default)]
    pub task: TaskConfig,
}

/// Programa externo invocado como `program args... <target>`.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

// Valor padrão para o endereço: todas as interfaces, porta 8000.
fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

// Valor padrão para o tamanho do pool: 4.
fn default_workers() -> usize {
    4
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

// Valor padrão para o teto: 2 dias.
fn default_job_timeout_secs() -> u64 {
    2 * 24 * 60 * 60
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_program() -> String {
    "nmap".to_string()
}

fn default_args() -> Vec<String> {
    vec!["-sV".to_string()]
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            workers: default_workers(),
            cors_origin: default_cors_origin(),
            job_timeout_secs: default_job_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            task: TaskConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Carrega a configuração de `path`, ou de `pentest.toml` no diretório
    /// atual. Usa valores padrão se o arquivo padrão não existir; um caminho
    /// explícito inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, AppError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str::<ServiceConfig>(&contents)?)
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), AppError> {
        if let Some(raw) = lookup("EXECUTOR_MAX_WORKERS").filter(|v| !v.is_empty()) {
            self.workers = raw.parse().map_err(|_| {
                AppError::Config(format!("EXECUTOR_MAX_WORKERS is not a number: {raw}"))
            })?;
        }
        if let Some(origin) = lookup("FRONTEND_ORIGIN").filter(|v| !v.is_empty()) {
            self.cors_origin = origin;
        }
        Ok(())
    }

    /// Rejeita combinações que impediriam o serviço de funcionar.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".into()));
        }
        if self.job_timeout_secs == 0 {
            return Err(AppError::Config("job_timeout_secs must be at least 1".into()));
        }
        if self.task.program.trim().is_empty() {
            return Err(AppError::Config("task.program must not be empty".into()));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        self.bind
            .parse()
            .map_err(|_| AppError::Config(format!("invalid bind address: {}", self.bind)))
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
