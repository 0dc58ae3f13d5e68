//! Interface de linha de comando baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, run)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Servidor de jobs de pentest assíncronos com consulta por identificador.
#[derive(Debug, Parser)]
#[command(name = "pentest-jobs", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: ./pentest.toml).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Inicia o servidor HTTP e aceita jobs até receber Ctrl-C/SIGTERM.
    Serve {
        /// Endereço de escuta, sobrepõe `bind` do arquivo.
        #[arg(long)]
        bind: Option<String>,

        /// Tamanho do worker pool, sobrepõe `workers` do arquivo.
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Executa um único job em primeiro plano e imprime o registro final.
    Run {
        /// Alvo do pentest (host, IP ou URL).
        target: String,

        /// Limite de tempo deste job, em segundos.
        #[arg(long)]
        timeout: Option<u64>,
    },
}
