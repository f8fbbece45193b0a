//! Interface de linha de comando do trajwiz baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, map-match,
//! download) e flags globais (--server, --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::cache_lifecycle::CacheDecision;
use crate::workflow::{FormSnapshot, GenerationMethod};

/// trajwiz: treina modelos n-gram e gera trajetórias sintéticas.
#[derive(Debug, Parser)]
#[command(name = "trajwiz", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// URL base do serviço de trajetórias.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Número máximo de retentativas em falhas de rede.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Método de geração aceito pela CLI, mapeado para [`GenerationMethod`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    /// Trajetórias com comprimento fixo.
    LengthConstrained,
    /// Trajetórias entre dois pontos; o comprimento é livre.
    PointToPoint,
}

impl From<MethodArg> for GenerationMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::LengthConstrained => GenerationMethod::LengthConstrained,
            MethodArg::PointToPoint => GenerationMethod::PointToPoint,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Percorre o assistente completo: modelo, cache e geração.
    Run(RunArgs),

    /// Faz o map-matching de um arquivo de trajetórias gerado.
    MapMatch {
        /// Nome do arquivo no servidor.
        #[arg(long)]
        file: String,

        /// Percentual das trajetórias a processar, em (0, 100].
        #[arg(long, default_value_t = 100.0)]
        percentage: f64,
    },

    /// Baixa um arquivo gerado pelo servidor.
    Download {
        /// Nome do arquivo no servidor.
        name: String,

        /// Caminho de destino; por padrão, o próprio nome no diretório atual.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Arquivo de amostra (.csv ou .json) para treinar um novo modelo.
    #[arg(long, conflicts_with = "cache", required_unless_present = "cache")]
    pub sample: Option<PathBuf>,

    /// Cache de um modelo já treinado no servidor.
    #[arg(long)]
    pub cache: Option<String>,

    /// Tamanho da célula da grade, em metros (múltiplo de 50).
    #[arg(long, default_value_t = 50)]
    pub cell_size: u32,

    /// Quantidade de trajetórias a gerar (múltiplo de 100).
    #[arg(long, default_value_t = 100)]
    pub count: u32,

    #[arg(long, value_enum)]
    pub method: MethodArg,

    /// Comprimento das trajetórias; obrigatório para length-constrained.
    #[arg(long)]
    pub length: Option<u32>,

    /// Salva o cache treinado com este nome.
    #[arg(long, conflicts_with = "discard_cache")]
    pub save_cache_as: Option<String>,

    /// Apaga o cache treinado depois da geração.
    #[arg(long, default_value_t = false)]
    pub discard_cache: bool,
}

impl RunArgs {
    /// Preenche o formulário do assistente com os argumentos.
    pub fn form(&self) -> FormSnapshot {
        FormSnapshot {
            sample_file: self.sample.clone(),
            cache_artifact_ref: self.cache.clone(),
            cell_size: self.cell_size,
            trajectory_count: self.count,
            generation_method: Some(self.method.into()),
            trajectory_length: self.length,
            delete_cache_after_use: false,
        }
    }

    /// Decisão sobre o cache produzido pelo treino.
    pub fn cache_decision(&self) -> CacheDecision {
        if self.discard_cache {
            CacheDecision::Discard
        } else {
            CacheDecision::Save(self.save_cache_as.clone())
        }
    }
}
