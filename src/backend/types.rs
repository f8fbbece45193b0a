//! Tipos de dados para requisições e respostas do serviço de trajetórias.
//!
//! Os corpos JSON derivam `Serialize`/`Deserialize`; os formulários multipart
//! são montados a partir de pares campo/valor via [`GenerationRequest::form_fields`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WizardError;
use crate::workflow::GenerationMethod;

/// Resposta do endpoint de treino: identificador do job assíncrono.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainResponse {
    pub task_id: String,
}

/// Estatísticas do modelo treinado.
///
/// Os três contadores conhecidos são tipados; qualquer outra chave enviada
/// pelo servidor é preservada em `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStats {
    /// Número de células da grade criadas sobre a área de estudo.
    #[serde(default)]
    pub cells_created: u64,
    #[serde(default)]
    pub unique_bigrams: u64,
    #[serde(default)]
    pub unique_trigrams: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Corpo JSON para carregar estatísticas de um cache existente.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub cache_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub stats: ModelStats,
}

/// Parâmetros de geração enviados como multipart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub num_trajectories: u32,
    pub generation_method: GenerationMethod,
    pub cache_file: String,
    /// Ausente para o método ponto-a-ponto.
    pub trajectory_len: Option<u32>,
    /// Pede ao servidor que apague o cache depois de usá-lo.
    pub delete_cache_after: bool,
}

impl GenerationRequest {
    /// Campos do formulário multipart, na ordem em que o servidor os lê.
    /// Campos opcionais ausentes não são enviados.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("num_trajectories", self.num_trajectories.to_string()),
            ("generation_method", self.generation_method.as_str().to_string()),
            ("cache_file", self.cache_file.clone()),
        ];
        if let Some(len) = self.trajectory_len {
            fields.push(("trajectory_len", len.to_string()));
        }
        if self.delete_cache_after {
            fields.push(("delete_cache_after", "true".to_string()));
        }
        fields
    }
}

/// Resultado síncrono da geração: arquivo gerado e dois payloads de visualização.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub generated_file: Option<String>,
    #[serde(default)]
    pub visualization: Value,
    #[serde(default)]
    pub heatmap: Value,
}

/// Corpo JSON para o map-matching das trajetórias geradas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapMatchRequest {
    pub filename: String,
    /// Percentual (0, 100] das trajetórias a processar.
    pub percentage: f64,
}

impl MapMatchRequest {
    pub fn new(filename: impl Into<String>, percentage: f64) -> Result<Self, WizardError> {
        let filename = filename.into();
        if filename.trim().is_empty() {
            return Err(WizardError::Validation("no file name provided".into()));
        }
        if !(percentage > 0.0 && percentage <= 100.0) {
            return Err(WizardError::Validation(format!(
                "percentage must be in (0, 100] (got {percentage})"
            )));
        }
        Ok(Self {
            filename,
            percentage,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapMatchResponse {
    pub map_data: Value,
    pub output_file: String,
}

/// Extrai uma mensagem legível do corpo de uma resposta.
///
/// Aceita string JSON, objeto com `message`/`error`/`Error`, ou texto puro.
pub fn message_from_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => ["message", "error", "Error", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| body.trim().to_string()),
        _ => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_deserialize_from_api_format() {
        let json = r#"{"cellsCreated": 1200, "uniqueBigrams": 340, "uniqueTrigrams": 512, "area": "porto"}"#;
        let stats: ModelStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.cells_created, 1200);
        assert_eq!(stats.unique_bigrams, 340);
        assert_eq!(stats.unique_trigrams, 512);
        assert_eq!(stats.extra.get("area").unwrap(), "porto");
    }

    #[test]
    fn stats_tolerate_missing_counters() {
        let stats: ModelStats = serde_json::from_str("{}").unwrap();
        assert_eq!(stats, ModelStats::default());
    }

    #[test]
    fn generation_fields_for_length_constrained() {
        let req = GenerationRequest {
            num_trajectories: 200,
            generation_method: GenerationMethod::LengthConstrained,
            cache_file: "cache_50.pkl".into(),
            trajectory_len: Some(100),
            delete_cache_after: true,
        };
        assert_eq!(
            req.form_fields(),
            vec![
                ("num_trajectories", "200".to_string()),
                ("generation_method", "length_constrained".to_string()),
                ("cache_file", "cache_50.pkl".to_string()),
                ("trajectory_len", "100".to_string()),
                ("delete_cache_after", "true".to_string()),
            ]
        );
    }

    #[test]
    fn generation_fields_omit_absent_options() {
        let req = GenerationRequest {
            num_trajectories: 100,
            generation_method: GenerationMethod::PointToPoint,
            cache_file: "cache_50.pkl".into(),
            trajectory_len: None,
            delete_cache_after: false,
        };
        let names: Vec<_> = req.form_fields().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["num_trajectories", "generation_method", "cache_file"]);
    }

    #[test]
    fn generation_result_without_file() {
        let json = r#"{"visualization": {"center": [41.1, -8.6]}, "heatmap": {}}"#;
        let result: GenerationResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.generated_file, None);
        assert!(result.visualization.get("center").is_some());
    }

    #[test]
    fn map_match_percentage_bounds() {
        assert!(MapMatchRequest::new("gen.csv", 0.0).is_err());
        assert!(MapMatchRequest::new("gen.csv", 100.5).is_err());
        assert!(MapMatchRequest::new("gen.csv", f64::NAN).is_err());
        assert!(MapMatchRequest::new("", 10.0).is_err());
        let req = MapMatchRequest::new("gen.csv", 100.0).unwrap();
        assert_eq!(req.percentage, 100.0);
    }

    #[test]
    fn message_from_various_bodies() {
        assert_eq!(message_from_body(r#""Renamed ok""#), "Renamed ok");
        assert_eq!(message_from_body(r#"{"message": "done"}"#), "done");
        assert_eq!(message_from_body(r#"{"Error": "No file name provided"}"#), "No file name provided");
        assert_eq!(message_from_body("File not found\n"), "File not found");
    }
}
