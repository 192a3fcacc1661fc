//! Reshapes the provider's model list into Ollama-style model cards.

use crate::gemini::ModelEntry;
use serde::Serialize;
use sha2::{Digest, Sha256};

const MODEL_NAMESPACE_PREFIX: &str = "models/";

/// Placeholder size; the provider does not expose model sizes.
const SENTINEL_SIZE_BYTES: u64 = 16_106_127_360;

#[derive(Debug, Clone, Serialize)]
pub struct ModelDetails {
    pub families: Vec<String>,
    pub family: String,
    pub format: String,
    pub parameter_size: String,
    pub quantization_level: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelCard {
    pub details: ModelDetails,
    pub digest: String,
    pub display_name: String,
    pub model: String,
    pub modified_at: String,
    pub name: String,
    pub size: u64,
}

/// Builds cards for every entry that supports content generation.
///
/// The digest is the hex SHA-256 of the de-namespaced model name; it is a
/// stable identifier for clients that key on digests, not an integrity
/// check. Format, parameter size, and quantization are fixed sentinels the
/// provider cannot report.
pub fn build_model_cards(entries: &[ModelEntry]) -> Vec<ModelCard> {
    entries
        .iter()
        .filter(|entry| entry.supports_generation)
        .map(|entry| {
            let base_name = entry
                .name
                .strip_prefix(MODEL_NAMESPACE_PREFIX)
                .unwrap_or(&entry.name);
            ModelCard {
                details: ModelDetails {
                    families: vec![entry.display_name.clone()],
                    family: "gemini".to_string(),
                    format: "gguf".to_string(),
                    parameter_size: "N/A".to_string(),
                    quantization_level: "F16".to_string(),
                },
                digest: hex::encode(Sha256::digest(base_name.as_bytes())),
                display_name: entry.display_name.clone(),
                model: base_name.to_string(),
                modified_at: chrono::Utc::now().to_rfc3339(),
                name: base_name.to_string(),
                size: SENTINEL_SIZE_BYTES,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, display_name: &str, supports_generation: bool) -> ModelEntry {
        ModelEntry {
            name: name.to_string(),
            display_name: display_name.to_string(),
            supports_generation,
        }
    }

    #[test]
    fn strips_namespace_and_digests_base_name() {
        let cards = build_model_cards(&[entry("models/foo", "Foo", true)]);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].model, "foo");
        assert_eq!(cards[0].name, "foo");
        // hex SHA-256 of the literal string "foo"
        assert_eq!(
            cards[0].digest,
            "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"
        );
    }

    #[test]
    fn filters_non_generative_models() {
        let cards = build_model_cards(&[
            entry("models/gemini-pro", "Gemini Pro", true),
            entry("models/embedding-001", "Embedding", false),
        ]);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].model, "gemini-pro");
    }

    #[test]
    fn cards_carry_sentinel_details() {
        let cards = build_model_cards(&[entry("models/gemini-pro", "Gemini Pro", true)]);
        let card = &cards[0];
        assert_eq!(card.details.family, "gemini");
        assert_eq!(card.details.families, vec!["Gemini Pro".to_string()]);
        assert_eq!(card.details.format, "gguf");
        assert_eq!(card.details.parameter_size, "N/A");
        assert_eq!(card.details.quantization_level, "F16");
        assert_eq!(card.size, SENTINEL_SIZE_BYTES);
    }
}
