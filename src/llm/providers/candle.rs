//! In-process GGUF inference with candle.
//!
//! Weights and tokenizer are fetched from the Hugging Face hub (and cached
//! there by `hf-hub`). Only llama-family quantized models are supported.
//! Output follows the text-generation pipeline shape:
//! `[{"generated_text": prompt + completion}]`.

use std::fs::File;
use std::sync::Arc;

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use serde_json::{Value, json};
use tokenizers::Tokenizer;
use tracing::debug;

use crate::config::LocalConfig;
use crate::llm::ProviderError;

use super::local::{PipelineLoader, Placement, TextGenerator};

const EOS_TOKENS: [&str; 3] = ["</s>", "<|endoftext|>", "<|eot_id|>"];

#[derive(Debug, Clone)]
pub struct CandleLoader {
    gguf_file: String,
    tokenizer_repo: String,
    seed: u64,
}

impl CandleLoader {
    pub fn new(config: &LocalConfig) -> Self {
        Self {
            gguf_file: config.gguf_file.clone(),
            tokenizer_repo: config.tokenizer_repo.clone(),
            seed: config.seed,
        }
    }
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Unavailable(format!("{context}: {e}"))
}

fn select_device(placement: Placement) -> Result<Device, ProviderError> {
    match placement {
        Placement::Cpu => Ok(Device::Cpu),
        Placement::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0).map_err(|e| unavailable("cuda device", e))
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0).map_err(|e| unavailable("metal device", e))
            } else {
                Ok(Device::Cpu)
            }
        }
    }
}

impl PipelineLoader for CandleLoader {
    fn load(&self, model: &str, placement: Placement) -> Result<Arc<dyn TextGenerator>, ProviderError> {
        let device = select_device(placement)?;

        let api = hf_hub::api::sync::Api::new().map_err(|e| unavailable("hub client", e))?;
        let weights_path = api
            .model(model.to_string())
            .get(&self.gguf_file)
            .map_err(|e| unavailable("fetch weights", e))?;
        let tokenizer_path = api
            .model(self.tokenizer_repo.clone())
            .get("tokenizer.json")
            .map_err(|e| unavailable("fetch tokenizer", e))?;

        let mut file = File::open(&weights_path)
            .map_err(|e| unavailable("open weights", e))?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| unavailable("read gguf", e))?;
        let weights = ModelWeights::from_gguf(content, &mut file, &device)
            .map_err(|e| unavailable("build model", e))?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| unavailable("load tokenizer", e))?;

        let eos = EOS_TOKENS.iter().find_map(|t| tokenizer.token_to_id(t));
        debug!(%model, ?device, ?eos, "gguf model loaded");

        Ok(Arc::new(CandleGenerator {
            weights,
            tokenizer,
            device,
            eos,
            seed: self.seed,
        }))
    }
}

struct CandleGenerator {
    // Never run directly. Each call forwards on its own clone: tensors are
    // shared, the kv-cache is not.
    weights: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos: Option<u32>,
    seed: u64,
}

fn inference(e: impl std::fmt::Display) -> ProviderError {
    ProviderError::Inference(e.to_string())
}

impl TextGenerator for CandleGenerator {
    fn generate(&self, prompt: &str, max_length: usize, temperature: f64) -> Result<Value, ProviderError> {
        let encoding = self.tokenizer.encode(prompt, true).map_err(inference)?;
        let mut tokens = encoding.get_ids().to_vec();
        let budget = max_length.saturating_sub(tokens.len());

        let temperature = (temperature > 0.0).then_some(temperature);
        let mut sampler = LogitsProcessor::new(self.seed, temperature, None);

        let mut weights = self.weights.clone();

        let mut generated = Vec::with_capacity(budget);
        for step in 0..budget {
            // First step feeds the whole prompt; later steps feed the last token.
            let (context, pos) = if step == 0 {
                (&tokens[..], 0)
            } else {
                (&tokens[tokens.len() - 1..], tokens.len() - 1)
            };
            let input = Tensor::new(context, &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(inference)?;
            let logits = weights
                .forward(&input, pos)
                .and_then(|l| l.squeeze(0))
                .map_err(inference)?;
            let next = sampler.sample(&logits).map_err(inference)?;
            if Some(next) == self.eos {
                break;
            }
            tokens.push(next);
            generated.push(next);
        }

        let completion = self.tokenizer.decode(&generated, true).map_err(inference)?;
        Ok(json!([{ "generated_text": format!("{prompt}{completion}") }]))
    }
}
