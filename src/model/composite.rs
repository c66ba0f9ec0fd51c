//! Composite IC50 model: molecule encoder + gene attention + fusion head.
//!
//! Wraps every component into a single `Module` that can be saved and
//! loaded as a unit.
//!
//! ```text
//! tokens ─► MoleculeEncoder ─► latent ─► SequenceExpander ─► hidden states ─┐
//!                               │                                           │
//! genes ──► GeneAttention ──────┼─► attended genes        ContextualAttention ◄── genes
//!                               │                                           │
//!                               └──────────► FusionHead ◄─── context ───────┘
//! ```
//!
//! With `score_matrix` enabled the hidden states and genes also pass
//! through a [`MatrixAttention`] layer whose gene × position scores come
//! back in the output for interpretation. The prediction does not use it.

use std::path::Path;

use burn::config::Config;
use burn::module::Module;
use burn::prelude::*;

use super::contextual::{ContextualAttention, ContextualAttentionConfig};
use super::encoder::{ConvStackConfig, MoleculeEncoder, MoleculeEncoderConfig, MoleculeEncoding};
use super::expander::{SequenceExpander, SequenceExpanderConfig};
use super::gene_attention::{GeneAttention, GeneAttentionConfig, GeneInput};
use super::head::{FusionHead, FusionHeadConfig};
use super::matrix_attention::{MatrixAttention, MatrixAttentionConfig, MatrixAttentionOutput};
use super::ops::{expect_batch, expect_dims};
use crate::error::{ModelError, Result};

/// Gene panel size of the reference configuration.
pub const DEFAULT_NUM_GENES: usize = 2128;

/// Configuration for the full IC50 model.
#[derive(Config, Debug)]
pub struct Ic50McaConfig {
    /// Token vocabulary size; id 0 is padding.
    pub vocab_size: usize,
    /// Padded token sequence length.
    pub max_len: usize,
    #[config(default = 128)]
    pub embedding_dim: usize,
    #[config(default = 64)]
    pub latent_dim: usize,
    /// LSTM width of the molecule hidden-state sequence.
    #[config(default = 256)]
    pub hidden_dim: usize,
    #[config(default = 2128)]
    pub num_genes: usize,
    /// Features per gene; 1 for expression only.
    #[config(default = 1)]
    pub gene_feature_count: usize,
    #[config(default = 256)]
    pub attention_size: usize,
    /// Dropout rate (inactive on non-autodiff backends).
    #[config(default = 0.2)]
    pub dropout_rate: f64,
    #[config(default = 0.2)]
    pub recurrent_dropout: f64,
    #[config(default = 1.0)]
    pub epsilon_std: f64,
    /// Fusion head dense widths.
    #[config(default = "vec![2048, 1024, 512]")]
    pub head_widths: Vec<usize>,
    #[config(default = "ConvStackConfig::new()")]
    pub conv: ConvStackConfig,
    /// Also compute gene × molecule score-matrix attention.
    #[config(default = false)]
    pub score_matrix: bool,
}

/// Composite model.
#[derive(Module, Debug)]
pub struct Ic50Mca<B: Backend> {
    pub encoder: MoleculeEncoder<B>,
    pub expander: SequenceExpander<B>,
    pub gene_attention: GeneAttention<B>,
    pub contextual: ContextualAttention<B>,
    pub head: FusionHead<B>,
    pub matrix: Option<MatrixAttention<B>>,
    max_len: usize,
}

/// Everything one forward pass produces.
#[derive(Debug, Clone)]
pub struct Ic50Output<B: Backend> {
    /// [batch] — predicted IC50, unconstrained (log scale by convention).
    pub prediction: Tensor<B, 1>,
    /// [batch, num_genes] — gene self-attention weights.
    pub gene_alphas: Tensor<B, 2>,
    /// [batch, max_len - 1] — contextual attention over the molecule sequence.
    pub context_alphas: Tensor<B, 2>,
    pub encoding: MoleculeEncoding<B>,
    /// Present when the model was built with `score_matrix`.
    pub score_matrix: Option<MatrixAttentionOutput<B>>,
}

impl Ic50McaConfig {
    /// Length of the molecule hidden-state sequence.
    pub fn sequence_len(&self) -> usize {
        self.max_len.saturating_sub(1)
    }

    /// Width of the concatenated fusion-head input.
    pub fn fusion_width(&self) -> usize {
        self.hidden_dim + 4 * self.latent_dim + 2 * self.num_genes
    }

    pub fn encoder_config(&self) -> MoleculeEncoderConfig {
        MoleculeEncoderConfig::new(self.vocab_size, self.max_len)
            .with_embedding_dim(self.embedding_dim)
            .with_latent_dim(self.latent_dim)
            .with_dropout(self.dropout_rate)
            .with_epsilon_std(self.epsilon_std)
            .with_conv(self.conv.clone())
    }

    /// Reject constants that cannot build a consistent model.
    pub fn validate(&self) -> Result<()> {
        if self.max_len < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "max_len must be at least 2, got {}",
                self.max_len
            )));
        }
        for (name, value) in [
            ("hidden_dim", self.hidden_dim),
            ("num_genes", self.num_genes),
            ("gene_feature_count", self.gene_feature_count),
            ("attention_size", self.attention_size),
        ] {
            if value == 0 {
                return Err(ModelError::InvalidConfig(format!("{} must be non-zero", name)));
            }
        }
        for (name, rate) in [
            ("dropout_rate", self.dropout_rate),
            ("recurrent_dropout", self.recurrent_dropout),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(ModelError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, rate
                )));
            }
        }
        if self.head_widths.is_empty() || self.head_widths.contains(&0) {
            return Err(ModelError::InvalidConfig(format!(
                "head_widths must be non-empty and non-zero, got {:?}",
                self.head_widths
            )));
        }
        self.encoder_config().validate()
    }

    /// Initialize the composite model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Ic50Mca<B>> {
        self.validate()?;

        let encoder = self.encoder_config().init(device)?;

        let expander = SequenceExpanderConfig::new(
            4 * self.latent_dim,
            self.hidden_dim,
            self.sequence_len(),
        )
        .with_recurrent_dropout(self.recurrent_dropout)
        .init(device);

        let gene_attention = GeneAttentionConfig::new(self.num_genes)
            .with_gene_feature_count(self.gene_feature_count)
            .init(device);

        let contextual = ContextualAttentionConfig::new(self.num_genes, self.hidden_dim)
            .with_attention_size(self.attention_size)
            .with_gene_feature_count(self.gene_feature_count)
            .init(device);

        let head = FusionHeadConfig::new(self.fusion_width())
            .with_widths(self.head_widths.clone())
            .with_dropout(self.dropout_rate)
            .init(device);

        let matrix = self.score_matrix.then(|| {
            MatrixAttentionConfig::new(self.hidden_dim)
                .with_gene_feature_count(self.gene_feature_count)
                .init(device)
        });

        tracing::debug!(
            score_matrix = self.score_matrix,
            fusion_width = self.fusion_width(),
            sequence_len = self.sequence_len(),
            num_genes = self.num_genes,
            "initialized IC50 model"
        );

        Ok(Ic50Mca {
            encoder,
            expander,
            gene_attention,
            contextual,
            head,
            matrix,
            max_len: self.max_len,
        })
    }

    /// Load a JSON configuration written by [`Config::save`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::load(path).map_err(|e| {
            ModelError::InvalidConfig(format!("reading {}: {}", path.display(), e))
        })
    }
}

impl<B: Backend> Ic50Mca<B> {
    /// Predict IC50 for a batch of (molecule, gene profile) pairs.
    ///
    /// - `tokens`: [batch, max_len] — padded token ids
    /// - `genes`: [batch, num_genes] or [batch, num_genes, features]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>, genes: &GeneInput<B>) -> Result<Ic50Output<B>> {
        let [batch, len] = tokens.dims();
        expect_batch("tokens", batch)?;
        expect_dims("tokens", [batch, len], [genes.batch_size(), self.max_len])?;

        let encoding = self.encoder.forward(tokens)?;
        let hidden = self.expander.forward(encoding.latent.clone())?;

        let genes_out = self.gene_attention.forward(genes)?;
        let score_matrix = match &self.matrix {
            Some(layer) => Some(layer.forward(genes, hidden.clone())?),
            None => None,
        };
        let context = self.contextual.forward(genes, hidden)?;

        let prediction = self
            .head
            .forward(
                context.context,
                encoding.latent.clone(),
                genes_out.attended,
                genes_out.genes,
            )?
            .squeeze_dim::<1>(1);

        Ok(Ic50Output {
            prediction,
            gene_alphas: genes_out.alphas,
            context_alphas: context.alphas,
            encoding,
            score_matrix,
        })
    }

    /// Per-position weighted molecule sequence for visualization:
    /// [batch, max_len - 1, hidden_dim] plus its alphas.
    pub fn context_sequence(
        &self,
        tokens: Tensor<B, 2, Int>,
        genes: &GeneInput<B>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 2>)> {
        let [batch, len] = tokens.dims();
        expect_batch("tokens", batch)?;
        expect_dims("tokens", [batch, len], [genes.batch_size(), self.max_len])?;

        let encoding = self.encoder.forward(tokens)?;
        let hidden = self.expander.forward(encoding.latent)?;
        self.contextual.forward_sequence(genes, hidden)
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }
}

// ─── Tests ────────────────────────────────────────────────────────
