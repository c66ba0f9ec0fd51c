//! Gene inputs and the dense gene self-attention layer.
//!
//! The layer scores every gene of the panel from the whole expression
//! profile, softmaxes the scores over the panel and gates the profile
//! with them. Output width equals input width.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, softmax};

use super::ops::expect_dims;
use crate::error::{ModelError, Result};

/// Gene panel values for a batch.
///
/// `Vector` carries one value per gene; `Matrix` adds a per-gene feature
/// axis (e.g. expression plus copy-number variation).
#[derive(Debug, Clone)]
pub enum GeneInput<B: Backend> {
    /// [batch, num_genes]
    Vector(Tensor<B, 2>),
    /// [batch, num_genes, gene_feature_count]
    Matrix(Tensor<B, 3>),
}

impl<B: Backend> GeneInput<B> {
    pub fn batch_size(&self) -> usize {
        match self {
            GeneInput::Vector(t) => t.dims()[0],
            GeneInput::Matrix(t) => t.dims()[0],
        }
    }

    /// View as [batch, num_genes, features]; vectors get a feature axis of 1.
    pub fn to_matrix(&self) -> Tensor<B, 3> {
        match self {
            GeneInput::Vector(t) => t.clone().unsqueeze_dim::<3>(2),
            GeneInput::Matrix(t) => t.clone(),
        }
    }

    /// Check against the panel fixed at construction.
    pub fn check(&self, num_genes: usize, feature_count: usize) -> Result<()> {
        match self {
            GeneInput::Vector(t) => {
                let [batch, genes] = t.dims();
                if feature_count != 1 {
                    return Err(ModelError::shape(
                        "genes",
                        format!("[{}, {}, {}]", batch, num_genes, feature_count),
                        format!("[{}, {}]", batch, genes),
                    ));
                }
                expect_dims("genes", [batch, genes], [batch, num_genes])
            }
            GeneInput::Matrix(t) => {
                let [batch, genes, features] = t.dims();
                expect_dims(
                    "genes",
                    [batch, genes, features],
                    [batch, num_genes, feature_count],
                )
            }
        }
    }
}

/// Configuration for the gene self-attention layer.
#[derive(Config, Debug)]
pub struct GeneAttentionConfig {
    /// Gene panel size.
    pub num_genes: usize,
    /// Features per gene; 1 for plain expression profiles.
    #[config(default = 1)]
    pub gene_feature_count: usize,
}

/// Dense self-attention over the gene panel.
#[derive(Module, Debug)]
pub struct GeneAttention<B: Backend> {
    /// One logit per gene from the full profile: num_genes → num_genes.
    attention: Linear<B>,
    /// Feature collapse for multi-feature genes: features → 1.
    feature_collapse: Option<Linear<B>>,
    num_genes: usize,
    feature_count: usize,
}

/// Result of [`GeneAttention::forward`].
#[derive(Debug, Clone)]
pub struct GeneAttentionOutput<B: Backend> {
    /// [batch, num_genes] — profile gated by `alphas`.
    pub attended: Tensor<B, 2>,
    /// [batch, num_genes] — non-negative, sums to 1 per row.
    pub alphas: Tensor<B, 2>,
    /// [batch, num_genes] — the profile the alphas were computed from.
    pub genes: Tensor<B, 2>,
}

impl GeneAttentionConfig {
    /// Initialize a gene self-attention layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> GeneAttention<B> {
        let feature_collapse = if self.gene_feature_count > 1 {
            Some(LinearConfig::new(self.gene_feature_count, 1).init(device))
        } else {
            None
        };

        GeneAttention {
            attention: LinearConfig::new(self.num_genes, self.num_genes).init(device),
            feature_collapse,
            num_genes: self.num_genes,
            feature_count: self.gene_feature_count,
        }
    }
}

impl<B: Backend> GeneAttention<B> {
    pub fn forward(&self, genes: &GeneInput<B>) -> Result<GeneAttentionOutput<B>> {
        genes.check(self.num_genes, self.feature_count)?;

        let genes = self.collapse(genes);
        let alphas = softmax(self.attention.forward(genes.clone()), 1);
        let attended = genes.clone() * alphas.clone();

        Ok(GeneAttentionOutput {
            attended,
            alphas,
            genes,
        })
    }

    /// Reduce a gene input to one value per gene.
    fn collapse(&self, genes: &GeneInput<B>) -> Tensor<B, 2> {
        match (genes, &self.feature_collapse) {
            (GeneInput::Vector(t), _) => t.clone(),
            (GeneInput::Matrix(t), Some(collapse)) => {
                relu(collapse.forward(t.clone())).squeeze_dim::<2>(2)
            }
            (GeneInput::Matrix(t), None) => t.clone().squeeze_dim::<2>(2),
        }
    }

    pub fn num_genes(&self) -> usize {
        self.num_genes
    }
}
