//! Gene × molecule score-matrix attention (Luong general form).
//!
//! Scores every (gene, position) pair at once, then filters both the
//! molecule sequence and the gene features with their marginal alphas.
//! Gene features are treated like a hidden dimension of their own.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::Initializer;
use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::gene_attention::GeneInput;
use super::ops::{expect_dims, weighted_sum};
use crate::error::Result;

/// Configuration for the score-matrix attention layer.
#[derive(Config, Debug)]
pub struct MatrixAttentionConfig {
    /// Width of each molecule hidden state.
    pub hidden_size: usize,
    #[config(default = 1)]
    pub gene_feature_count: usize,
}

#[derive(Module, Debug)]
pub struct MatrixAttention<B: Backend> {
    /// Lifts gene features into the molecule space: [features, hidden_size]
    w: Param<Tensor<B, 2>>,
    hidden_size: usize,
    feature_count: usize,
}

/// Result of [`MatrixAttention::forward`].
#[derive(Debug, Clone)]
pub struct MatrixAttentionOutput<B: Backend> {
    /// [batch, hidden_size + features] — filtered molecule ‖ filtered genes.
    pub joint: Tensor<B, 2>,
    /// [batch, seq_len]
    pub molecule_alphas: Tensor<B, 2>,
    /// [batch, num_genes]
    pub gene_alphas: Tensor<B, 2>,
    /// [batch, num_genes, seq_len] — tanh scores before any softmax.
    pub scores: Tensor<B, 3>,
}

impl MatrixAttentionConfig {
    /// Initialize a score-matrix attention layer.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MatrixAttention<B> {
        MatrixAttention {
            w: Initializer::Normal { mean: 0.0, std: 0.1 }
                .init([self.gene_feature_count, self.hidden_size], device),
            hidden_size: self.hidden_size,
            feature_count: self.gene_feature_count,
        }
    }
}

impl<B: Backend> MatrixAttention<B> {
    /// - `genes`: [batch, num_genes] or [batch, num_genes, features]
    /// - `molecule`: [batch, seq_len, hidden_size]
    pub fn forward(
        &self,
        genes: &GeneInput<B>,
        molecule: Tensor<B, 3>,
    ) -> Result<MatrixAttentionOutput<B>> {
        let genes = genes.to_matrix();
        let [batch, num_genes, features] = genes.dims();
        let [mol_batch, seq_len, hidden] = molecule.dims();
        expect_dims("genes", [batch, num_genes, features], [batch, num_genes, self.feature_count])?;
        expect_dims(
            "molecule hidden states",
            [mol_batch, seq_len, hidden],
            [batch, seq_len, self.hidden_size],
        )?;

        // [batch, genes, F] · [F, H] → [batch, genes, H]
        let w = self
            .w
            .val()
            .unsqueeze_dim::<3>(0)
            .expand([batch, features, hidden]);
        let lifted = genes.clone().matmul(w);

        // [batch, genes, H] · [batch, H, seq] → [batch, genes, seq]
        let scores = lifted.matmul(molecule.clone().swap_dims(1, 2)).tanh();

        let molecule_alphas = softmax(scores.clone().sum_dim(1).squeeze_dim::<2>(1), 1);
        let gene_alphas = softmax(scores.clone().sum_dim(2).squeeze_dim::<2>(2), 1);

        let filtered_molecule = weighted_sum(molecule, molecule_alphas.clone());
        let filtered_genes = weighted_sum(genes, gene_alphas.clone());

        Ok(MatrixAttentionOutput {
            joint: Tensor::cat(vec![filtered_molecule, filtered_genes], 1),
            molecule_alphas,
            gene_alphas,
            scores,
        })
    }
}
