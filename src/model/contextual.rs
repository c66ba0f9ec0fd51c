//! Gene-conditioned contextual attention over the molecule sequence.
//!
//! Additive (Bahdanau-style) attention in which the query is the gene
//! profile: for every position t of the molecule hidden-state sequence
//!
//!   e_t = vᵀ · tanh(W_g · collapse(genes) + b_g + W_s · s_t + b_s)
//!   α   = softmax_t(e)
//!
//! The context vector is Σ_t α_t · s_t. The alphas say which parts of the
//! compound encoding matter for this expression profile.

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;

use super::gene_attention::GeneInput;
use super::ops::{expect_dims, project_last, weight_sequence, weighted_sum};
use crate::error::Result;

/// Standard deviation of the hand-rolled parameter initialization.
const INIT_STD: f64 = 0.1;

/// Configuration for the gene-conditioned contextual attention layer.
#[derive(Config, Debug)]
pub struct ContextualAttentionConfig {
    /// Gene panel size.
    pub num_genes: usize,
    /// Width of each molecule hidden state.
    pub hidden_size: usize,
    /// Number of attention units.
    #[config(default = 256)]
    pub attention_size: usize,
    /// Features per gene.
    #[config(default = 1)]
    pub gene_feature_count: usize,
}

#[derive(Module, Debug)]
pub struct ContextualAttention<B: Backend> {
    /// Mixes the per-gene features: [gene_feature_count]
    w_gene_features: Param<Tensor<B, 1>>,
    /// [num_genes, attention_size]
    w_genes: Param<Tensor<B, 2>>,
    /// [attention_size]
    b_genes: Param<Tensor<B, 1>>,
    /// Per-position molecule projection: hidden_size → attention_size.
    molecule_proj: Linear<B>,
    /// Energy reduction vector: [attention_size]
    v: Param<Tensor<B, 1>>,
    num_genes: usize,
    feature_count: usize,
    hidden_size: usize,
}

/// Result of [`ContextualAttention::forward`].
#[derive(Debug, Clone)]
pub struct ContextOutput<B: Backend> {
    /// [batch, hidden_size]
    pub context: Tensor<B, 2>,
    /// [batch, seq_len] — sums to 1 per row.
    pub alphas: Tensor<B, 2>,
}

impl ContextualAttentionConfig {
    /// Initialize a contextual attention layer; raw parameters are drawn from N(0, 0.1²).
    pub fn init<B: Backend>(&self, device: &B::Device) -> ContextualAttention<B> {
        let normal = Initializer::Normal {
            mean: 0.0,
            std: INIT_STD,
        };

        ContextualAttention {
            w_gene_features: normal.init([self.gene_feature_count], device),
            w_genes: normal.init([self.num_genes, self.attention_size], device),
            b_genes: normal.init([self.attention_size], device),
            molecule_proj: LinearConfig::new(self.hidden_size, self.attention_size).init(device),
            v: normal.init([self.attention_size], device),
            num_genes: self.num_genes,
            feature_count: self.gene_feature_count,
            hidden_size: self.hidden_size,
        }
    }
}

impl<B: Backend> ContextualAttention<B> {
    /// Attend over `molecule` conditioned on `genes` and reduce the sequence.
    ///
    /// - `genes`: [batch, num_genes] or [batch, num_genes, features]
    /// - `molecule`: [batch, seq_len, hidden_size]
    pub fn forward(&self, genes: &GeneInput<B>, molecule: Tensor<B, 3>) -> Result<ContextOutput<B>> {
        let alphas = self.alphas(genes, molecule.clone())?;
        Ok(ContextOutput {
            context: weighted_sum(molecule, alphas.clone()),
            alphas,
        })
    }

    /// Like [`forward`](Self::forward) but keeps every position:
    /// returns the weighted sequence [batch, seq_len, hidden_size] and alphas.
    pub fn forward_sequence(
        &self,
        genes: &GeneInput<B>,
        molecule: Tensor<B, 3>,
    ) -> Result<(Tensor<B, 3>, Tensor<B, 2>)> {
        let alphas = self.alphas(genes, molecule.clone())?;
        Ok((weight_sequence(molecule, alphas.clone()), alphas))
    }

    /// Per-position attention weights: [batch, seq_len].
    pub fn alphas(&self, genes: &GeneInput<B>, molecule: Tensor<B, 3>) -> Result<Tensor<B, 2>> {
        let [batch, seq_len, hidden] = molecule.dims();
        genes.check(self.num_genes, self.feature_count)?;
        expect_dims(
            "molecule hidden states",
            [batch, seq_len, hidden],
            [genes.batch_size(), seq_len, self.hidden_size],
        )?;

        // [batch, num_genes, F] · [F] → [batch, num_genes]
        let genes_collapsed = project_last(genes.to_matrix(), self.w_gene_features.val());

        // [batch, num_genes] · [num_genes, A] + b → [batch, A]
        let attention_size = self.v.dims()[0];
        let gene_energy = genes_collapsed.matmul(self.w_genes.val())
            + self.b_genes.val().unsqueeze_dim::<2>(0).expand([batch, attention_size]);

        // broadcast across positions: [batch, seq_len, A]
        let gene_energy = gene_energy
            .unsqueeze_dim::<3>(1)
            .expand([batch, seq_len, attention_size]);
        let molecule_energy = self.molecule_proj.forward(molecule);

        let energy = (gene_energy + molecule_energy).tanh();
        let scores = project_last(energy, self.v.val());

        Ok(softmax(scores, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn layer(num_genes: usize, hidden: usize, features: usize) -> ContextualAttention<B> {
        ContextualAttentionConfig::new(num_genes, hidden)
            .with_attention_size(16)
            .with_gene_feature_count(features)
            .init(&Default::default())
    }

    fn molecule(batch: usize, len: usize, hidden: usize) -> Tensor<B, 3> {
        let device = Default::default();
        let values: Vec<f32> = (0..batch * len * hidden)
            .map(|i| ((i * 37 % 11) as f32 - 5.0) / 5.0)
            .collect();
        Tensor::from_data(TensorData::new(values, [batch, len, hidden]), &device)
    }

    #[test]
    fn alphas_sum_to_one_per_batch_element() {
        let device = Default::default();
        let attn = layer(8, 12, 1);

        let genes = Tensor::<B, 2>::from_floats(
            [
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                [1.0, -2.0, 0.5, 3.0, 0.0, 1.5, -0.5, 2.0],
                [9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0],
            ],
            &device,
        );
        let out = attn.forward(&GeneInput::Vector(genes), molecule(3, 7, 12)).unwrap();

        assert_eq!(out.context.dims(), [3, 12]);
        assert_eq!(out.alphas.dims(), [3, 7]);
        let sums = out.alphas.sum_dim(1).into_data().to_vec::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5, "alphas sum: {}", s);
        }
    }

    #[test]
    fn context_is_weighted_sum_of_sequence() {
        let device = Default::default();
        let attn = layer(4, 3, 1);
        let genes = GeneInput::Vector(Tensor::<B, 2>::ones([1, 4], &device));
        let seq = molecule(1, 5, 3);

        let out = attn.forward(&genes, seq.clone()).unwrap();
        let (weighted, alphas) = attn.forward_sequence(&genes, seq).unwrap();
        assert_eq!(weighted.dims(), [1, 5, 3]);

        let summed = weighted.sum_dim(1).squeeze_dim::<2>(1);
        let diff = (summed - out.context).abs().max().into_scalar();
        assert!(diff < 1e-6);

        let a = alphas.into_data().to_vec::<f32>().unwrap();
        let b = out.alphas.into_data().to_vec::<f32>().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn gene_matrix_input() {
        let device = Default::default();
        let attn = layer(6, 4, 5);
        let genes = GeneInput::Matrix(Tensor::<B, 3>::ones([2, 6, 5], &device));

        let out = attn.forward(&genes, molecule(2, 9, 4)).unwrap();
        assert_eq!(out.context.dims(), [2, 4]);
        assert_eq!(out.alphas.dims(), [2, 9]);
    }

    #[test]
    fn genes_condition_the_weights() {
        let device = Default::default();
        let attn = layer(4, 6, 1);
        let seq = molecule(1, 8, 6);

        let low = GeneInput::Vector(Tensor::<B, 2>::from_floats([[-3.0, 1.0, 0.0, 2.0]], &device));
        let high = GeneInput::Vector(Tensor::<B, 2>::from_floats([[3.0, -1.0, 4.0, -2.0]], &device));

        let a = attn.alphas(&low, seq.clone()).unwrap();
        let b = attn.alphas(&high, seq).unwrap();
        let diff = (a - b).abs().sum().into_scalar();
        assert!(diff > 0.0, "gene profile had no effect on attention");
    }

    #[test]
    fn shape_errors_abort() {
        let device = Default::default();
        let attn = layer(4, 6, 1);

        let wrong_genes = GeneInput::Vector(Tensor::<B, 2>::ones([1, 5], &device));
        assert!(attn.forward(&wrong_genes, molecule(1, 3, 6)).is_err());

        let genes = GeneInput::Vector(Tensor::<B, 2>::ones([1, 4], &device));
        assert!(attn.forward(&genes, molecule(1, 3, 7)).is_err());
        assert!(attn.forward(&genes, molecule(2, 3, 6)).is_err());
    }
}
