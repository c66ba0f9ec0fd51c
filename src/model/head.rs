//! Fusion of molecule and gene features into the IC50 regression output.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::relu;

use super::ops::expect_dims;
use crate::error::Result;

/// Configuration for the fusion and regression head.
#[derive(Config, Debug)]
pub struct FusionHeadConfig {
    /// Width of the concatenated input.
    pub d_input: usize,
    /// Dense stage widths, applied in order.
    #[config(default = "vec![2048, 1024, 512]")]
    pub widths: Vec<usize>,
    #[config(default = 0.2)]
    pub dropout: f64,
}

/// Dense+ReLU+dropout stages followed by one linear output unit.
#[derive(Module, Debug)]
pub struct FusionHead<B: Backend> {
    stages: Vec<Linear<B>>,
    dropout: Dropout,
    output: Linear<B>,
    d_input: usize,
}

impl FusionHeadConfig {
    /// Initialize the head: one dense stage per entry of `widths`, then the output unit.
    pub fn init<B: Backend>(&self, device: &B::Device) -> FusionHead<B> {
        let mut stages = Vec::with_capacity(self.widths.len());
        let mut d_in = self.d_input;
        for &width in &self.widths {
            stages.push(LinearConfig::new(d_in, width).init(device));
            d_in = width;
        }

        FusionHead {
            stages,
            dropout: DropoutConfig::new(self.dropout).init(),
            output: LinearConfig::new(d_in, 1).init(device),
            d_input: self.d_input,
        }
    }
}

impl<B: Backend> FusionHead<B> {
    /// Concatenate the feature vectors and regress one value per row.
    ///
    /// - `context`: [batch, hidden] — gene-conditioned molecule context
    /// - `latent`: [batch, 4 * latent_dim] — molecule encoding
    /// - `attended_genes`: [batch, num_genes]
    /// - `genes`: [batch, num_genes]
    ///
    /// Returns: [batch, 1]
    pub fn forward(
        &self,
        context: Tensor<B, 2>,
        latent: Tensor<B, 2>,
        attended_genes: Tensor<B, 2>,
        genes: Tensor<B, 2>,
    ) -> Result<Tensor<B, 2>> {
        let x = Tensor::cat(vec![context, latent, attended_genes, genes], 1);
        let [batch, width] = x.dims();
        expect_dims("fusion input", [batch, width], [batch, self.d_input])?;

        let mut x = x;
        for stage in &self.stages {
            x = self.dropout.forward(relu(stage.forward(x)));
        }
        Ok(self.output.forward(x))
    }
}
