//! Recurrent expansion of the molecule vector into a hidden-state sequence.
//!
//! The dense molecule representation is repeated once per decoded
//! timestep (`max_len - 1`) and run through an LSTM that returns every
//! step. The contextual attention layer attends over that sequence.

use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Lstm, LstmConfig};
use burn::prelude::*;

use super::ops::expect_dims;
use crate::error::Result;

/// Configuration for the recurrent sequence expander.
#[derive(Config, Debug)]
pub struct SequenceExpanderConfig {
    /// Width of the repeated input vector (4 × latent_dim).
    pub d_input: usize,
    /// LSTM hidden width.
    pub hidden_dim: usize,
    /// Number of timesteps produced.
    pub steps: usize,
    /// Dropout on the emitted hidden states.
    #[config(default = 0.2)]
    pub recurrent_dropout: f64,
}

#[derive(Module, Debug)]
pub struct SequenceExpander<B: Backend> {
    lstm: Lstm<B>,
    dropout: Dropout,
    d_input: usize,
    steps: usize,
}

impl SequenceExpanderConfig {
    /// Initialize the expander LSTM.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SequenceExpander<B> {
        SequenceExpander {
            lstm: LstmConfig::new(self.d_input, self.hidden_dim, true).init(device),
            dropout: DropoutConfig::new(self.recurrent_dropout).init(),
            d_input: self.d_input,
            steps: self.steps,
        }
    }
}

impl<B: Backend> SequenceExpander<B> {
    /// - `latent`: [batch, d_input]
    ///
    /// Returns: [batch, steps, hidden_dim]
    pub fn forward(&self, latent: Tensor<B, 2>) -> Result<Tensor<B, 3>> {
        let [batch, width] = latent.dims();
        expect_dims("molecule latent", [batch, width], [batch, self.d_input])?;

        let repeated = latent
            .unsqueeze_dim::<3>(1)
            .expand([batch, self.steps, self.d_input]);
        let (hidden, _state) = self.lstm.forward(repeated, None);
        Ok(self.dropout.forward(hidden))
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}
