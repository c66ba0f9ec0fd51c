//! Molecule sequence encoder.
//!
//! Tokenized SMILES → embedding → cascade of widening 1-D
//! convolutions → flatten → dense (4 × latent_dim) → mean / log-variance.
//!
//! Kernel width and channel depth both grow geometrically per layer,
//! so deeper convolutions see wider substructures with more filters.

use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear,
    LinearConfig,
};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use burn::tensor::ElementConversion;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::ops::{expect_batch, expect_dims};
use crate::error::{ModelError, Result};

// ─── Configuration ────────────────────────────────────────────────

/// Convolution cascade schedule.
///
/// Layer `k` (for `k` in `0..depth-1`) has kernel width
/// `floor(base_width · width_growth^k)` and
/// `floor(base_depth · depth_growth^k)` output channels.
#[derive(Config, Debug)]
pub struct ConvStackConfig {
    #[config(default = 16)]
    pub base_width: usize,
    #[config(default = 32)]
    pub base_depth: usize,
    #[config(default = 1.1758149644)]
    pub width_growth: f64,
    #[config(default = 1.15875438383)]
    pub depth_growth: f64,
    /// Cascade depth; the stack holds `depth - 1` convolutions.
    #[config(default = 4)]
    pub depth: usize,
}

impl ConvStackConfig {
    /// Number of convolution layers.
    pub fn num_layers(&self) -> usize {
        self.depth.saturating_sub(1)
    }

    /// Kernel width per layer.
    pub fn kernel_widths(&self) -> Vec<usize> {
        (0..self.num_layers())
            .map(|k| grow(self.base_width, self.width_growth, k))
            .collect()
    }

    /// Output channels per layer.
    pub fn channel_depths(&self) -> Vec<usize> {
        (0..self.num_layers())
            .map(|k| grow(self.base_depth, self.depth_growth, k))
            .collect()
    }

    /// Sequence length left after the cascade (valid padding, stride 1).
    ///
    /// `None` when some kernel is wider than the sequence reaching it.
    pub fn output_len(&self, max_len: usize) -> Option<usize> {
        let mut len = max_len;
        for width in self.kernel_widths() {
            if width == 0 || width > len {
                return None;
            }
            len = len - width + 1;
        }
        Some(len)
    }
}

fn grow(base: usize, factor: f64, k: usize) -> usize {
    (base as f64 * factor.powi(k as i32)).floor() as usize
}

/// Molecule encoder configuration.
#[derive(Config, Debug)]
pub struct MoleculeEncoderConfig {
    /// Token vocabulary size; id 0 is padding.
    pub vocab_size: usize,
    /// Padded token sequence length.
    pub max_len: usize,
    #[config(default = 128)]
    pub embedding_dim: usize,
    #[config(default = 64)]
    pub latent_dim: usize,
    #[config(default = 0.2)]
    pub dropout: f64,
    /// Standard deviation of the reparameterization noise.
    #[config(default = 1.0)]
    pub epsilon_std: f64,
    #[config(default = "ConvStackConfig::new()")]
    pub conv: ConvStackConfig,
}

// ─── Encoder ──────────────────────────────────────────────────────

/// Output of one encoder pass.
#[derive(Debug, Clone)]
pub struct MoleculeEncoding<B: Backend> {
    /// [batch, 4 * latent_dim] — dense representation fed downstream.
    pub latent: Tensor<B, 2>,
    /// [batch, latent_dim]
    pub mean: Tensor<B, 2>,
    /// [batch, latent_dim]
    pub log_var: Tensor<B, 2>,
}

#[derive(Module, Debug)]
pub struct MoleculeEncoder<B: Backend> {
    embed: Embedding<B>,
    convs: Vec<Conv1d<B>>,
    /// Normalizes the first convolution's output.
    norm_first: BatchNorm<B>,
    /// Normalizes the last convolution's output.
    norm_last: BatchNorm<B>,
    dense: Linear<B>,
    dropout: Dropout,
    norm_dense: BatchNorm<B>,
    mean: Linear<B>,
    log_var: Linear<B>,
    vocab_size: usize,
    max_len: usize,
    latent_dim: usize,
    epsilon_std: f64,
}

impl MoleculeEncoderConfig {
    /// Width of the dense projection (and of [`MoleculeEncoding::latent`]).
    pub fn dense_width(&self) -> usize {
        4 * self.latent_dim
    }

    /// Check the cascade fits the padded sequence.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size < 2 {
            return Err(ModelError::InvalidConfig(format!(
                "vocab_size must leave room for padding id 0, got {}",
                self.vocab_size
            )));
        }
        if self.embedding_dim == 0 || self.latent_dim == 0 {
            return Err(ModelError::InvalidConfig(
                "embedding_dim and latent_dim must be non-zero".into(),
            ));
        }
        if self.conv.num_layers() == 0 {
            return Err(ModelError::InvalidConfig(format!(
                "conv depth {} leaves no convolution layers",
                self.conv.depth
            )));
        }
        if self.conv.channel_depths().contains(&0) {
            return Err(ModelError::InvalidConfig(format!(
                "conv channel depths {:?} contain zero",
                self.conv.channel_depths()
            )));
        }
        if self.conv.output_len(self.max_len).is_none() {
            return Err(ModelError::InvalidConfig(format!(
                "conv kernels {:?} do not fit max_len {}",
                self.conv.kernel_widths(),
                self.max_len
            )));
        }
        if !(self.epsilon_std.is_finite() && self.epsilon_std > 0.0) {
            return Err(ModelError::InvalidConfig(format!(
                "epsilon_std must be positive, got {}",
                self.epsilon_std
            )));
        }
        Ok(())
    }

    /// Initialize a molecule encoder.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<MoleculeEncoder<B>> {
        self.validate()?;

        let widths = self.conv.kernel_widths();
        let depths = self.conv.channel_depths();

        let mut convs = Vec::with_capacity(widths.len());
        let mut channels_in = self.embedding_dim;
        for (&width, &depth) in widths.iter().zip(depths.iter()) {
            convs.push(Conv1dConfig::new(channels_in, depth, width).init(device));
            channels_in = depth;
        }

        // validate() guarantees both
        let out_len = self.conv.output_len(self.max_len).unwrap_or(1);
        let first_depth = depths.first().copied().unwrap_or(channels_in);
        let flat_width = channels_in * out_len;

        tracing::debug!(
            kernels = ?widths,
            channels = ?depths,
            out_len,
            flat_width,
            "molecule encoder conv schedule"
        );

        Ok(MoleculeEncoder {
            embed: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            convs,
            norm_first: BatchNormConfig::new(first_depth).init(device),
            norm_last: BatchNormConfig::new(channels_in).init(device),
            dense: LinearConfig::new(flat_width, self.dense_width()).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            norm_dense: BatchNormConfig::new(self.dense_width()).init(device),
            mean: LinearConfig::new(self.dense_width(), self.latent_dim).init(device),
            log_var: LinearConfig::new(self.dense_width(), self.latent_dim).init(device),
            vocab_size: self.vocab_size,
            max_len: self.max_len,
            latent_dim: self.latent_dim,
            epsilon_std: self.epsilon_std,
        })
    }
}

impl<B: Backend> MoleculeEncoder<B> {
    /// Encode a batch of padded token sequences.
    ///
    /// - `tokens`: [batch, max_len] — ids in `0..vocab_size`, 0 = padding
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Result<MoleculeEncoding<B>> {
        let [batch, len] = tokens.dims();
        expect_batch("tokens", batch)?;
        expect_dims("tokens", [batch, len], [batch, self.max_len])?;
        self.check_vocabulary(&tokens)?;

        // [batch, len, embed] → [batch, embed, len] for Conv1d
        let mut x = self.masked_embedding(tokens).swap_dims(1, 2);

        let last = self.convs.len() - 1;
        for (i, conv) in self.convs.iter().enumerate() {
            x = tanh(conv.forward(x));
            if i == 0 {
                x = self.norm_first.forward(x);
            }
            if i == last {
                x = self.norm_last.forward(x);
            }
        }

        let [_, channels, out_len] = x.dims();
        let flat = x.reshape([batch, channels * out_len]);

        let h = self.dropout.forward(self.dense.forward(flat));
        // BatchNorm wants a channel axis at dim 1 plus a spatial axis
        let latent: Tensor<B, 2> = self
            .norm_dense
            .forward(h.unsqueeze_dim::<3>(2))
            .squeeze_dim::<2>(2);

        Ok(MoleculeEncoding {
            mean: self.mean.forward(latent.clone()),
            log_var: self.log_var.forward(latent.clone()),
            latent,
        })
    }

    /// Reject ids the embedding table has no row for.
    fn check_vocabulary(&self, tokens: &Tensor<B, 2, Int>) -> Result<()> {
        let lowest = tokens.clone().min().into_scalar().elem::<i64>();
        let highest = tokens.clone().max().into_scalar().elem::<i64>();
        let token = if lowest < 0 { lowest } else { highest };
        if token < 0 || token >= self.vocab_size as i64 {
            return Err(ModelError::TokenOutOfVocabulary {
                token,
                vocab_size: self.vocab_size,
            });
        }
        Ok(())
    }

    /// Embed tokens and zero the rows of padding positions.
    fn masked_embedding(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let embedded = self.embed.forward(tokens.clone());
        let [batch, len, dim] = embedded.dims();
        let keep = tokens
            .not_equal_elem(0)
            .float()
            .unsqueeze_dim::<3>(2)
            .expand([batch, len, dim]);
        embedded * keep
    }

    /// Draw a latent sample `mean + exp(log_var / 2) · ε`, ε ~ N(0, epsilon_std²).
    pub fn sample<R: Rng + ?Sized>(
        &self,
        encoding: &MoleculeEncoding<B>,
        rng: &mut R,
    ) -> Result<Tensor<B, 2>> {
        let dims = encoding.mean.dims();
        expect_dims("latent mean", dims, [dims[0], self.latent_dim])?;
        let epsilon = draw_epsilon(rng, dims, self.epsilon_std, &encoding.mean.device())?;
        Ok(reparameterize(
            encoding.mean.clone(),
            encoding.log_var.clone(),
            epsilon,
        ))
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}

/// Reparameterization trick with caller-supplied noise.
pub fn reparameterize<B: Backend>(
    mean: Tensor<B, 2>,
    log_var: Tensor<B, 2>,
    epsilon: Tensor<B, 2>,
) -> Tensor<B, 2> {
    mean + log_var.div_scalar(2.0).exp() * epsilon
}

/// Gaussian noise of the given shape drawn from `rng`.
pub fn draw_epsilon<B: Backend, R: Rng + ?Sized>(
    rng: &mut R,
    shape: [usize; 2],
    std: f64,
    device: &B::Device,
) -> Result<Tensor<B, 2>> {
    let normal = Normal::new(0.0f32, std as f32).map_err(|e| ModelError::Sampling(e.to_string()))?;
    let values: Vec<f32> = (0..shape[0] * shape[1]).map(|_| normal.sample(rng)).collect();
    Ok(Tensor::from_data(TensorData::new(values, shape), device))
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type B = NdArray;

    fn values(t: Tensor<B, 2>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    fn small_config() -> MoleculeEncoderConfig {
        MoleculeEncoderConfig::new(50, 20)
            .with_embedding_dim(8)
            .with_latent_dim(4)
            .with_conv(
                ConvStackConfig::new()
                    .with_base_width(3)
                    .with_base_depth(6),
            )
    }

    #[test]
    fn default_schedule_grows() {
        let conv = ConvStackConfig::new();
        assert_eq!(conv.kernel_widths(), vec![16, 18, 22]);
        assert_eq!(conv.channel_depths(), vec![32, 37, 42]);
        assert_eq!(conv.output_len(120), Some(120 - 15 - 17 - 21));
    }

    #[test]
    fn oversized_kernels_rejected_at_construction() {
        // default kernels 16 + 18 cannot fit 20 positions
        let config = MoleculeEncoderConfig::new(50, 20);
        let device = Default::default();
        match config.init::<B>(&device) {
            Err(ModelError::InvalidConfig(msg)) => assert!(msg.contains("max_len 20"), "{}", msg),
            other => panic!("expected InvalidConfig, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn encoder_forward_shape() {
        let device = Default::default();
        let encoder = small_config().init::<B>(&device).unwrap();

        let tokens = Tensor::<B, 2, Int>::from_ints([[1; 20], [2; 20], [0; 20]], &device);
        let enc = encoder.forward(tokens).unwrap();

        assert_eq!(enc.latent.dims(), [3, 16]);
        assert_eq!(enc.mean.dims(), [3, 4]);
        assert_eq!(enc.log_var.dims(), [3, 4]);
    }

    #[test]
    fn wrong_sequence_length_is_an_error() {
        let device = Default::default();
        let encoder = small_config().init::<B>(&device).unwrap();

        let tokens = Tensor::<B, 2, Int>::zeros([1, 19], &device);
        assert!(matches!(
            encoder.forward(tokens),
            Err(ModelError::ShapeMismatch { what: "tokens", .. })
        ));
    }

    #[test]
    fn token_ids_outside_vocabulary_are_errors() {
        let device = Default::default();
        let encoder = small_config().init::<B>(&device).unwrap();

        let mut ids = [1i32; 20];
        ids[3] = 50;
        let high = Tensor::<B, 2, Int>::from_ints([ids], &device);
        assert!(matches!(
            encoder.forward(high),
            Err(ModelError::TokenOutOfVocabulary { token: 50, vocab_size: 50 })
        ));

        ids[3] = 49;
        ids[7] = -1;
        let low = Tensor::<B, 2, Int>::from_ints([ids], &device);
        assert!(matches!(
            encoder.forward(low),
            Err(ModelError::TokenOutOfVocabulary { token: -1, .. })
        ));
    }

    #[test]
    fn empty_batch_is_an_error() {
        let device = Default::default();
        let encoder = small_config().init::<B>(&device).unwrap();
        let tokens = Tensor::<B, 2, Int>::zeros([0, 20], &device);
        assert!(matches!(
            encoder.forward(tokens),
            Err(ModelError::ShapeMismatch { what: "tokens", .. })
        ));
    }

    #[test]
    fn inference_is_deterministic() {
        let device = Default::default();
        let encoder = small_config().with_dropout(0.5).init::<B>(&device).unwrap();

        let ids: [i32; 20] = [5, 9, 3, 7, 1, 4, 4, 8, 2, 6, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let tokens = Tensor::<B, 2, Int>::from_ints([ids], &device);
        let a = encoder.forward(tokens.clone()).unwrap();
        let b = encoder.forward(tokens).unwrap();

        assert_eq!(values(a.latent), values(b.latent));
        assert_eq!(values(a.mean), values(b.mean));
        assert_eq!(values(a.log_var), values(b.log_var));
    }

    #[test]
    fn padding_rows_are_zeroed() {
        let device = Default::default();
        let encoder = small_config().init::<B>(&device).unwrap();

        let tokens = Tensor::<B, 2, Int>::from_ints([[3, 0]], &device);
        let emb = encoder.masked_embedding(tokens);
        let pad_row = emb.clone().slice([0..1, 1..2, 0..8]).abs().sum();
        let tok_row = emb.slice([0..1, 0..1, 0..8]).abs().sum();

        assert_eq!(pad_row.into_scalar(), 0.0);
        assert!(tok_row.into_scalar() > 0.0);
    }

    #[test]
    fn reparameterize_uses_injected_noise() {
        let device = Default::default();
        let mean = Tensor::<B, 2>::from_floats([[1.0, -1.0]], &device);
        let log_var = Tensor::<B, 2>::from_floats([[0.0, 2.0f32.ln() * 2.0]], &device);
        let eps = Tensor::<B, 2>::from_floats([[0.5, 1.0]], &device);

        let z = reparameterize(mean, log_var, eps).into_data();
        let z = z.as_slice::<f32>().unwrap();
        assert!((z[0] - 1.5).abs() < 1e-6);
        assert!((z[1] - 1.0).abs() < 1e-5); // -1 + 2 * 1
    }

    #[test]
    fn seeded_samples_repeat() {
        let device = Default::default();
        let encoder = small_config().init::<B>(&device).unwrap();
        let tokens = Tensor::<B, 2, Int>::from_ints([[4; 20]], &device);
        let enc = encoder.forward(tokens).unwrap();

        let a = encoder.sample(&enc, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = encoder.sample(&enc, &mut StdRng::seed_from_u64(7)).unwrap();
        let c = encoder.sample(&enc, &mut StdRng::seed_from_u64(8)).unwrap();

        assert_eq!(a.dims(), [1, 4]);
        assert_eq!(values(a.clone()), values(b));
        assert_ne!(values(a), values(c));
    }
}
