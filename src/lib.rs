//! IC50 prediction from a tokenized compound and a gene-expression profile.
//!
//! A convolutional molecule encoder and a gene-conditioned attention
//! layer are fused into a dense regression head. Attention weights over
//! the gene panel and over the molecule sequence come out alongside the
//! prediction for interpretation.
//!
//! ```ignore
//! use ic50_mca::model::{GeneInput, Ic50McaConfig};
//! let model = Ic50McaConfig::new(vocab_size, max_len).init::<B>(&device)?;
//! let out = model.forward(tokens, &GeneInput::Vector(genes))?;
//! ```

pub mod batch;
pub mod error;
pub mod model;
pub mod weights;

pub use error::{ModelError, Result};
pub use model::ops::ensure_finite;
