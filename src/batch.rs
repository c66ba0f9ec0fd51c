//! Conversion of caller data into model input tensors.
//!
//! Token rows are right-padded with id 0 up to `max_len`; anything longer
//! is an error. Gene rows must match the panel exactly.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::model::gene_attention::GeneInput;
use crate::model::Ic50McaConfig;

/// Right-pad `ids` with the padding id 0 to `max_len`.
pub fn pad_tokens(ids: &[u32], max_len: usize) -> Result<Vec<u32>> {
    if ids.len() > max_len {
        return Err(ModelError::SequenceTooLong {
            len: ids.len(),
            max_len,
        });
    }
    let mut padded = ids.to_vec();
    padded.resize(max_len, 0);
    Ok(padded)
}

/// Build a [batch, max_len] token tensor, padding short rows.
pub fn token_tensor<B: Backend>(
    rows: &[Vec<u32>],
    vocab_size: usize,
    max_len: usize,
    device: &B::Device,
) -> Result<Tensor<B, 2, Int>> {
    let mut data = Vec::with_capacity(rows.len() * max_len);
    for row in rows {
        if let Some(&token) = row.iter().find(|&&t| t as usize >= vocab_size) {
            return Err(ModelError::TokenOutOfVocabulary {
                token: token as i64,
                vocab_size,
            });
        }
        data.extend(pad_tokens(row, max_len)?.into_iter().map(|t| t as i32));
    }
    Ok(Tensor::from_data(
        TensorData::new(data, [rows.len(), max_len]),
        device,
    ))
}

/// Gene profiles as supplied by a caller (e.g. parsed from JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneRows {
    /// One value per gene.
    Vector(Vec<Vec<f32>>),
    /// `features` values per gene.
    Matrix(Vec<Vec<Vec<f32>>>),
}

impl GeneRows {
    pub fn len(&self) -> usize {
        match self {
            GeneRows::Vector(rows) => rows.len(),
            GeneRows::Matrix(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validate against the panel and build the matching [`GeneInput`].
    pub fn to_input<B: Backend>(
        &self,
        num_genes: usize,
        feature_count: usize,
        device: &B::Device,
    ) -> Result<GeneInput<B>> {
        match self {
            GeneRows::Vector(rows) => {
                if feature_count != 1 {
                    return Err(ModelError::shape(
                        "genes",
                        format!("{} features per gene", feature_count),
                        "1 value per gene",
                    ));
                }
                let data = flatten_checked(rows, num_genes)?;
                Ok(GeneInput::Vector(Tensor::from_data(
                    TensorData::new(data, [rows.len(), num_genes]),
                    device,
                )))
            }
            GeneRows::Matrix(rows) => {
                let mut data = Vec::with_capacity(rows.len() * num_genes * feature_count);
                for (i, row) in rows.iter().enumerate() {
                    if row.len() != num_genes {
                        return Err(ModelError::RaggedBatch {
                            row: i,
                            expected: num_genes,
                            actual: row.len(),
                        });
                    }
                    data.extend(flatten_checked(row, feature_count)?);
                }
                Ok(GeneInput::Matrix(Tensor::from_data(
                    TensorData::new(data, [rows.len(), num_genes, feature_count]),
                    device,
                )))
            }
        }
    }
}

fn flatten_checked(rows: &[Vec<f32>], width: usize) -> Result<Vec<f32>> {
    let mut data = Vec::with_capacity(rows.len() * width);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(ModelError::RaggedBatch {
                row: i,
                expected: width,
                actual: row.len(),
            });
        }
        data.extend_from_slice(row);
    }
    Ok(data)
}

/// One prediction request: token rows paired with gene rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionBatch {
    pub tokens: Vec<Vec<u32>>,
    pub genes: GeneRows,
}

impl PredictionBatch {
    /// Build both input tensors for `config`.
    pub fn to_tensors<B: Backend>(
        &self,
        config: &Ic50McaConfig,
        device: &B::Device,
    ) -> Result<(Tensor<B, 2, Int>, GeneInput<B>)> {
        if self.tokens.len() != self.genes.len() {
            return Err(ModelError::shape(
                "batch",
                format!("{} gene rows", self.tokens.len()),
                format!("{} gene rows", self.genes.len()),
            ));
        }
        let tokens = token_tensor(&self.tokens, config.vocab_size, config.max_len, device)?;
        let genes = self
            .genes
            .to_input(config.num_genes, config.gene_feature_count, device)?;
        Ok((tokens, genes))
    }
}
