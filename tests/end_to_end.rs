use burn::backend::NdArray;
use burn::prelude::*;

use ic50_mca::batch::{GeneRows, PredictionBatch};
use ic50_mca::model::{ConvStackConfig, GeneInput, Ic50McaConfig};
use ic50_mca::{ensure_finite, ModelError};

type B = NdArray;

/// vocab 50, max_len 20, latent 16, hidden 64, 8 genes.
fn scenario_config() -> Ic50McaConfig {
    Ic50McaConfig::new(50, 20)
        .with_embedding_dim(16)
        .with_latent_dim(16)
        .with_hidden_dim(64)
        .with_num_genes(8)
        .with_attention_size(32)
        .with_head_widths(vec![64, 32, 16])
        .with_conv(ConvStackConfig::new().with_base_width(4).with_base_depth(8))
}

fn assert_rows_sum_to_one(t: Tensor<B, 2>, what: &str) {
    let [rows, width] = t.dims();
    let values = t.into_data().to_vec::<f32>().unwrap();
    for r in 0..rows {
        let row = &values[r * width..(r + 1) * width];
        assert!(row.iter().all(|a| *a >= 0.0), "{} row {} has negatives", what, r);
        let sum: f32 = row.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "{} row {} sums to {}", what, r, sum);
    }
}

#[test]
fn zero_inputs_give_finite_scalar_and_normalized_gene_alphas() {
    let device = Default::default();
    let model = scenario_config().init::<B>(&device).unwrap();

    let tokens = Tensor::<B, 2, Int>::zeros([1, 20], &device);
    let genes = GeneInput::Vector(Tensor::<B, 2>::zeros([1, 8], &device));
    let out = model.forward(tokens, &genes).unwrap();

    assert_eq!(out.prediction.dims(), [1]);
    ensure_finite(&out.prediction, "prediction").unwrap();

    assert_eq!(out.gene_alphas.dims(), [1, 8]);
    assert_rows_sum_to_one(out.gene_alphas, "gene alphas");
    assert_rows_sum_to_one(out.context_alphas, "context alphas");
}

#[test]
fn one_scalar_per_pair_across_configurations() {
    let device = Default::default();
    let mut longer = scenario_config().with_latent_dim(2);
    longer.max_len = 40;
    let configs = [
        scenario_config(),
        scenario_config().with_num_genes(3).with_hidden_dim(5),
        longer,
        scenario_config().with_gene_feature_count(4).with_attention_size(1),
    ];

    for config in configs {
        let model = config.init::<B>(&device).unwrap();
        let batch = 3;
        let tokens = Tensor::<B, 2, Int>::ones([batch, config.max_len], &device);
        let genes = if config.gene_feature_count == 1 {
            GeneInput::Vector(Tensor::<B, 2>::ones([batch, config.num_genes], &device))
        } else {
            GeneInput::Matrix(Tensor::<B, 3>::ones(
                [batch, config.num_genes, config.gene_feature_count],
                &device,
            ))
        };

        let out = model.forward(tokens, &genes).unwrap();
        assert_eq!(out.prediction.dims(), [batch]);
        assert_eq!(out.context_alphas.dims(), [batch, config.max_len - 1]);
        assert_rows_sum_to_one(out.context_alphas, "context alphas");
        assert_rows_sum_to_one(out.gene_alphas, "gene alphas");
    }
}

#[test]
fn inference_is_repeatable() {
    let device = Default::default();
    let model = scenario_config()
        .with_dropout_rate(0.5)
        .with_recurrent_dropout(0.5)
        .init::<B>(&device)
        .unwrap();

    let batch = PredictionBatch {
        tokens: vec![vec![12, 4, 4, 31, 7, 2], vec![1, 1, 49]],
        genes: GeneRows::Vector(vec![
            vec![0.2, -0.4, 1.3, 0.0, 0.8, -2.1, 0.5, 0.9],
            vec![1.0; 8],
        ]),
    };
    let config = scenario_config();
    let (tokens, genes) = batch.to_tensors::<B>(&config, &device).unwrap();

    let a = model.forward(tokens.clone(), &genes).unwrap();
    let b = model.forward(tokens, &genes).unwrap();
    assert_eq!(
        a.prediction.into_data().to_vec::<f32>().unwrap(),
        b.prediction.into_data().to_vec::<f32>().unwrap()
    );
}

#[test]
fn panel_mismatch_aborts_the_pass() {
    let device = Default::default();
    let config = scenario_config();
    let model = config.init::<B>(&device).unwrap();

    let batch = PredictionBatch {
        tokens: vec![vec![3, 4]],
        genes: GeneRows::Vector(vec![vec![0.0; 9]]),
    };
    // the batch builder refuses a 9-gene row for an 8-gene panel
    assert!(matches!(
        batch.to_tensors::<B>(&config, &device),
        Err(ModelError::RaggedBatch { expected: 8, actual: 9, .. })
    ));

    // and so does the model when handed tensors directly
    let tokens = Tensor::<B, 2, Int>::zeros([1, 20], &device);
    let genes = GeneInput::Vector(Tensor::<B, 2>::zeros([1, 9], &device));
    assert!(matches!(
        model.forward(tokens, &genes),
        Err(ModelError::ShapeMismatch { what: "genes", .. })
    ));
}

#[test]
fn token_outside_vocabulary_aborts_the_pass() {
    let device = Default::default();
    let model = scenario_config().init::<B>(&device).unwrap();

    let mut ids = [0i32; 20];
    ids[0] = 50;
    let tokens = Tensor::<B, 2, Int>::from_ints([ids], &device);
    let genes = GeneInput::Vector(Tensor::<B, 2>::zeros([1, 8], &device));
    assert!(matches!(
        model.forward(tokens, &genes),
        Err(ModelError::TokenOutOfVocabulary { token: 50, vocab_size: 50 })
    ));
}

#[test]
fn json_batch_drives_the_model() {
    let device = Default::default();
    let config = scenario_config().with_num_genes(3).with_gene_feature_count(2);
    let model = config.init::<B>(&device).unwrap();

    let batch: PredictionBatch = serde_json::from_str(
        r#"{
            "tokens": [[5, 6, 7], [8]],
            "genes": [
                [[0.1, 1.0], [0.2, 0.0], [0.3, 1.0]],
                [[1.1, 0.0], [1.2, 1.0], [1.3, 0.0]]
            ]
        }"#,
    )
    .unwrap();

    let (tokens, genes) = batch.to_tensors::<B>(&config, &device).unwrap();
    let out = model.forward(tokens, &genes).unwrap();
    assert_eq!(out.prediction.dims(), [2]);
    assert_eq!(out.gene_alphas.dims(), [2, 3]);
}
