//! Model components, leaves first: shared attention ops, molecule
//! encoder and recurrent expander, the two gene attention layers, the
//! fusion head, and the composite model that wires them together.

pub mod composite;
pub mod contextual;
pub mod encoder;
pub mod expander;
pub mod gene_attention;
pub mod head;
pub mod matrix_attention;
pub mod ops;

pub use composite::{Ic50Mca, Ic50McaConfig, Ic50Output, DEFAULT_NUM_GENES};
pub use encoder::{draw_epsilon, reparameterize, ConvStackConfig, MoleculeEncoding};
pub use gene_attention::GeneInput;
