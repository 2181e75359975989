pub mod params;
pub mod parse;
pub mod signer;

pub use params::{Filter, Params};
pub use parse::{generate, parse, parse_params};
pub use signer::{HmacSigner, Signer, SignerError, SignerType};
