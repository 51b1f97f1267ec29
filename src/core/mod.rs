pub mod domain;
pub mod traits;
