pub mod boleto;
pub mod crypto;
pub mod fees;
pub mod instructions;
pub mod pix;
pub mod qr;
pub mod rates;

pub use fees::{FeeBreakdown, FeeEngine};
pub use instructions::InstructionGenerator;
pub use rates::{RateSource, RateTable, StaticRateSource};
