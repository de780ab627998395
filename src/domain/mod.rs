pub mod charge;
pub mod instructions;
pub mod invoice;
pub mod method;
pub mod refund;
pub mod webhook;

pub use charge::*;
pub use instructions::*;
pub use invoice::*;
pub use method::*;
pub use refund::*;
pub use webhook::*;
