pub mod resolver;
pub mod risk;
pub mod sla;
