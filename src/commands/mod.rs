pub mod quote;
pub mod rank;
pub mod rps;
pub mod serve;
