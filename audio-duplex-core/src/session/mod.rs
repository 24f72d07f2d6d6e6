pub mod duplex;
pub mod fault;
