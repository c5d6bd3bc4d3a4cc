pub mod numbers;
pub mod parse;
pub mod register_elections;
pub mod text;
