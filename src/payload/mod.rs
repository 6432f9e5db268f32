pub mod classify;
pub mod decision;
pub mod parse;
