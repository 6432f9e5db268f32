pub mod cards;
pub mod draft;
