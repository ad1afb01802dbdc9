pub mod definition;
pub mod pattern;
pub mod word;
