pub mod cursor;
pub mod diagnostic;
pub mod engine;
pub mod expand;
pub mod interpreter;
pub mod output;
pub mod repeater;
pub mod rng;
pub mod wordbank;
pub mod wordcall;
