//! Pattern Engine: seeded procedural text generation.
//!
//! Interprets a compact pattern language of weighted word lookups,
//! alternative selectors, bounded repetition, flags, macro substitution and
//! multi-stream output. The same seed always reproduces the same text.
//!
//! ```no_run
//! use pattern_engine::core::engine::PatternEngine;
//! use pattern_engine::core::rng::Rng;
//!
//! let mut engine = PatternEngine::builder()
//!     .word_banks_dir("content/words")
//!     .definitions("content/definitions.ron")
//!     .build()
//!     .unwrap();
//! let output = engine.interpret(&mut Rng::new(42), "~a +n[] {appeared/arrived}.").unwrap();
//! println!("{}", output.main());
//! ```

pub mod core;
pub mod schema;
