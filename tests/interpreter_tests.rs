/// Interpreter integration tests: pattern constructs run through the engine
/// against the fixture word banks.

use pattern_engine::core::diagnostic::{Severity, Stage};
use pattern_engine::core::engine::{EngineError, PatternEngine};
use pattern_engine::core::rng::Rng;

fn engine() -> PatternEngine {
    PatternEngine::builder()
        .word_banks_dir("tests/fixtures/words")
        .definitions("tests/fixtures/definitions.ron")
        .build()
        .unwrap()
}

fn main_text(engine: &mut PatternEngine, pattern: &str, seed: u64) -> String {
    engine
        .interpret(&mut Rng::new(seed), pattern)
        .unwrap()
        .main()
        .to_string()
}

#[test]
fn repeater_yields_exact_count_and_separators() {
    let mut engine = engine();
    let out = main_text(&mut engine, "^[3][, ][X]", 1);
    assert_eq!(out, "X, X, X");
    assert_eq!(out.matches('X').count(), 3);
    assert_eq!(out.matches(", ").count(), 2);
}

#[test]
fn repeater_first_and_last_flags() {
    let mut engine = engine();
    let out = main_text(
        &mut engine,
        "^[3][ ][$l?[first_1][A]$l?[last_1][C]$l![first_1][$l![last_1][B]]]",
        1,
    );
    assert_eq!(out, "A B C");
}

#[test]
fn selector_with_one_option_fails() {
    let mut engine = engine();
    let err = engine.interpret(&mut Rng::new(1), "say {onlyone}").unwrap_err();
    let EngineError::Interpreter(diagnostic) = err else {
        panic!("expected an interpreter error, got {:?}", err);
    };
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.stage, Stage::Interpreter);
    assert_eq!((diagnostic.line, diagnostic.column), (1, 5));
}

#[test]
fn selector_never_emits_more_than_one_option() {
    let mut engine = engine();
    for seed in 0..100 {
        let out = main_text(&mut engine, "[{alpha/beta/gamma/delta}]", seed);
        assert!(
            ["alpha", "beta", "gamma", "delta"].contains(&out.as_str()),
            "seed {} produced {:?}",
            seed,
            out
        );
    }
}

#[test]
fn selector_covers_every_option() {
    let mut engine = engine();
    let mut seen = std::collections::HashSet::new();
    for seed in 0..200 {
        seen.insert(main_text(&mut engine, "{a/b/c}", seed));
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn indefinite_article_follows_the_word() {
    let mut engine = engine();
    for seed in 0..30 {
        let out = main_text(&mut engine, "a +n[of red]", seed);
        assert!(out == "an apple" || out == "a cherry", "got {:?}", out);
        assert_eq!(main_text(&mut engine, "a +n[of yellow,fruit]", seed), "a banana");
        assert_eq!(main_text(&mut engine, "a +n[of time]", seed), "an hour");
        assert_eq!(main_text(&mut engine, "a +n[of myth]", seed), "a unicorn");
    }
}

#[test]
fn output_group_visibility() {
    let mut engine = engine();
    let out = engine.interpret(&mut Rng::new(1), "x<foo:inside>y").unwrap();
    assert_eq!(out.main(), "xinsidey");
    assert_eq!(out.get("foo"), Some("inside"));

    let out = engine.interpret(&mut Rng::new(1), "x<.foo:inside>y").unwrap();
    assert_eq!(out.main(), "xy");
    assert_eq!(out.get("foo"), Some("inside"));
    assert_eq!(out.names(), vec!["foo", "main"]);
}

#[test]
fn internal_groups_leak_into_internal_parents_only() {
    let mut engine = engine();
    let out = engine
        .interpret(&mut Rng::new(1), "<_notes:a<_more:b>>")
        .unwrap();
    assert_eq!(out.get("notes"), Some("ab"));
    assert_eq!(out.get("more"), Some("b"));
    assert_eq!(out.main(), "");
}

#[test]
fn carriers_keep_coreference_within_a_run() {
    let mut engine = engine();
    let mut varied = false;
    for seed in 0..40 {
        let out = main_text(
            &mut engine,
            "+n[of animal for beast]/+n[of animal for beast]/+n[of animal]",
            seed,
        );
        let parts: Vec<&str> = out.split('/').collect();
        assert_eq!(parts[0], parts[1]);
        if parts[0] != parts[2] {
            varied = true;
        }
    }
    assert!(varied);
}

#[test]
fn carriers_are_keyed_by_class_and_symbol() {
    let mut engine = engine();
    for seed in 0..20 {
        let out = main_text(&mut engine, "+n[of fruit for x] +n[of bird for x]", seed);
        let (fruit, bird) = out.split_once(' ').unwrap();
        assert!(["apple", "banana", "cherry"].contains(&fruit));
        assert!(["owl", "canary"].contains(&bird));
    }
}

#[test]
fn legacy_word_calls() {
    let mut engine = engine();
    assert_eq!(main_text(&mut engine, "+[time]n[plural]", 1), "hours");
    let out = main_text(&mut engine, "+[bird]n<b> +[bird]n[plural]<b>", 9);
    let (one, many) = out.split_once(' ').unwrap();
    assert!(many.starts_with(&one[..2]), "{} vs {}", one, many);
}

#[test]
fn warnings_are_positioned_in_expanded_text() {
    let mut engine = engine();
    let out = engine
        .interpret(&mut Rng::new(1), "=[greeting]|+z[]")
        .unwrap();
    assert!(!out.main().is_empty());
    let diagnostics = engine.diagnostics();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert_eq!(diagnostics[0].stage, Stage::Interpreter);
    // `{Hello/Good day/Well met}|` is 26 chars.
    assert_eq!(diagnostics[0].column, 27);
}

#[test]
fn capitalization_applies_to_words_and_literals() {
    let mut engine = engine();
    assert_eq!(main_text(&mut engine, "~+n[of time]", 1), "Hour");
    assert_eq!(main_text(&mut engine, "@+n[plural of time]@", 1), "HOURS");
    assert_eq!(main_text(&mut engine, "~~the +n[of time] of need", 1), "The Hour Of Need");
}

#[test]
fn frequency_and_flags_combine() {
    let mut engine = engine();
    for seed in 0..20 {
        let out = main_text(&mut engine, "100%[$ls[seen]]$l?[seen][yes]$l![seen][no]", seed);
        assert_eq!(out, "yes");
    }
}

#[test]
fn fatal_errors_stop_the_run() {
    let mut engine = engine();
    for pattern in ["0%[x]", "$zz[x]", "^[0][][x]", "#[9-1]", "done}", "done>", "*{a/b}"] {
        let result = engine.interpret(&mut Rng::new(1), pattern);
        assert!(
            matches!(result, Err(EngineError::Interpreter(_))),
            "{} should fail",
            pattern
        );
        assert!(engine.diagnostics().iter().any(|d| d.is_error()));
    }
}

#[test]
fn unknown_subtype_leaves_a_visible_token() {
    let mut engine = engine();
    let out = main_text(&mut engine, "+n[dual of time]", 1);
    assert_eq!(out, "<n:SubtypeNotFound(dual)>");
    assert_eq!(engine.diagnostics().len(), 1);
}
