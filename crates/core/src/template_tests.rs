// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn expands_simple_and_dotted_names() {
    let vars = vars(&[("name", "web"), ("event.source", "build")]);
    assert_eq!(expand("proc=${name} from=${event.source}", &vars), "proc=web from=build");
}

#[test]
fn unknown_token_expands_to_empty() {
    let vars = vars(&[]);
    assert_eq!(expand("x${missing.value}y", &vars), "xy");
}

#[test]
fn literal_text_without_tokens_is_unchanged() {
    let vars = vars(&[("a", "1")]);
    assert_eq!(expand("no tokens here, not even $PLAIN", &vars), "no tokens here, not even $PLAIN");
}

#[test]
fn match_captures_expand_in_argv() {
    let vars = vars(&[("match.payload", "item-42")]);
    let argv =
        vec!["--payload".to_string(), "${match.payload}".to_string(), "end".to_string()];
    assert_eq!(expand_argv(&argv, &vars), vec!["--payload", "item-42", "end"]);
}

#[test]
fn env_values_expand_but_keys_do_not() {
    let vars = vars(&[("process.name", "api")]);
    let env = HashMap::from([("WHO_${x}".to_string(), "${process.name}".to_string())]);
    let expanded = expand_env(&env, &vars);
    assert_eq!(expanded["WHO_${x}"], "api");
}

#[test]
fn repeated_token_expands_everywhere() {
    let vars = vars(&[("n", "3")]);
    assert_eq!(expand("${n}-${n}-${n}", &vars), "3-3-3");
}

#[test]
fn hyphenated_segment_allowed_after_dot() {
    let vars = vars(&[("match.build-id", "b7")]);
    assert_eq!(expand("${match.build-id}", &vars), "b7");
}
