use super::*;

#[test]
fn test_no_directive_keeps_prompt() {
    let (n, prompt) = parse_image_count("  a red fox  ", 1, 1..=4);
    assert_eq!(n, 1);
    assert_eq!(prompt, "a red fox");
}

#[test]
fn test_directive_in_middle_is_removed() {
    let (n, prompt) = parse_image_count("a red fox n=3 in snow", 1, 1..=4);
    assert_eq!(n, 3);
    assert_eq!(prompt, "a red fox in snow");
}

#[test]
fn test_directive_at_edges() {
    assert_eq!(parse_image_count("n=2 sunset", 1, 1..=4), (2, "sunset".to_string()));
    assert_eq!(parse_image_count("sunset n=4", 1, 1..=4), (4, "sunset".to_string()));
}

#[test]
fn test_out_of_range_falls_back_to_default() {
    let (n, prompt) = parse_image_count("castle n=9", 1, 1..=4);
    assert_eq!(n, 1);
    assert_eq!(prompt, "castle");

    let (n, _) = parse_image_count("castle n=0", 1, 1..=4);
    assert_eq!(n, 1);
}

#[test]
fn test_overflowing_count_falls_back() {
    let (n, prompt) = parse_image_count("castle n=99999999999999999999", 1, 1..=4);
    assert_eq!(n, 1);
    assert_eq!(prompt, "castle");
}

#[test]
fn test_non_standalone_tokens_are_ignored() {
    let (n, prompt) = parse_image_count("abc_n=3 n = 2", 1, 1..=4);
    assert_eq!(n, 1);
    assert_eq!(prompt, "abc_n=3 n = 2");
}

#[test]
fn test_directive_only_normalizes_to_empty() {
    assert_eq!(normalize_image_prompt("n=2"), "");
    assert_eq!(normalize_image_prompt("   "), "");
}

#[test]
fn test_inner_whitespace_collapsed() {
    assert_eq!(normalize_image_prompt("a   cat\n\n n=2  dog"), "a cat dog");
}
