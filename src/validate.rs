//! Whitelist validation for the facade's stringly-typed options.
//!
//! Every option that takes one of a small set of string values is checked
//! against a rule table before any filesystem or network work happens, so
//! a typo fails fast with the accepted alternatives spelled out.

use crate::error::FixtureError;

#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub valid_values: &'static [&'static str],
}

/// Default rules shared by the facade operations. Operations with a
/// different value set for the same option name pass an override table.
const RULES: &[Rule] = &[
    Rule {
        name: "style",
        valid_values: &["rel_path", "url"],
    },
    Rule {
        name: "read_mode",
        valid_values: &["r", "rb"],
    },
    Rule {
        name: "return_paths",
        valid_values: &["all", "input", "new"],
    },
];

fn format_alternatives(values: &[&str]) -> String {
    match values {
        [] => String::new(),
        [only] => format!("'{only}'"),
        [rest @ .., last] => {
            let head = rest
                .iter()
                .map(|value| format!("'{value}'"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{head} or '{last}'")
        }
    }
}

fn find_rule(name: &str, overrides: &[Rule]) -> Option<Rule> {
    overrides
        .iter()
        .chain(RULES.iter())
        .find(|rule| rule.name == name)
        .copied()
}

/// Checks each `(name, value)` pair against the rule table. Names without
/// a rule are ignored unless `dev_mode` is set, in which case they are
/// logged as a likely caller bug.
pub fn check_args(
    args: &[(&'static str, &str)],
    overrides: &[Rule],
    dev_mode: bool,
) -> Result<(), FixtureError> {
    for &(name, value) in args {
        let Some(rule) = find_rule(name, overrides) else {
            if dev_mode {
                tracing::warn!("no validation rule for option '{name}'");
            }
            continue;
        };
        if !rule.valid_values.contains(&value) {
            return Err(FixtureError::InvalidArgument {
                name,
                given: value.to_string(),
                expected: format_alternatives(rule.valid_values),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_values_pass() {
        check_args(
            &[("style", "rel_path"), ("read_mode", "rb"), ("return_paths", "new")],
            &[],
            false,
        )
        .unwrap();
    }

    #[test]
    fn invalid_value_names_the_alternatives() {
        let error = check_args(&[("return_paths", "some")], &[], false).unwrap_err();
        match error {
            FixtureError::InvalidArgument { name, given, expected } => {
                assert_eq!(name, "return_paths");
                assert_eq!(given, "some");
                assert_eq!(expected, "'all', 'input' or 'new'");
            }
            other => panic!("expected InvalidArgument, got: {other:?}"),
        }
    }

    #[test]
    fn override_rule_wins_over_default() {
        let overrides = [Rule {
            name: "style",
            valid_values: &["dict", "url"],
        }];
        check_args(&[("style", "dict")], &overrides, false).unwrap();
        let error = check_args(&[("style", "rel_path")], &overrides, false).unwrap_err();
        assert!(error.to_string().contains("'dict' or 'url'"));
    }

    #[test]
    fn unknown_option_is_ignored_outside_dev_mode() {
        check_args(&[("no_such_option", "whatever")], &[], false).unwrap();
        check_args(&[("no_such_option", "whatever")], &[], true).unwrap();
    }
}
