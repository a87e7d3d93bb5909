//! Answer scoring policies.
//!
//! Every item carries a `ScoringHint` chosen by whoever generated it. When a
//! generator gives none, `ScoringHint::default_for` picks one per domain.

use serde::{Deserialize, Serialize};

use crate::curriculum::Domain;

const PROBABILITY_TOLERANCE: f64 = 0.01;
const TRADING_RELATIVE_TOLERANCE: f64 = 0.02;
const CHOICE_LETTERS: &str = "abcdefgh";

fn default_min_matches() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringHint {
    Exact {
        #[serde(default)]
        case_sensitive: bool,
    },
    Numeric {
        tolerance: f64,
        #[serde(default)]
        relative: bool,
    },
    Keywords {
        keywords: Vec<String>,
        #[serde(default = "default_min_matches")]
        min_matches: usize,
    },
    Choice,
}

impl ScoringHint {
    /// Numeric keys get a numeric tolerance (absolute for probability and ML,
    /// relative for trading figures); free text is graded by keywords when
    /// the topic has any, exact match otherwise.
    pub fn default_for(domain: Domain, answer_key: &str, keywords: &[String]) -> Self {
        if parse_number(answer_key).is_some() {
            return match domain {
                Domain::Trading => Self::Numeric {
                    tolerance: TRADING_RELATIVE_TOLERANCE,
                    relative: true,
                },
                Domain::Probability | Domain::Ml => Self::Numeric {
                    tolerance: PROBABILITY_TOLERANCE,
                    relative: false,
                },
            };
        }
        if keywords.is_empty() {
            Self::Exact {
                case_sensitive: false,
            }
        } else {
            Self::keywords_for(domain, keywords.to_vec())
        }
    }

    /// Probability answers need one key idea; ML and trading need two when
    /// the topic lists at least two.
    pub fn keywords_for(domain: Domain, keywords: Vec<String>) -> Self {
        let min_matches = match domain {
            Domain::Probability => 1,
            Domain::Ml | Domain::Trading => keywords.len().clamp(1, 2),
        };
        Self::Keywords {
            keywords,
            min_matches,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Exact { .. } => "exact answer".to_string(),
            Self::Numeric { tolerance, relative: false } => format!("number within ±{tolerance}"),
            Self::Numeric { tolerance, relative: true } => {
                format!("number within {:.0}%", tolerance * 100.0)
            }
            Self::Keywords { min_matches, .. } => format!("mention {min_matches}+ key ideas"),
            Self::Choice => "one option letter".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub correct: bool,
    pub detail: String,
}

impl Verdict {
    fn new(correct: bool, detail: impl Into<String>) -> Self {
        Self {
            correct,
            detail: detail.into(),
        }
    }
}

pub fn score_response(
    hint: &ScoringHint,
    answer_key: &str,
    choices: &[String],
    response: &str,
) -> Verdict {
    match hint {
        ScoringHint::Exact { case_sensitive } => {
            let (a, b) = if *case_sensitive {
                (normalize_case_kept(response), normalize_case_kept(answer_key))
            } else {
                (normalize(response), normalize(answer_key))
            };
            Verdict::new(!a.is_empty() && a == b, "exact match")
        }
        ScoringHint::Numeric { tolerance, relative } => {
            let (Some(expected), Some(given)) = (parse_number(answer_key), parse_number(response))
            else {
                return Verdict::new(false, "no number found");
            };
            let allowed = if *relative {
                tolerance.abs() * expected.abs().max(f64::EPSILON)
            } else {
                tolerance.abs()
            };
            let diff = (given - expected).abs();
            Verdict::new(diff <= allowed + 1e-12, format!("{given} vs {expected}"))
        }
        ScoringHint::Keywords {
            keywords,
            min_matches,
        } => {
            if keywords.is_empty() {
                return score_response(
                    &ScoringHint::Exact {
                        case_sensitive: false,
                    },
                    answer_key,
                    choices,
                    response,
                );
            }
            let text = normalize(response);
            let hits = keywords
                .iter()
                .filter(|k| {
                    let k = normalize(k);
                    !k.is_empty() && text.contains(&k)
                })
                .count();
            let needed = (*min_matches).clamp(1, keywords.len());
            Verdict::new(hits >= needed, format!("{hits}/{needed} key ideas"))
        }
        ScoringHint::Choice => {
            let expected = resolve_choice(answer_key, choices);
            let given = resolve_choice(response, choices);
            match (expected, given) {
                (Some(e), Some(g)) => Verdict::new(e == g, format!("option {}", choice_letter(g))),
                (Some(_), None) => Verdict::new(false, "no option recognised"),
                (None, _) => Verdict::new(false, "answer key is not an option"),
            }
        }
    }
}

pub fn choice_letter(index: usize) -> char {
    CHOICE_LETTERS
        .chars()
        .nth(index)
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('?')
}

/// Maps "B", "(b)", "answer: b" or the option's own text to an option index.
pub fn resolve_choice(text: &str, choices: &[String]) -> Option<usize> {
    let lowered = text.trim().to_lowercase();
    let stripped = lowered.trim_matches(|c: char| !c.is_alphanumeric());
    let letter_index = |s: &str| -> Option<usize> {
        let mut chars = s.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        let idx = CHOICE_LETTERS.find(c)?;
        (choices.is_empty() || idx < choices.len()).then_some(idx)
    };

    if let Some(idx) = letter_index(stripped) {
        return Some(idx);
    }

    let tokens: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    for pair in tokens.windows(2) {
        if matches!(pair[0], "answer" | "option" | "choice" | "is") {
            if let Some(idx) = letter_index(pair[1]) {
                return Some(idx);
            }
        }
    }

    let wanted = normalize(text);
    if wanted.is_empty() {
        return None;
    }
    let mut found = None;
    for (i, choice) in choices.iter().enumerate() {
        let option = normalize(choice);
        if option.is_empty() {
            continue;
        }
        if option == wanted {
            return Some(i);
        }
        if wanted.contains(&option) {
            if found.is_some() {
                return None;
            }
            found = Some(i);
        }
    }
    found
}

/// Parses the last number-like token: plain decimals, percentages and
/// fractions such as `1/4`.
pub fn parse_number(text: &str) -> Option<f64> {
    text.split_whitespace()
        .filter_map(|raw| {
            let token = raw
                .trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '-' || c == '.'))
                .trim_end_matches(|c: char| !(c.is_ascii_digit() || c == '%'));
            parse_token(token)
        })
        .last()
}

fn parse_token(token: &str) -> Option<f64> {
    if token.is_empty() {
        return None;
    }
    let value = if let Some(pct) = token.strip_suffix('%') {
        pct.parse::<f64>().ok()? / 100.0
    } else if let Some((num, den)) = token.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        num / den
    } else {
        token.replace(',', "").parse().ok()?
    };
    value.is_finite().then_some(value)
}

fn normalize(text: &str) -> String {
    normalize_case_kept(text).to_lowercase()
}

fn normalize_case_kept(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(&['.', '!', '?'][..])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Vec<String> {
        vec![
            "It increases".to_string(),
            "It decreases".to_string(),
            "It stays the same".to_string(),
            "It cannot be known".to_string(),
        ]
    }

    #[test]
    fn test_numeric_formats() {
        assert_eq!(parse_number("0.25"), Some(0.25));
        assert_eq!(parse_number("25%"), Some(0.25));
        assert_eq!(parse_number("1/4"), Some(0.25));
        assert_eq!(parse_number("P(A|B) = 0.5."), Some(0.5));
        assert_eq!(parse_number("I think it is -1.5"), Some(-1.5));
        assert_eq!(parse_number("no idea"), None);
        assert_eq!(parse_number("1/0"), None);
    }

    #[test]
    fn test_numeric_tolerance() {
        let hint = ScoringHint::Numeric {
            tolerance: 0.01,
            relative: false,
        };
        assert!(score_response(&hint, "0.333", &[], "1/3").correct);
        assert!(score_response(&hint, "0.333", &[], "0.34").correct);
        assert!(!score_response(&hint, "0.333", &[], "0.35").correct);
        assert!(!score_response(&hint, "0.333", &[], "a third").correct);
    }

    #[test]
    fn test_relative_tolerance() {
        let hint = ScoringHint::Numeric {
            tolerance: 0.02,
            relative: true,
        };
        assert!(score_response(&hint, "1.5", &[], "1.52").correct);
        assert!(!score_response(&hint, "1.5", &[], "1.6").correct);
    }

    #[test]
    fn test_exact_ignores_case_and_spacing() {
        let hint = ScoringHint::Exact {
            case_sensitive: false,
        };
        assert!(score_response(&hint, "Mean reversion", &[], "  mean   REVERSION. ").correct);
        assert!(!score_response(&hint, "Mean reversion", &[], "momentum").correct);
        assert!(!score_response(&hint, "x", &[], "").correct);
    }

    #[test]
    fn test_keywords() {
        let hint = ScoringHint::Keywords {
            keywords: vec!["training".into(), "generalize".into(), "noise".into()],
            min_matches: 2,
        };
        assert!(
            score_response(&hint, "", &[], "It fits noise in the training data").correct
        );
        assert!(!score_response(&hint, "", &[], "It fits noise").correct);
    }

    #[test]
    fn test_choice_by_letter_and_text() {
        let c = choices();
        assert!(score_response(&ScoringHint::Choice, "B", &c, "b").correct);
        assert!(score_response(&ScoringHint::Choice, "B", &c, "(B)").correct);
        assert!(score_response(&ScoringHint::Choice, "B", &c, "My answer is b").correct);
        assert!(score_response(&ScoringHint::Choice, "B", &c, "it decreases").correct);
        assert!(!score_response(&ScoringHint::Choice, "B", &c, "A").correct);
        assert!(!score_response(&ScoringHint::Choice, "B", &c, "e").correct);
    }

    #[test]
    fn test_defaults_per_domain() {
        let kws = vec!["variance".to_string()];
        assert!(matches!(
            ScoringHint::default_for(Domain::Probability, "0.5", &kws),
            ScoringHint::Numeric { relative: false, .. }
        ));
        assert!(matches!(
            ScoringHint::default_for(Domain::Trading, "1.2", &kws),
            ScoringHint::Numeric { relative: true, .. }
        ));
        assert!(matches!(
            ScoringHint::default_for(Domain::Ml, "bias", &kws),
            ScoringHint::Keywords { min_matches: 1, .. }
        ));
        assert!(matches!(
            ScoringHint::default_for(Domain::Ml, "bias", &[]),
            ScoringHint::Exact { .. }
        ));
    }

    #[test]
    fn test_free_text_policy_per_domain() {
        let kws: Vec<String> = ["conditional", "given", "intersection"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            ScoringHint::default_for(Domain::Probability, "P(A and B) / P(B)", &kws),
            ScoringHint::Keywords { keywords: kws.clone(), min_matches: 1 }
        );
        assert_eq!(
            ScoringHint::default_for(Domain::Probability, "P(A and B) / P(B)", &[]),
            ScoringHint::Exact { case_sensitive: false }
        );
        assert!(matches!(
            ScoringHint::default_for(Domain::Ml, "bias", &kws),
            ScoringHint::Keywords { min_matches: 2, .. }
        ));
        assert!(matches!(
            ScoringHint::keywords_for(Domain::Trading, kws.clone()),
            ScoringHint::Keywords { min_matches: 2, .. }
        ));
    }

    #[test]
    fn test_describe_names_the_expected_form() {
        assert_eq!(
            ScoringHint::Numeric { tolerance: 0.01, relative: false }.describe(),
            "number within ±0.01"
        );
        assert_eq!(
            ScoringHint::Numeric { tolerance: 0.02, relative: true }.describe(),
            "number within 2%"
        );
        assert_eq!(ScoringHint::Choice.describe(), "one option letter");
    }

    #[test]
    fn test_hint_serde_shape() {
        let hint: ScoringHint =
            serde_json::from_str(r#"{"type":"keywords","keywords":["edge"]}"#).unwrap();
        assert_eq!(
            hint,
            ScoringHint::Keywords {
                keywords: vec!["edge".into()],
                min_matches: 1
            }
        );
    }
}
