//! Declarative command argument grammars.
//!
//! A grammar is an ordered list of [`Part`]s. Required parts (values, terms and lists) are matched
//! positionally. Consecutive optional parts form a run in which options may appear in any order,
//! each at most once.

use std::collections::{HashMap, HashSet};

use crate::commands::CommandError;

#[derive(Debug, Clone)]
pub enum Part {
    /// A single positional value.
    Value(&'static str),
    /// A positional token that must be one of `terms`, matched case-insensitively.
    Term(&'static [&'static str]),
    /// Every remaining token, grouped by `width`. Tokens needed by required parts that follow
    /// the list are left for them.
    List {
        width: usize,
        required: bool,
    },
    /// A count stored under `count`, followed by that many list tokens.
    CountedList { count: &'static str },
    /// An optional value without a keyword, optionally followed by one of `terms`.
    Anonymous {
        name: &'static str,
        terms: &'static [&'static str],
    },
    /// `NAME v1 .. vn`
    Option { name: &'static str, arity: usize },
    /// `NAME v1 v2 ...` up to the next option of the same run.
    OptionList { name: &'static str },
    /// `NAME term`
    OptionTerms {
        name: &'static str,
        terms: &'static [&'static str],
    },
    /// At most one of the grouped options.
    Choice(Vec<Part>),
}

impl Part {
    pub fn value(name: &'static str) -> Part {
        Part::Value(name)
    }

    pub fn term(terms: &'static [&'static str]) -> Part {
        Part::Term(terms)
    }

    pub fn list(width: usize) -> Part {
        Part::List {
            width,
            required: true,
        }
    }

    /// A list that may be empty.
    pub fn rest() -> Part {
        Part::List {
            width: 1,
            required: false,
        }
    }

    pub fn counted_list(count: &'static str) -> Part {
        Part::CountedList { count }
    }

    pub fn anonymous(name: &'static str) -> Part {
        Part::Anonymous { name, terms: &[] }
    }

    pub fn anonymous_with_terms(name: &'static str, terms: &'static [&'static str]) -> Part {
        Part::Anonymous { name, terms }
    }

    pub fn flag(name: &'static str) -> Part {
        Part::Option { name, arity: 0 }
    }

    pub fn option(name: &'static str, arity: usize) -> Part {
        Part::Option { name, arity }
    }

    pub fn option_list(name: &'static str) -> Part {
        Part::OptionList { name }
    }

    pub fn option_terms(name: &'static str, terms: &'static [&'static str]) -> Part {
        Part::OptionTerms { name, terms }
    }

    pub fn choice(options: Vec<Part>) -> Part {
        Part::Choice(options)
    }

    /// A choice between keyword flags, e.g. `[NX | XX]`.
    pub fn flags(names: &[&'static str]) -> Part {
        Part::Choice(names.iter().map(|name| Part::flag(*name)).collect())
    }

    fn is_optional(&self) -> bool {
        matches!(
            self,
            Part::Anonymous { .. }
                | Part::Option { .. }
                | Part::OptionList { .. }
                | Part::OptionTerms { .. }
                | Part::Choice(_)
        )
    }

    /// The keyword option of this part named `keyword`, looking inside choices.
    fn keyword(&self, keyword: &str) -> Option<&Part> {
        match self {
            Part::Option { name, .. } | Part::OptionList { name } | Part::OptionTerms { name, .. }
                if *name == keyword =>
            {
                Some(self)
            }
            Part::Choice(options) => options.iter().find_map(|p| p.keyword(keyword)),
            _ => None,
        }
    }

    /// Number of tokens a required part consumes when followed by nothing else.
    fn min_tokens(&self) -> usize {
        match self {
            Part::Value(_) | Part::Term(_) => 1,
            Part::List {
                width,
                required: true,
            } => *width,
            Part::CountedList { .. } => 2,
            _ => 0,
        }
    }
}

/// The parsed arguments of a single invocation. Option names and terms are stored uppercase,
/// everything else as received.
#[derive(Debug, Default, PartialEq)]
pub struct Args {
    values: HashMap<&'static str, String>,
    terms: Vec<String>,
    list: Vec<String>,
    options: HashMap<&'static str, Vec<String>>,
    anonymous: Option<String>,
    anonymous_terms: HashSet<String>,
}

impl Args {
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    /// The `index`th positional term, uppercase.
    pub fn term(&self, index: usize) -> &str {
        self.terms.get(index).map(String::as_str).unwrap_or_default()
    }

    pub fn list(&self) -> &[String] {
        &self.list
    }

    pub fn has(&self, option: &str) -> bool {
        self.options.contains_key(option)
    }

    pub fn option(&self, option: &str) -> Option<&[String]> {
        self.options.get(option).map(Vec::as_slice)
    }

    /// The first value of `option`.
    pub fn option_value(&self, option: &str) -> Option<&str> {
        self.option(option)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn anonymous(&self) -> Option<&str> {
        self.anonymous.as_deref()
    }

    pub fn has_anonymous_term(&self, term: &str) -> bool {
        self.anonymous_terms.contains(term)
    }
}

struct Tokens {
    tokens: Vec<String>,
    position: usize,
}

impl Tokens {
    fn remaining(&self) -> usize {
        self.tokens.len() - self.position
    }

    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.position).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn take(&mut self, n: usize) -> Vec<String> {
        let end = (self.position + n).min(self.tokens.len());
        let taken = self.tokens[self.position..end].to_vec();
        self.position = end;
        taken
    }
}

fn match_term(token: &str, terms: &[&str]) -> Option<String> {
    let upper = token.to_uppercase();
    terms.iter().any(|t| *t == upper).then_some(upper)
}

/// Applies `grammar` to `tokens`, the arguments following the command name.
pub fn parse(command: &str, grammar: &[Part], tokens: Vec<String>) -> Result<Args, CommandError> {
    let arity = || CommandError::WrongArity(command.to_lowercase());

    let mut args = Args::default();
    let mut tokens = Tokens {
        tokens,
        position: 0,
    };

    let mut index = 0;
    while index < grammar.len() {
        let part = &grammar[index];

        if part.is_optional() {
            let run = grammar[index..]
                .iter()
                .take_while(|p| p.is_optional())
                .count();
            parse_run(&grammar[index..index + run], &mut tokens, &mut args)?;
            index += run;
            continue;
        }

        if tokens.remaining() == 0 {
            if part.min_tokens() == 0 {
                break;
            }
            return Err(arity());
        }

        let reserved: usize = grammar[index + 1..].iter().map(Part::min_tokens).sum();

        match part {
            Part::Value(name) => {
                let token = tokens.next().ok_or_else(arity)?;
                args.values.insert(*name, token);
            }
            Part::Term(terms) => {
                let token = tokens.next().ok_or_else(arity)?;
                let term = match_term(&token, terms).ok_or(CommandError::UnknownTerm(token))?;
                args.terms.push(term);
            }
            Part::List { width, required } => {
                let available = tokens.remaining().saturating_sub(reserved);
                if *required && available < *width {
                    return Err(arity());
                }
                if available % width != 0 {
                    return Err(arity());
                }
                args.list = tokens.take(available);
            }
            Part::CountedList { count } => {
                let token = tokens.next().ok_or_else(arity)?;
                let n: i64 = token.parse().map_err(|_| CommandError::NotInteger)?;
                if n <= 0 {
                    return Err(CommandError::OutOfRange(format!(
                        "{} should be greater than 0",
                        count
                    )));
                }
                if n as usize > tokens.remaining() {
                    return Err(CommandError::Syntax);
                }
                args.values.insert(*count, token);
                args.list = tokens.take(n as usize);
            }
            _ => return Err(CommandError::Syntax),
        }

        index += 1;
    }

    if tokens.remaining() > 0 {
        return Err(CommandError::Syntax);
    }

    Ok(args)
}

/// Matches a run of optional parts. Options can appear in any order; each part, and each choice
/// group as a whole, at most once.
fn parse_run(run: &[Part], tokens: &mut Tokens, args: &mut Args) -> Result<(), CommandError> {
    let mut seen = vec![false; run.len()];

    while let Some(token) = tokens.peek() {
        let upper = token.to_uppercase();

        let keyword = run
            .iter()
            .enumerate()
            .find_map(|(i, part)| part.keyword(&upper).map(|option| (i, option)));

        if let Some((i, option)) = keyword {
            if seen[i] {
                return Err(CommandError::Syntax);
            }
            seen[i] = true;
            tokens.next();
            parse_option(option, run, tokens, args)?;
            continue;
        }

        let anonymous = run
            .iter()
            .enumerate()
            .find(|(i, part)| !seen[*i] && matches!(part, Part::Anonymous { .. }));

        match anonymous {
            Some((i, Part::Anonymous { terms, .. })) => {
                seen[i] = true;
                args.anonymous = tokens.next();
                if let Some(term) = tokens.peek().and_then(|t| match_term(t, terms)) {
                    tokens.next();
                    args.anonymous_terms.insert(term);
                }
            }
            _ => break,
        }
    }

    Ok(())
}

fn parse_option(
    option: &Part,
    run: &[Part],
    tokens: &mut Tokens,
    args: &mut Args,
) -> Result<(), CommandError> {
    match option {
        Part::Option { name, arity } => {
            if tokens.remaining() < *arity {
                return Err(CommandError::Syntax);
            }
            args.options.insert(*name, tokens.take(*arity));
        }
        Part::OptionTerms { name, terms } => {
            let token = tokens.next().ok_or(CommandError::Syntax)?;
            let term = match_term(&token, terms).ok_or(CommandError::Syntax)?;
            args.options.insert(*name, vec![term]);
        }
        Part::OptionList { name } => {
            let mut values = vec![];
            while let Some(token) = tokens.peek() {
                let upper = token.to_uppercase();
                if run.iter().any(|p| p.keyword(&upper).is_some()) {
                    break;
                }
                values.extend(tokens.next());
            }
            if values.is_empty() {
                return Err(CommandError::Syntax);
            }
            args.options.insert(*name, values);
        }
        _ => return Err(CommandError::Syntax),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn positional_values() {
        let grammar = [Part::value("key"), Part::value("value")];

        let args = parse("SET", &grammar, tokens("foo bar")).unwrap();

        assert_eq!(args.value("key"), "foo");
        assert_eq!(args.value("value"), "bar");
    }

    #[test]
    fn missing_required_part_is_arity_error() {
        let grammar = [Part::value("key"), Part::value("value")];

        let err = parse("SET", &grammar, tokens("foo")).unwrap_err();

        assert_eq!(err, CommandError::WrongArity("set".to_string()));
        assert_eq!(
            err.to_string(),
            "ERR wrong number of arguments for 'set' command"
        );
    }

    #[test]
    fn extra_tokens_are_syntax_error() {
        let grammar = [Part::value("key")];

        let err = parse("GET", &grammar, tokens("a b")).unwrap_err();

        assert_eq!(err, CommandError::Syntax);
    }

    #[test]
    fn terms_are_case_insensitive() {
        let grammar = [
            Part::value("key"),
            Part::term(&["BEFORE", "AFTER"]),
            Part::value("pivot"),
            Part::value("element"),
        ];

        let args = parse("LINSERT", &grammar, tokens("l before b x")).unwrap();
        assert_eq!(args.term(0), "BEFORE");

        let err = parse("LINSERT", &grammar, tokens("l middle b x")).unwrap_err();
        assert_eq!(err, CommandError::UnknownTerm("middle".to_string()));
    }

    #[test]
    fn list_of_pairs() {
        let grammar = [Part::list(2)];

        let args = parse("MSET", &grammar, tokens("a 1 b 2")).unwrap();
        assert_eq!(args.list(), &tokens("a 1 b 2")[..]);

        let err = parse("MSET", &grammar, tokens("a 1 b")).unwrap_err();
        assert_eq!(err, CommandError::WrongArity("mset".to_string()));
    }

    #[test]
    fn list_leaves_tokens_for_trailing_values() {
        let grammar = [Part::list(1), Part::value("timeout")];

        let args = parse("BLPOP", &grammar, tokens("a b c 5")).unwrap();

        assert_eq!(args.list(), &tokens("a b c")[..]);
        assert_eq!(args.value("timeout"), "5");
    }

    #[test]
    fn counted_list() {
        let grammar = [
            Part::value("destination"),
            Part::counted_list("numkeys"),
            Part::option_list("WEIGHTS"),
            Part::option_terms("AGGREGATE", &["SUM", "MIN", "MAX"]),
        ];

        let args = parse(
            "ZUNIONSTORE",
            &grammar,
            tokens("out 2 a b aggregate max weights 1 2"),
        )
        .unwrap();

        assert_eq!(args.value("numkeys"), "2");
        assert_eq!(args.list(), &tokens("a b")[..]);
        assert_eq!(args.option("WEIGHTS"), Some(&tokens("1 2")[..]));
        assert_eq!(args.option_value("AGGREGATE"), Some("MAX"));

        let err = parse("ZUNIONSTORE", &grammar, tokens("out 0 a")).unwrap_err();
        assert!(matches!(err, CommandError::OutOfRange(_)));

        let err = parse("ZUNIONSTORE", &grammar, tokens("out 3 a b")).unwrap_err();
        assert_eq!(err, CommandError::Syntax);
    }

    #[test]
    fn options_in_any_order() {
        let grammar = [
            Part::value("key"),
            Part::value("start"),
            Part::value("stop"),
            Part::flags(&["BYSCORE", "BYLEX"]),
            Part::flag("REV"),
            Part::option("LIMIT", 2),
            Part::flag("WITHSCORES"),
        ];

        let args = parse(
            "ZRANGE",
            &grammar,
            tokens("z 0 10 withscores limit 1 2 byscore"),
        )
        .unwrap();

        assert!(args.has("WITHSCORES"));
        assert!(args.has("BYSCORE"));
        assert!(!args.has("BYLEX"));
        assert!(!args.has("REV"));
        assert_eq!(args.option("LIMIT"), Some(&tokens("1 2")[..]));
    }

    #[test]
    fn choice_allows_a_single_member() {
        let grammar = [Part::value("key"), Part::flags(&["NX", "XX"])];

        let err = parse("EXPIRE", &grammar, tokens("k NX XX")).unwrap_err();

        assert_eq!(err, CommandError::Syntax);
    }

    #[test]
    fn option_missing_values() {
        let grammar = [Part::value("key"), Part::option("LIMIT", 2)];

        let err = parse("ZRANGEBYSCORE", &grammar, tokens("k LIMIT 1")).unwrap_err();

        assert_eq!(err, CommandError::Syntax);
    }

    #[test]
    fn options_before_a_list() {
        let grammar = [
            Part::value("key"),
            Part::flags(&["NX", "XX"]),
            Part::flags(&["GT", "LT"]),
            Part::flag("CH"),
            Part::flag("INCR"),
            Part::list(2),
        ];

        let args = parse("ZADD", &grammar, tokens("z ch nx 1 a 2 b")).unwrap();

        assert!(args.has("CH"));
        assert!(args.has("NX"));
        assert_eq!(args.list(), &tokens("1 a 2 b")[..]);
    }

    #[test]
    fn anonymous_value_with_term() {
        let grammar = [
            Part::value("key"),
            Part::anonymous_with_terms("count", &["WITHVALUES"]),
        ];

        let args = parse("HRANDFIELD", &grammar, tokens("h -5 withvalues")).unwrap();
        assert_eq!(args.anonymous(), Some("-5"));
        assert!(args.has_anonymous_term("WITHVALUES"));

        let args = parse("HRANDFIELD", &grammar, tokens("h")).unwrap();
        assert_eq!(args.anonymous(), None);
    }

    #[test]
    fn optional_list_may_be_empty() {
        let grammar = [Part::rest()];

        let args = parse("SCAN", &grammar, vec![]).unwrap();

        assert!(args.list().is_empty());
    }
}
