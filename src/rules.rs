use std::borrow::Cow;

use regex::{NoExpand, Regex, RegexBuilder};

use crate::error::{Error, Result};

/// Substring test applied to the target column of each row.
#[derive(Debug, Clone)]
pub struct MatchRule {
    keyword: String,
    case_sensitive: bool,
}

impl MatchRule {
    pub fn new(keyword: &str, case_sensitive: bool) -> Self {
        let keyword = if case_sensitive {
            keyword.to_string()
        } else {
            keyword.to_lowercase()
        };
        Self {
            keyword,
            case_sensitive,
        }
    }

    pub fn is_match(&self, text: &str) -> bool {
        if self.keyword.is_empty() {
            return true;
        }
        if self.case_sensitive {
            text.contains(&self.keyword)
        } else {
            text.to_lowercase().contains(&self.keyword)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplaceOptions {
    pub from: String,
    pub to: String,
    pub case_insensitive: bool,
}

/// Literal find/replace over a single field.
///
/// One forward pass: occurrences are leftmost and non-overlapping, and the
/// scan resumes after each replaced span, so text inserted by `to` is never
/// searched again.
#[derive(Debug, Clone)]
pub struct ReplaceRule {
    from: String,
    to: String,
    folded: Option<Regex>,
}

impl ReplaceRule {
    pub fn new(options: &ReplaceOptions) -> Result<Self> {
        if options.from.is_empty() {
            return Err(Error::invocation("--from must not be empty"));
        }
        let folded = if options.case_insensitive {
            let regex = RegexBuilder::new(&regex::escape(&options.from))
                .case_insensitive(true)
                .build()
                .map_err(|err| Error::invocation(format!("invalid --from text: {err}")))?;
            Some(regex)
        } else {
            None
        };
        Ok(Self {
            from: options.from.clone(),
            to: options.to.clone(),
            folded,
        })
    }

    pub fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.folded {
            Some(regex) => regex.replace_all(text, NoExpand(&self.to)),
            None if text.contains(&self.from) => Cow::Owned(text.replace(&self.from, &self.to)),
            None => Cow::Borrowed(text),
        }
    }
}
