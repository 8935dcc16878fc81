//! Queries over text segments.
//!
//! Queries are built from already-analyzed terms; [`Query::text`] runs a
//! field's analyzer over free text to produce one.

use crate::analysis::analyzer::Analyzer;
use crate::error::Result;

/// A query over the fields of a text index.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Documents containing `term` in `field`.
    Term { field: String, term: String },
    /// Documents containing `terms` at consecutive positions.
    Phrase { field: String, terms: Vec<String> },
    Boolean(BooleanQuery),
    /// Every live document, scored 1.0.
    MatchAll,
}

/// Boolean combination of clauses.
///
/// `must` and `filter` clauses are required, `must_not` clauses exclude, and
/// `should` clauses are required only when there is no `must` or `filter`
/// clause. Only `must` and `should` contribute to the score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooleanQuery {
    pub must: Vec<Query>,
    pub should: Vec<Query>,
    pub must_not: Vec<Query>,
    pub filter: Vec<Query>,
}

impl BooleanQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, query: Query) -> Self {
        self.must.push(query);
        self
    }

    pub fn should(mut self, query: Query) -> Self {
        self.should.push(query);
        self
    }

    pub fn must_not(mut self, query: Query) -> Self {
        self.must_not.push(query);
        self
    }

    pub fn filter(mut self, query: Query) -> Self {
        self.filter.push(query);
        self
    }

    /// True when no clause can make a document match.
    pub fn has_positive_clause(&self) -> bool {
        !(self.must.is_empty() && self.should.is_empty() && self.filter.is_empty())
    }
}

impl From<BooleanQuery> for Query {
    fn from(query: BooleanQuery) -> Self {
        Query::Boolean(query)
    }
}

impl Query {
    pub fn term<F: Into<String>, T: Into<String>>(field: F, term: T) -> Self {
        Query::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    pub fn phrase<F: Into<String>>(field: F, terms: Vec<String>) -> Self {
        Query::Phrase {
            field: field.into(),
            terms,
        }
    }

    /// Analyze free text into a query over `field`.
    ///
    /// Every token becomes a term clause, spans in double quotes become
    /// phrase clauses. Clauses are all required when `match_all` is set and
    /// optional otherwise. A single clause is returned as is.
    pub fn text(field: &str, text: &str, analyzer: &dyn Analyzer, match_all: bool) -> Result<Self> {
        let mut clauses = Vec::new();
        for (i, span) in text.split('"').enumerate() {
            let terms: Vec<String> = analyzer.analyze(span)?.map(|t| t.term).collect();
            let quoted = i % 2 == 1;
            if quoted && terms.len() > 1 {
                clauses.push(Query::phrase(field, terms));
            } else {
                clauses.extend(terms.into_iter().map(|term| Query::term(field, term)));
            }
        }

        if clauses.len() == 1 {
            return Ok(clauses.remove(0));
        }
        let mut query = BooleanQuery::new();
        if match_all {
            query.must = clauses;
        } else {
            query.should = clauses;
        }
        Ok(Query::Boolean(query))
    }
}
