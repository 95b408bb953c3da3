//! Builds the lexical store's `bool` query body from a [`SearchFilters`].
//!
//! Shaped after the teacher's own `BooleanQueryBuilder` (must/should/must_not
//! clauses, builder-style construction) but producing the lexical store's
//! wire format — a `serde_json::Value` JSON query body — rather than an
//! in-process matcher tree, since here the query executes on a remote store
//! instead of a local index.

use serde_json::{Value, json};

use crate::candidate::SearchFilters;

/// Default fuzziness applied to the free-text role match (spec §4.7,
/// "typo-tolerant"). `"AUTO"` lets Elasticsearch scale tolerance to term
/// length, same as the upstream service's query template.
const ROLE_FUZZINESS: &str = "AUTO";

#[derive(Debug, Default)]
pub struct BoolQueryBuilder {
    must: Vec<Value>,
    should: Vec<Value>,
    must_not: Vec<Value>,
    filter: Vec<Value>,
}

impl BoolQueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, clause: Value) -> Self {
        self.must.push(clause);
        self
    }

    pub fn should(mut self, clause: Value) -> Self {
        self.should.push(clause);
        self
    }

    pub fn must_not(mut self, clause: Value) -> Self {
        self.must_not.push(clause);
        self
    }

    pub fn filter(mut self, clause: Value) -> Self {
        self.filter.push(clause);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
            && self.filter.is_empty()
    }

    /// Render as an Elasticsearch query body. An empty builder renders as
    /// `match_all`, matching the spec's "no filters supplied" behavior
    /// (spec §7, boundary: empty `SearchFilters`).
    pub fn build(self) -> Value {
        if self.is_empty() {
            return json!({ "match_all": {} });
        }

        let mut bool_body = serde_json::Map::new();
        if !self.must.is_empty() {
            bool_body.insert("must".into(), Value::Array(self.must));
        }
        if !self.should.is_empty() {
            bool_body.insert("should".into(), Value::Array(self.should));
            // spec §4.7: nice_skills contribute only to ranking, never to
            // filtering, so at least one matching is never required.
            bool_body.insert("minimum_should_match".into(), json!(0));
        }
        if !self.must_not.is_empty() {
            bool_body.insert("must_not".into(), Value::Array(self.must_not));
        }
        if !self.filter.is_empty() {
            bool_body.insert("filter".into(), Value::Array(self.filter));
        }

        json!({ "bool": Value::Object(bool_body) })
    }
}

/// Translate normalized `SearchFilters` into a lexical store query (spec
/// §4.7): `role`, `location`, and each `must_skill` are fuzzy `must` matches
/// (AUTO fuzziness — they score *and* filter, since a non-match contributes
/// no score and drops the candidate from `must`'s all-must-match semantics);
/// `work_modes` is a `must` terms filter; `experience_years` is a `must`
/// range; each `nice_skill` is a `should` fuzzy match (`minimum_should_match
/// = 0`, ranking-only); `exclude_ids` becomes `must_not` on `_id`.
pub fn build_query(filters: &SearchFilters) -> Value {
    let mut builder = BoolQueryBuilder::new();

    if let Some(role) = filters.role.as_ref().filter(|r| !r.trim().is_empty()) {
        builder = builder.must(json!({
            "match": {
                "headline_role": {
                    "query": role,
                    "fuzziness": ROLE_FUZZINESS,
                }
            }
        }));
    }

    if filters.experience_min.is_some() || filters.experience_max.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(min) = filters.experience_min {
            range.insert("gte".into(), json!(min));
        }
        if let Some(max) = filters.experience_max {
            range.insert("lte".into(), json!(max));
        }
        builder = builder.must(json!({ "range": { "experience_years": range } }));
    }

    if let Some(location) = filters.location.as_ref().filter(|l| !l.trim().is_empty()) {
        builder = builder.must(json!({
            "match": {
                "location": {
                    "query": location,
                    "fuzziness": ROLE_FUZZINESS,
                }
            }
        }));
    }

    for skill in &filters.must_skills {
        builder = builder.must(json!({
            "match": {
                "skills": {
                    "query": skill,
                    "fuzziness": ROLE_FUZZINESS,
                }
            }
        }));
    }

    if !filters.work_modes.is_empty() {
        builder = builder.must(json!({ "terms": { "work_modes": filters.work_modes } }));
    }

    for skill in &filters.nice_skills {
        builder = builder.should(json!({
            "match": {
                "skills": {
                    "query": skill,
                    "fuzziness": ROLE_FUZZINESS,
                }
            }
        }));
    }

    for id in &filters.exclude_ids {
        builder = builder.must_not(json!({ "term": { "_id": id } }));
    }

    builder.build()
}
