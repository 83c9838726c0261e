use indexmap::IndexMap;

use super::normalizer::{normalize_result, JobResult};
use crate::platforms::TypeFilter;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultKey {
    pub job_id: String,
    pub platform: String,
    pub format: String,
}

impl ResultKey {
    pub fn of(result: &JobResult) -> Self {
        Self {
            job_id: result.job_id.clone(),
            platform: result.platform.clone(),
            format: result.format.clone(),
        }
    }
}

/// Append-only cache of generated results, in arrival order.
///
/// Every entry goes through [`normalize_result`] on the way in, and the first
/// result seen for a `(job_id, platform, format)` triple wins. Because of
/// that, the order in which independent jobs deliver their results does not
/// change what ends up stored.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    entries: IndexMap<ResultKey, JobResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the triple was already present; the stored entry
    /// is left untouched in that case.
    pub fn add(&mut self, result: JobResult) -> bool {
        let result = normalize_result(result);
        let key = ResultKey::of(&result);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, result);
        true
    }

    pub fn extend<I>(&mut self, results: I) -> usize
    where
        I: IntoIterator<Item = JobResult>,
    {
        results
            .into_iter()
            .map(|result| self.add(result))
            .filter(|added| *added)
            .count()
    }

    pub fn contains(&self, key: &ResultKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn all(&self) -> impl Iterator<Item = &JobResult> {
        self.entries.values()
    }

    pub fn all_for_topic(&self, topic_id: &str) -> Vec<&JobResult> {
        self.entries
            .values()
            .filter(|result| result.topic_id.as_deref() == Some(topic_id))
            .collect()
    }

    pub fn filter_by_type(&self, filter: &TypeFilter) -> Vec<&JobResult> {
        self.entries
            .values()
            .filter(|result| filter.accepts(&result.platform, &result.format))
            .collect()
    }

    pub fn filter_for_topic(&self, topic_id: &str, filter: &TypeFilter) -> Vec<&JobResult> {
        self.all_for_topic(topic_id)
            .into_iter()
            .filter(|result| filter.accepts(&result.platform, &result.format))
            .collect()
    }

    /// Counts per `platform:format` for one topic, in first-seen order.
    pub fn count_by_type(&self, topic_id: &str) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        for result in self.all_for_topic(topic_id) {
            *counts.entry(result.type_key()).or_insert(0) += 1;
        }
        counts
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for topic_id in self.entries.values().filter_map(|r| r.topic_id.as_ref()) {
            if !topics.contains(topic_id) {
                topics.push(topic_id.clone());
            }
        }
        topics
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::ResultStore;
    use crate::content::{normalize, JobResult};
    use crate::platforms::TypeFilter;

    fn result(job: &str, platform: &str, format: &str, topic: &str, content: Value) -> JobResult {
        normalize(&json!({
            "job_id": job,
            "platform": platform,
            "format": format,
            "topic_id": topic,
            "envelope": {"content": content},
        }))
    }

    #[test]
    fn duplicate_triples_are_ignored() {
        let mut store = ResultStore::new();
        assert!(store.add(result("j1", "medium", "article", "42", json!({"title": "first"}))));
        assert!(!store.add(result("j1", "medium", "article", "42", json!({"title": "second"}))));
        assert_eq!(store.all_for_topic("42").len(), 1);
        assert_eq!(store.all_for_topic("42")[0].content()["title"], json!("first"));

        assert!(store.add(result("j2", "medium", "article", "42", json!({}))));
        assert_eq!(store.all_for_topic("42").len(), 2);
    }

    #[test]
    fn add_normalizes_wrapped_content() {
        let mut store = ResultStore::new();
        let wrapped = JobResult {
            job_id: "j1".to_string(),
            platform: "Reddit".to_string(),
            format: "post".to_string(),
            topic_id: Some("7".to_string()),
            envelope: crate::content::Envelope {
                content: json!([{"meta": {}, "content": {"title": "T"}}]),
            },
        };
        store.add(wrapped);
        let stored = store.all_for_topic("7");
        assert_eq!(stored[0].content(), &json!({"title": "T"}));
        assert_eq!(stored[0].platform, "reddit");
    }

    #[test]
    fn filters_by_type_and_all() {
        let mut store = ResultStore::new();
        store.add(result("j1", "instagram", "reel", "42", json!({})));
        store.add(result("j1", "medium", "article", "42", json!({})));
        store.add(result("j2", "medium", "article", "43", json!({})));

        assert_eq!(store.filter_by_type(&TypeFilter::only("medium", "article")).len(), 2);
        assert_eq!(store.filter_by_type(&TypeFilter::All).len(), 3);
        assert_eq!(
            store
                .filter_for_topic("42", &TypeFilter::only("medium", "article"))
                .len(),
            1
        );
        assert_eq!(store.topics(), vec!["42".to_string(), "43".to_string()]);
    }

    #[test]
    fn type_counts_sum_to_topic_total() {
        let mut store = ResultStore::new();
        store.add(result("j1", "instagram", "reel", "42", json!({})));
        store.add(result("j1", "medium", "article", "42", json!({})));
        store.add(result("j2", "medium", "article", "42", json!({})));
        store.add(result("j2", "medium", "article", "42", json!({})));
        store.add(result("j3", "reddit", "post", "43", json!({})));

        for topic in ["42", "43", "missing"] {
            let counts = store.count_by_type(topic);
            assert_eq!(
                counts.values().sum::<usize>(),
                store.all_for_topic(topic).len()
            );
        }
        let counts = store.count_by_type("42");
        assert_eq!(counts.get("medium:article"), Some(&2));
        assert_eq!(counts.get("instagram:reel"), Some(&1));
    }

    #[test]
    fn x_results_share_the_twitter_tab() {
        let mut store = ResultStore::new();
        store.add(result("j1", "x", "thread", "42", json!({"tweets": ["a"]})));
        store.add(result("j2", "twitter", "thread", "42", json!({"tweets": ["b"]})));

        let filter = TypeFilter::only("twitter", "thread");
        assert_eq!(store.filter_for_topic("42", &filter).len(), 2);
        let counts = store.count_by_type("42");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("twitter:thread"), Some(&2));
    }

    #[test]
    fn insertion_order_does_not_change_contents() {
        let rows = vec![
            result("j1", "instagram", "reel", "42", json!({"a": 1})),
            result("j2", "medium", "article", "42", json!({"b": 2})),
            result("j1", "instagram", "reel", "42", json!({"a": 1})),
        ];
        let mut forward = ResultStore::new();
        forward.extend(rows.clone());
        let mut backward = ResultStore::new();
        backward.extend(rows.into_iter().rev());

        let mut a = forward.all().cloned().collect::<Vec<_>>();
        let mut b = backward.all().cloned().collect::<Vec<_>>();
        a.sort_by_key(|r| r.type_key());
        b.sort_by_key(|r| r.type_key());
        assert_eq!(a, b);
    }
}
