use crate::engine::config::AggregateConfig;
use crate::engine::similarity::{FieldMatch, match_exact, match_fuzzy, normalize_title, ratio};
use crate::engine::types::{Category, ClassifiedActivity, combined_score, round_to};
use std::collections::BTreeSet;

fn category_match(a: Category, b: Category) -> FieldMatch {
    match (a, b) {
        (Category::Other, _) | (_, Category::Other) => FieldMatch::Wildcard,
        (x, y) if x == y => FieldMatch::Match,
        _ => FieldMatch::Mismatch,
    }
}

/// Field-by-field comparison for non-compound activities. Both sides
/// must carry the same media key; every other field only has to be
/// compatible (equal, or empty on one side).
///
/// The media key is the anchor and is never a wildcard: an activity
/// without one can only merge by title.
fn structured_match(a: &ClassifiedActivity, b: &ClassifiedActivity, place_threshold: f64) -> bool {
    if a.is_compound || b.is_compound {
        return false;
    }
    let anchor = match_exact(a.image.media_key.as_deref(), b.image.media_key.as_deref());
    if anchor != FieldMatch::Match {
        return false;
    }
    [
        category_match(a.category, b.category),
        match_fuzzy(
            a.place_name.as_deref(),
            b.place_name.as_deref(),
            place_threshold,
        ),
        match_fuzzy(
            a.place_query.as_deref(),
            b.place_query.as_deref(),
            place_threshold,
        ),
        match_exact(a.city.as_deref(), b.city.as_deref()),
        match_exact(a.region.as_deref(), b.region.as_deref()),
        match_exact(a.country.as_deref(), b.country.as_deref()),
    ]
    .into_iter()
    .all(FieldMatch::is_compatible)
}

/// `a_title` and `b_title` are the `normalize_title` forms of the two
/// activities.
fn linked(
    (a, a_title): (&ClassifiedActivity, &str),
    (b, b_title): (&ClassifiedActivity, &str),
    cfg: &AggregateConfig,
) -> bool {
    ratio(a_title, b_title) >= cfg.title_similarity || structured_match(a, b, cfg.place_similarity)
}

pub fn is_duplicate(a: &ClassifiedActivity, b: &ClassifiedActivity, cfg: &AggregateConfig) -> bool {
    linked(
        (a, &normalize_title(&a.activity)),
        (b, &normalize_title(&b.activity)),
        cfg,
    )
}

/// Disjoint sets over input positions. The root of every set is its
/// smallest index, so the primary record is always the first occurrence.
struct Groups {
    parent: Vec<usize>,
}

impl Groups {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (keep, absorb) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[absorb] = keep;
        }
    }
}

fn merge_group(members: Vec<ClassifiedActivity>) -> Option<ClassifiedActivity> {
    let count = members.len() as f64;
    let fun_mean = members.iter().map(|m| m.fun_score).sum::<f64>() / count;
    let int_mean = members.iter().map(|m| m.interesting_score).sum::<f64>() / count;

    let mut iter = members.into_iter();
    let mut primary = iter.next()?;
    if iter.len() == 0 {
        return Some(primary);
    }
    let mut seen: BTreeSet<_> = primary.messages.iter().map(|m| m.id).collect();
    for other in iter {
        for message in other.messages {
            if seen.insert(message.id) {
                primary.messages.push(message);
            }
        }
    }

    primary.fun_score = round_to(fun_mean, 1);
    primary.interesting_score = round_to(int_mean, 1);
    primary.score = combined_score(primary.fun_score, primary.interesting_score);
    primary.refresh_id();
    Some(primary)
}

/// Merge activities that describe the same real-world suggestion.
///
/// Pairs are linked when their titles are near-identical or their
/// structured fields agree; linked pairs are grouped transitively. Each
/// group keeps its first-occurring member's fields, the union of all
/// evidence messages, and averaged scores. Output order follows the
/// first occurrence of each group.
pub fn aggregate(activities: Vec<ClassifiedActivity>, cfg: &AggregateConfig) -> Vec<ClassifiedActivity> {
    let len = activities.len();
    let titles: Vec<String> = activities
        .iter()
        .map(|a| normalize_title(&a.activity))
        .collect();
    let mut groups = Groups::new(len);
    for i in 0..len {
        for j in (i + 1)..len {
            if groups.find(i) == groups.find(j) {
                continue;
            }
            if linked(
                (&activities[i], &titles[i]),
                (&activities[j], &titles[j]),
                cfg,
            ) {
                groups.union(i, j);
            }
        }
    }

    let mut buckets: Vec<Vec<ClassifiedActivity>> = (0..len).map(|_| Vec::new()).collect();
    for (i, activity) in activities.into_iter().enumerate() {
        let root = groups.find(i);
        buckets[root].push(activity);
    }
    buckets
        .into_iter()
        .filter_map(merge_group)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::fixtures::activity;

    fn cfg() -> AggregateConfig {
        AggregateConfig::default()
    }

    fn keyed(title: &str, id: u64, media_key: &str, city: Option<&str>) -> ClassifiedActivity {
        let mut a = activity(title, id);
        a.image.media_key = Some(media_key.to_string());
        a.city = city.map(str::to_string);
        a.refresh_id();
        a
    }

    #[test]
    fn pottery_title_variants_collapse_to_one() {
        let input = vec![
            activity("pottery class", 1),
            activity("Pottery Class", 2),
            activity("pottery classes", 3),
        ];
        let out = aggregate(input, &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].activity, "pottery class");
        let ids: Vec<_> = out[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn same_media_key_different_city_stays_separate() {
        let input = vec![
            keyed("Pottery class", 1, "pottery", Some("Auckland")),
            keyed("Wheel throwing workshop", 2, "pottery", Some("Wellington")),
        ];
        let out = aggregate(input, &cfg());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn empty_fields_act_as_wildcards() {
        let mut second = keyed("Wheel throwing workshop", 2, "Pottery", None);
        second.category = Category::Other;
        second.refresh_id();
        let input = vec![keyed("Pottery class", 1, "pottery", Some("Auckland")), second];
        let out = aggregate(input, &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].city.as_deref(), Some("Auckland"));
        assert_eq!(out[0].messages.len(), 2);
    }

    #[test]
    fn missing_media_key_never_field_merges() {
        let input = vec![activity("Pottery class", 1), activity("Kayak trip", 2)];
        assert_eq!(aggregate(input, &cfg()).len(), 2);
    }

    #[test]
    fn media_key_on_one_side_only_is_not_a_wildcard() {
        let a = keyed("Pottery class", 1, "pottery", Some("Auckland"));
        let mut b = activity("Clay workshop", 2);
        b.city = Some("Auckland".into());
        b.refresh_id();
        assert!(!is_duplicate(&a, &b, &cfg()));
        assert!(!is_duplicate(&b, &a, &cfg()));
        assert_eq!(aggregate(vec![a, b], &cfg()).len(), 2);
    }

    #[test]
    fn grouping_agrees_with_pairwise_duplicate_test() {
        let input = vec![
            activity("Night Market!", 1),
            keyed("Kayak trip", 2, "kayak", Some("Auckland")),
            activity("night markets", 3),
            keyed("Sea kayaking", 4, "Kayak", None),
            activity("Stargazing", 5),
        ];
        for i in 0..input.len() {
            for j in (i + 1)..input.len() {
                let expected = matches!((i, j), (0, 2) | (1, 3));
                assert_eq!(is_duplicate(&input[i], &input[j], &cfg()), expected, "{i} vs {j}");
            }
        }
        let out = aggregate(input, &cfg());
        let titles: Vec<_> = out.iter().map(|a| a.activity.as_str()).collect();
        assert_eq!(titles, vec!["Night Market!", "Kayak trip", "Stargazing"]);
        assert_eq!(out[0].messages.len(), 2);
        assert_eq!(out[1].messages.len(), 2);
    }

    #[test]
    fn differing_categories_block_field_merge() {
        let mut second = keyed("Clay night", 2, "pottery", None);
        second.category = Category::Nightlife;
        let input = vec![keyed("Pottery class", 1, "pottery", None), second];
        assert_eq!(aggregate(input, &cfg()).len(), 2);
    }

    #[test]
    fn compound_activities_only_merge_on_title() {
        let mut a = keyed("Beach day and bbq", 1, "beach", None);
        a.is_compound = true;
        let b = keyed("Beach volleyball", 2, "beach", None);
        let mut c = keyed("beach day and BBQ", 3, "beach", None);
        c.is_compound = true;

        let out = aggregate(vec![a, b, c], &cfg());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].messages.len(), 2);
        assert_eq!(out[1].activity, "Beach volleyball");
    }

    #[test]
    fn grouping_is_transitive() {
        // a~b by title, b~c by fields, a and c share nothing directly.
        let a = activity("Pottery class", 1);
        let b = keyed("pottery classes", 2, "pottery", Some("Auckland"));
        let c = keyed("Clay workshop", 3, "pottery", None);
        assert!(!is_duplicate(&a, &c, &cfg()));

        let out = aggregate(vec![a, b, c], &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].activity, "Pottery class");
        assert_eq!(out[0].messages.len(), 3);
    }

    #[test]
    fn merged_scores_are_rounded_means() {
        let mut input = Vec::new();
        for (i, (fun, int)) in [(0.8, 0.6), (0.6, 0.4), (0.7, 0.5)].into_iter().enumerate() {
            let mut a = activity("pottery class", i as u64 + 1);
            a.fun_score = fun;
            a.interesting_score = int;
            a.score = combined_score(fun, int);
            a.refresh_id();
            input.push(a);
        }
        let out = aggregate(input, &cfg());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].fun_score, 0.7);
        assert_eq!(out[0].interesting_score, 0.5);
        assert_eq!(out[0].score, 0.57);
        assert_eq!(out[0].activity_id, out[0].compute_id());
    }

    #[test]
    fn duplicate_evidence_is_not_repeated() {
        let out = aggregate(
            vec![activity("Zoo trip", 4), activity("zoo trip", 4), activity("Zoo trips", 5)],
            &cfg(),
        );
        let ids: Vec<_> = out[0].messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn output_follows_first_occurrence_and_singletons_are_untouched() {
        let kayak = activity("Kayak trip", 9);
        let expected_id = kayak.activity_id.clone();
        let out = aggregate(
            vec![
                activity("Pottery class", 1),
                kayak,
                activity("pottery class", 2),
            ],
            &cfg(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].activity, "Pottery class");
        assert_eq!(out[1].activity, "Kayak trip");
        assert_eq!(out[1].activity_id, expected_id);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(aggregate(Vec::new(), &cfg()).is_empty());
    }
}
