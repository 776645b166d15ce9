//! Pairing of source objects with target objects.
//!
//! Matching runs as a list of passes, strictest first. Each pass only looks
//! at objects that no earlier pass has paired, so an exact name match always
//! wins over a guessed rename.

/// Source/target pairs plus whatever is left on either side.
#[derive(Debug)]
pub(crate) struct Pairing<'a, T> {
    /// `(source, target)`, in target order.
    pub(crate) pairs: Vec<(&'a T, &'a T)>,
    /// Unpaired source objects, in source order.
    pub(crate) removed: Vec<&'a T>,
    /// Unpaired target objects, in target order.
    pub(crate) added: Vec<&'a T>,
}

#[derive(Debug)]
pub(crate) struct Matcher<'a, T> {
    source: Vec<&'a T>,
    target: Vec<&'a T>,
    source_paired: Vec<bool>,
    /// Target index -> source index.
    paired: Vec<Option<usize>>,
}

impl<'a, T> Matcher<'a, T> {
    pub(crate) fn new(source: Vec<&'a T>, target: Vec<&'a T>) -> Self {
        Self {
            source_paired: vec![false; source.len()],
            paired: vec![None; target.len()],
            source,
            target,
        }
    }

    fn open_targets(&self) -> Vec<usize> {
        (0..self.target.len())
            .filter(|&t| self.paired[t].is_none())
            .collect()
    }

    fn open_sources(&self) -> Vec<usize> {
        (0..self.source.len())
            .filter(|&s| !self.source_paired[s])
            .collect()
    }

    fn link(&mut self, source: usize, target: usize) {
        self.source_paired[source] = true;
        self.paired[target] = Some(source);
    }

    /// Pair every open target with the first open source accepted by `matches`.
    pub(crate) fn pass(&mut self, matches: impl Fn(&T, &T) -> bool) -> &mut Self {
        for t in self.open_targets() {
            let found = (0..self.source.len())
                .find(|&s| !self.source_paired[s] && matches(self.source[s], self.target[t]));
            if let Some(s) = found {
                self.link(s, t);
            }
        }
        self
    }

    /// Pair objects only when each is the other's sole candidate.
    pub(crate) fn pass_unique(&mut self, matches: impl Fn(&T, &T) -> bool) -> &mut Self {
        let sources = self.open_sources();
        let targets = self.open_targets();

        let candidates: Vec<(usize, usize)> = targets
            .iter()
            .flat_map(|&t| sources.iter().map(move |&s| (s, t)))
            .filter(|&(s, t)| matches(self.source[s], self.target[t]))
            .collect();

        for &(s, t) in &candidates {
            let per_source = candidates.iter().filter(|(cs, _)| *cs == s).count();
            let per_target = candidates.iter().filter(|(_, ct)| *ct == t).count();
            if per_source == 1 && per_target == 1 {
                self.link(s, t);
            }
        }
        self
    }

    /// Pair the highest-scoring open objects first, ignoring scores below
    /// `threshold`. Ties go to the earlier target, then the earlier source.
    pub(crate) fn pass_scored(&mut self, score: impl Fn(&T, &T) -> f64, threshold: f64) -> &mut Self {
        let sources = self.open_sources();
        let mut scored: Vec<(f64, usize, usize)> = self
            .open_targets()
            .into_iter()
            .flat_map(|t| sources.iter().map(move |&s| (s, t)))
            .map(|(s, t)| (score(self.source[s], self.target[t]), t, s))
            .filter(|(value, _, _)| *value >= threshold)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        for (_, t, s) in scored {
            if self.paired[t].is_none() && !self.source_paired[s] {
                self.link(s, t);
            }
        }
        self
    }

    pub(crate) fn finish(self) -> Pairing<'a, T> {
        let mut pairs = Vec::new();
        let mut added = Vec::new();
        for (t, target) in self.target.iter().enumerate() {
            match self.paired[t] {
                Some(s) => pairs.push((self.source[s], *target)),
                None => added.push(*target),
            }
        }

        let removed = self
            .source
            .iter()
            .zip(&self.source_paired)
            .filter(|(_, paired)| !**paired)
            .map(|(s, _)| *s)
            .collect();

        Pairing {
            pairs,
            removed,
            added,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs<'a>(items: &'a [&'a str]) -> Vec<&'a &'a str> {
        items.iter().collect()
    }

    #[test]
    fn test_exact_pass_before_loose_pass() {
        let source = ["Users", "users"];
        let target = ["users"];
        let mut matcher = Matcher::new(strs(&source), strs(&target));
        matcher
            .pass(|s, t| s == t)
            .pass(|s, t| s.eq_ignore_ascii_case(t));
        let pairing = matcher.finish();

        assert_eq!(pairing.pairs, vec![(&"users", &"users")]);
        assert_eq!(pairing.removed, vec![&"Users"]);
        assert!(pairing.added.is_empty());
    }

    #[test]
    fn test_unique_pass_skips_ambiguity() {
        let source = ["a1", "a2", "b1"];
        let target = ["a9", "b9"];
        let mut matcher = Matcher::new(strs(&source), strs(&target));
        matcher.pass_unique(|s, t| s[..1] == t[..1]);
        let pairing = matcher.finish();

        assert_eq!(pairing.pairs, vec![(&"b1", &"b9")]);
        assert_eq!(pairing.removed, vec![&"a1", &"a2"]);
        assert_eq!(pairing.added, vec![&"a9"]);
    }

    #[test]
    fn test_scored_pass_prefers_best_match() {
        let source = ["abcd", "abxx"];
        let target = ["abcz"];
        let mut matcher = Matcher::new(strs(&source), strs(&target));
        matcher.pass_scored(
            |s, t| s.chars().zip(t.chars()).filter(|(a, b)| a == b).count() as f64 / 4.0,
            0.5,
        );
        let pairing = matcher.finish();

        assert_eq!(pairing.pairs, vec![(&"abcd", &"abcz")]);
    }

    #[test]
    fn test_scored_pass_respects_threshold() {
        let source = ["abcd"];
        let target = ["wxyz"];
        let mut matcher = Matcher::new(strs(&source), strs(&target));
        matcher.pass_scored(|_, _| 0.2, 0.5);
        let pairing = matcher.finish();

        assert!(pairing.pairs.is_empty());
        assert_eq!(pairing.removed.len(), 1);
        assert_eq!(pairing.added.len(), 1);
    }
}
