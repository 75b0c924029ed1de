//! Bounded scramble sequences and the scramble source interface.

use std::ops::Deref;

use crate::config::DEFAULT_MAX_COUNT;
use crate::RenderError;

/// Produces scrambles for one puzzle type.
pub trait ScrambleSource {
    fn generate_scrambles(&self, count: usize) -> Vec<String>;

    /// Deterministic scrambles: the same seed yields the same sequence, `offset` skips that many
    /// scrambles of the sequence first.
    fn generate_seeded_scrambles(&self, seed: &str, count: usize, offset: usize) -> Vec<String>;
}

/// An ordered, immutable list of 1..=max scrambles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrambleSet {
    scrambles: Vec<String>,
}

impl ScrambleSet {
    /// Wraps scrambles with the default upper bound of 100.
    pub fn new(scrambles: Vec<String>) -> Result<Self, RenderError> {
        Self::with_max_count(scrambles, DEFAULT_MAX_COUNT)
    }

    pub fn with_max_count(scrambles: Vec<String>, max_count: usize) -> Result<Self, RenderError> {
        if scrambles.is_empty() {
            return Err(RenderError::InvalidRequest {
                message: "no scrambles to render".to_string(),
                suggestion: "Request at least one scramble".to_string(),
            });
        }
        if scrambles.len() > max_count {
            return Err(RenderError::InvalidRequest {
                message: format!(
                    "{} scrambles requested, at most {} are allowed",
                    scrambles.len(),
                    max_count
                ),
                suggestion: format!("Split the sheet into chunks of {} scrambles", max_count),
            });
        }
        Ok(ScrambleSet { scrambles })
    }

    /// Draws scrambles from a source.
    ///
    /// `count` is clamped to `1..=max_count`; with a seed, `offset` is clamped to `max_count`.
    pub fn generate(
        source: &dyn ScrambleSource,
        count: usize,
        seed: Option<(&str, usize)>,
        max_count: usize,
    ) -> Result<Self, RenderError> {
        let count = count.clamp(1, max_count.max(1));
        let scrambles = match seed {
            Some((seed, offset)) => {
                let offset = offset.min(max_count);
                log::debug!(
                    "Generating {} seeded scrambles (seed '{}', offset {})",
                    count,
                    seed,
                    offset
                );
                source.generate_seeded_scrambles(seed, count, offset)
            }
            None => source.generate_scrambles(count),
        };
        Self::with_max_count(scrambles, max_count)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.scrambles
    }

    pub fn into_inner(self) -> Vec<String> {
        self.scrambles
    }
}

impl Deref for ScrambleSet {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.scrambles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CountingSource {
        calls: RefCell<Vec<(Option<String>, usize, usize)>>,
    }

    impl CountingSource {
        fn new() -> Self {
            CountingSource {
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ScrambleSource for CountingSource {
        fn generate_scrambles(&self, count: usize) -> Vec<String> {
            self.calls.borrow_mut().push((None, count, 0));
            (0..count).map(|i| format!("R{}", i)).collect()
        }

        fn generate_seeded_scrambles(&self, seed: &str, count: usize, offset: usize) -> Vec<String> {
            self.calls
                .borrow_mut()
                .push((Some(seed.to_string()), count, offset));
            (offset..offset + count).map(|i| format!("{}-{}", seed, i)).collect()
        }
    }

    #[test]
    fn test_bounds() {
        assert!(ScrambleSet::new(vec![]).is_err());
        assert!(ScrambleSet::new(vec!["R".to_string(); 100]).is_ok());
        assert!(matches!(
            ScrambleSet::new(vec!["R".to_string(); 101]),
            Err(RenderError::InvalidRequest { .. })
        ));
        assert!(ScrambleSet::with_max_count(vec!["R".to_string(); 3], 2).is_err());
    }

    #[test]
    fn test_keeps_order() {
        let set = ScrambleSet::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set[0], "a");
        assert_eq!(set.as_slice(), &["a", "b", "c"]);
    }

    #[test]
    fn test_generate_clamps_count() {
        let source = CountingSource::new();
        let set = ScrambleSet::generate(&source, 500, None, 100).unwrap();
        assert_eq!(set.len(), 100);

        let set = ScrambleSet::generate(&source, 0, None, 100).unwrap();
        assert_eq!(set.len(), 1);

        let calls = source.calls.borrow();
        assert_eq!(calls[0], (None, 100, 0));
        assert_eq!(calls[1], (None, 1, 0));
    }

    #[test]
    fn test_generate_seeded_clamps_offset() {
        let source = CountingSource::new();
        let set = ScrambleSet::generate(&source, 2, Some(("abc", 1000)), 100).unwrap();
        assert_eq!(set.as_slice(), &["abc-100", "abc-101"]);
        assert_eq!(
            source.calls.borrow()[0],
            (Some("abc".to_string()), 2, 100)
        );
    }
}
