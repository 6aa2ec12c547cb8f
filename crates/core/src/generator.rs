//! Synthetic student records.
//!
//! Producers obtain work through the [`RecordSource`] trait. The stock source,
//! [`RandomRecords`], draws from a catalogue of names, programmes and courses
//! with a seeded ChaCha8 RNG, so a run is reproducible from its seed.

use crate::error::{Error, Result};
use crate::record::{Record, MAX_MARK, MIN_MARK};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Anything that can hand a producer its next record.
pub trait RecordSource: Send {
    fn next_record(&mut self) -> Result<Record>;
}

/// Catalogue and ranges for random record generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub names: Vec<String>,
    pub programmes: Vec<String>,
    pub courses: Vec<String>,

    /// Fewest courses per record
    pub min_courses: usize,

    /// Most courses per record
    pub max_courses: usize,

    /// Lowest generated mark
    pub min_mark: i32,

    /// Highest generated mark
    pub max_mark: i32,

    /// Fixed text at the start of every student number
    pub id_prefix: String,

    /// Random digits after the prefix, zero-padded
    pub id_digits: u32,
}

/// Longest random digit run an id may carry
pub const MAX_ID_DIGITS: u32 = 18;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            names: strings(&[
                "Lungelo", "Michael", "Aisha", "Sipho", "Nokuthula", "Thabo", "Zanele", "James",
            ]),
            programmes: strings(&["BSc IT", "Computer Science", "BSC", "BEng", "BIT"]),
            courses: strings(&[
                "CSC101", "CSC102", "MAT101", "ENG101", "ACS201", "CSC301", "NET202", "DB301",
            ]),
            min_courses: 2,
            max_courses: 4,
            min_mark: 40,
            max_mark: 95,
            id_prefix: "2024".to_string(),
            id_digits: 5,
        }
    }
}

impl GeneratorConfig {
    /// Socket variant catalogue: six names, four programmes, 3-5 courses,
    /// marks 0-100 and bare 8-digit student numbers.
    pub fn socket_defaults() -> Self {
        Self {
            names: strings(&["Lungelo", "Michael", "Aisha", "Sipho", "Nokuthula", "Thabo"]),
            programmes: strings(&["BSc IT", "Computer Science", "BSC", "BEng"]),
            courses: strings(&["CS101", "CS102", "MATH101", "ENG101", "DS201", "NET301"]),
            min_courses: 3,
            max_courses: 5,
            min_mark: MIN_MARK,
            max_mark: MAX_MARK,
            id_prefix: String::new(),
            id_digits: 8,
        }
    }

    /// Check that every generated record would be valid.
    pub fn validate(&self) -> Result<()> {
        if self.names.is_empty() || self.programmes.is_empty() {
            return Err(Error::Config(
                "generator needs at least one name and one programme".to_string(),
            ));
        }
        if self.min_courses > self.max_courses {
            return Err(Error::Config(format!(
                "min_courses {} exceeds max_courses {}",
                self.min_courses, self.max_courses
            )));
        }
        if self.max_courses > self.courses.len() {
            return Err(Error::Config(format!(
                "max_courses {} exceeds catalogue of {} courses",
                self.max_courses,
                self.courses.len()
            )));
        }
        if self.min_mark > self.max_mark || self.min_mark < MIN_MARK || self.max_mark > MAX_MARK {
            return Err(Error::Config(format!(
                "mark range {}..={} must lie within {}..={}",
                self.min_mark, self.max_mark, MIN_MARK, MAX_MARK
            )));
        }
        if self.id_digits == 0 || self.id_digits > MAX_ID_DIGITS {
            return Err(Error::Config(format!(
                "id_digits {} must lie within 1..={MAX_ID_DIGITS}",
                self.id_digits
            )));
        }
        Ok(())
    }

    fn course_range(&self) -> RangeInclusive<usize> {
        self.min_courses..=self.max_courses
    }

    fn mark_range(&self) -> RangeInclusive<i32> {
        self.min_mark..=self.max_mark
    }
}

/// Seeded random record generator.
#[derive(Debug, Clone)]
pub struct RandomRecords {
    config: GeneratorConfig,
    rng: ChaCha8Rng,
}

impl RandomRecords {
    /// Create a generator; fails if the config could yield invalid records.
    pub fn new(config: GeneratorConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Generate one record.
    pub fn generate(&mut self) -> Result<Record> {
        let config = &self.config;
        let rng = &mut self.rng;

        // validate() guarantees both lists are non-empty
        let name = config.names.choose(rng).cloned().unwrap_or_default();
        let programme = config.programmes.choose(rng).cloned().unwrap_or_default();
        let width = config.id_digits as usize;
        let number = rng.gen_range(0..10u64.pow(config.id_digits));
        let id = format!("{}{number:0width$}", config.id_prefix);

        let count = rng.gen_range(config.course_range());
        let courses: Vec<String> = config.courses.choose_multiple(rng, count).cloned().collect();
        let marks = (0..count).map(|_| rng.gen_range(config.mark_range())).collect();

        Ok(Record::new(name, id, programme, courses, marks)?)
    }
}

impl RecordSource for RandomRecords {
    fn next_record(&mut self) -> Result<Record> {
        self.generate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_determinism() {
        let mut a = RandomRecords::new(GeneratorConfig::default(), 12345).unwrap();
        let mut b = RandomRecords::new(GeneratorConfig::default(), 12345).unwrap();

        for _ in 0..20 {
            assert_eq!(a.generate().unwrap(), b.generate().unwrap());
        }
    }

    #[test]
    fn test_different_seeds() {
        let mut a = RandomRecords::new(GeneratorConfig::default(), 1).unwrap();
        let mut b = RandomRecords::new(GeneratorConfig::default(), 2).unwrap();

        let left: Vec<_> = (0..10).map(|_| a.generate().unwrap()).collect();
        let right: Vec<_> = (0..10).map(|_| b.generate().unwrap()).collect();
        assert_ne!(left, right);
    }

    #[test]
    fn test_records_respect_config() {
        let config = GeneratorConfig::default();
        let mut source = RandomRecords::new(config.clone(), 42).unwrap();

        for _ in 0..200 {
            let record = source.next_record().unwrap();
            let courses = record.courses();

            assert!(config.names.iter().any(|n| n == record.name()));
            assert!(config.programmes.iter().any(|p| p == record.programme()));
            assert!(record.id().starts_with("2024"));
            assert_eq!(record.id().len(), 9);
            assert!((2..=4).contains(&courses.len()));

            let distinct: HashSet<_> = courses.iter().map(|c| c.course.as_str()).collect();
            assert_eq!(distinct.len(), courses.len());
            assert!(courses.iter().all(|c| (40..=95).contains(&c.mark)));
        }
    }

    #[test]
    fn test_socket_defaults() {
        let config = GeneratorConfig::socket_defaults();
        assert_eq!(config.names.len(), 6);
        assert_eq!(config.programmes.len(), 4);
        assert_eq!(config.courses, ["CS101", "CS102", "MATH101", "ENG101", "DS201", "NET301"]);

        let mut source = RandomRecords::new(config.clone(), 7).unwrap();
        for _ in 0..100 {
            let record = source.generate().unwrap();
            assert!((3..=5).contains(&record.courses().len()));
            assert_eq!(record.id().len(), 8);
            assert!(record.id().bytes().all(|b| b.is_ascii_digit()));
            assert!(config.names.iter().any(|n| n == record.name()));
            assert!(record.courses().iter().all(|c| config.courses.contains(&c.course)));
        }
    }

    #[test]
    fn test_id_digits_are_zero_padded() {
        let config = GeneratorConfig {
            id_prefix: "S".to_string(),
            id_digits: 1,
            ..GeneratorConfig::default()
        };
        let mut source = RandomRecords::new(config, 5).unwrap();
        let ids: HashSet<_> = (0..200)
            .map(|_| source.generate().unwrap().id().to_string())
            .collect();

        assert!(ids.iter().all(|id| id.len() == 2 && id.starts_with('S')));
        assert!(ids.len() > 1);
    }

    #[test]
    fn test_invalid_configs() {
        let too_many = GeneratorConfig {
            max_courses: 9,
            ..GeneratorConfig::default()
        };
        assert!(RandomRecords::new(too_many, 0).is_err());

        let bad_marks = GeneratorConfig {
            max_mark: 101,
            ..GeneratorConfig::default()
        };
        assert!(RandomRecords::new(bad_marks, 0).is_err());

        let no_names = GeneratorConfig {
            names: vec![],
            ..GeneratorConfig::default()
        };
        assert!(RandomRecords::new(no_names, 0).is_err());

        for id_digits in [0, MAX_ID_DIGITS + 1] {
            let bad_ids = GeneratorConfig {
                id_digits,
                ..GeneratorConfig::default()
            };
            assert!(RandomRecords::new(bad_ids, 0).is_err());
        }
    }
}
