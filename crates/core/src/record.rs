//! Student records: the unit of work flowing through the pipeline.
//!
//! A [`Record`] is validated on construction and immutable afterwards. The
//! text form is pretty-printed JSON:
//!
//! ```text
//! {
//!   "name": "Ada",
//!   "id": "S1",
//!   "programme": "BSc IT",
//!   "courses": [
//!     { "course": "C1", "mark": 60 },
//!     { "course": "C2", "mark": 80 }
//!   ]
//! }
//! ```
//!
//! Parsing goes back through the same validation, so no file or socket
//! payload can produce a record that [`Record::new`] would have rejected.

use crate::error::{RecordError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default pass threshold applied to averages and individual marks.
pub const DEFAULT_PASS_THRESHOLD: f64 = 50.0;

/// Lowest valid mark.
pub const MIN_MARK: i32 = 0;

/// Highest valid mark.
pub const MAX_MARK: i32 = 100;

/// One course and the mark obtained in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseResult {
    pub course: String,
    pub mark: i32,
}

impl CourseResult {
    /// Whether this single mark reaches `threshold`.
    pub fn passed(&self, threshold: f64) -> bool {
        f64::from(self.mark) >= threshold
    }
}

/// A validated student record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct Record {
    name: String,
    id: String,
    programme: String,
    courses: Vec<CourseResult>,
}

/// Unvalidated wire shape; only reachable through `TryFrom`.
#[derive(Deserialize)]
struct RawRecord {
    name: String,
    id: String,
    programme: String,
    #[serde(default)]
    courses: Vec<CourseResult>,
}

impl TryFrom<RawRecord> for Record {
    type Error = RecordError;

    fn try_from(raw: RawRecord) -> std::result::Result<Self, Self::Error> {
        let (courses, marks) = raw
            .courses
            .into_iter()
            .map(|c| (c.course, c.mark))
            .unzip();
        Record::new(raw.name, raw.id, raw.programme, courses, marks)
    }
}

impl Record {
    /// Build a record, trimming text fields and validating every invariant.
    ///
    /// # Errors
    /// - `RecordError::EmptyName` / `EmptyId` if either is blank
    /// - `RecordError::LengthMismatch` if `courses.len() != marks.len()`
    /// - `RecordError::MarkOutOfRange` for the first mark outside [0, 100]
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        programme: impl Into<String>,
        courses: Vec<String>,
        marks: Vec<i32>,
    ) -> std::result::Result<Self, RecordError> {
        let name = name.into().trim().to_string();
        let id = id.into().trim().to_string();
        let programme = programme.into().trim().to_string();

        if name.is_empty() {
            return Err(RecordError::EmptyName);
        }
        if id.is_empty() {
            return Err(RecordError::EmptyId);
        }
        if courses.len() != marks.len() {
            return Err(RecordError::LengthMismatch {
                courses: courses.len(),
                marks: marks.len(),
            });
        }

        let courses = courses
            .into_iter()
            .zip(marks)
            .map(|(course, mark)| {
                let course = course.trim().to_string();
                if !(MIN_MARK..=MAX_MARK).contains(&mark) {
                    return Err(RecordError::MarkOutOfRange { course, mark });
                }
                Ok(CourseResult { course, mark })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            id,
            programme,
            courses,
        })
    }

    /// Student's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Student number, as generated.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Degree programme.
    pub fn programme(&self) -> &str {
        &self.programme
    }

    /// Course results in their original order.
    pub fn courses(&self) -> &[CourseResult] {
        &self.courses
    }

    /// Arithmetic mean of all marks, or 0.0 with no courses.
    pub fn average(&self) -> f64 {
        if self.courses.is_empty() {
            return 0.0;
        }
        let total: i64 = self.courses.iter().map(|c| i64::from(c.mark)).sum();
        total as f64 / self.courses.len() as f64
    }

    /// Whether the average reaches `threshold`.
    pub fn passed(&self, threshold: f64) -> bool {
        self.average() >= threshold
    }

    /// Serialize to the pretty-printed text format.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a record from its text format.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Like [`Record::from_text`], for raw bytes (must be UTF-8).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - {}", self.name, self.id, self.programme)
    }
}
