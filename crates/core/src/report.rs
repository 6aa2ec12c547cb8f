//! Human-readable report for a processed record.

use crate::record::Record;
use parking_lot::Mutex;
use std::fmt::Write;
use std::sync::Arc;

const RULE_WIDTH: usize = 50;

fn verdict(passed: bool) -> &'static str {
    if passed {
        "PASS"
    } else {
        "FAIL"
    }
}

/// Render the report for `record`, read from the source named `label`.
///
/// Each course gets its own PASS/FAIL against `threshold`, followed by the
/// average and the overall result.
pub fn render(label: &str, record: &Record, threshold: f64) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "PROCESSED: {label}");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "Name: {}", record.name());
    let _ = writeln!(out, "Student ID: {}", record.id());
    let _ = writeln!(out, "Programme: {}", record.programme());
    let _ = writeln!(out);
    let _ = writeln!(out, "Courses and Marks:");
    for result in record.courses() {
        let _ = writeln!(
            out,
            "  {}: {:3} [{}]",
            result.course,
            result.mark,
            verdict(result.passed(threshold))
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Average: {:.2}", record.average());
    let _ = writeln!(out, "Overall Result: {}", verdict(record.passed(threshold)));
    let _ = writeln!(out, "{rule}");
    out
}

/// Destination for processed records.
pub trait RecordSink: Send {
    fn accept(&mut self, label: &str, record: &Record);
}

/// Prints every report to stdout.
#[derive(Debug, Clone, Copy)]
pub struct StdoutSink {
    pub threshold: f64,
}

impl RecordSink for StdoutSink {
    fn accept(&mut self, label: &str, record: &Record) {
        println!("\n{}", render(label, record, self.threshold));
    }
}

/// Keeps processed records in memory. Clones share the same list, so a
/// caller can keep one handle while a consumer thread owns another.
#[derive(Debug, Default, Clone)]
pub struct CollectSink {
    records: Arc<Mutex<Vec<(String, Record)>>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything accepted so far, in arrival order.
    pub fn records(&self) -> Vec<(String, Record)> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RecordSink for CollectSink {
    fn accept(&mut self, label: &str, record: &Record) {
        self.records.lock().push((label.to_string(), record.clone()));
    }
}

impl<S: RecordSink + ?Sized> RecordSink for Box<S> {
    fn accept(&mut self, label: &str, record: &Record) {
        (**self).accept(label, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let record = Record::new(
            "Ada",
            "S1",
            "BSc IT",
            vec!["C1".to_string(), "C2".to_string()],
            vec![45, 80],
        )
        .unwrap();

        let text = render("student001.json", &record, 50.0);

        assert!(text.contains("PROCESSED: student001.json"));
        assert!(text.contains("Name: Ada"));
        assert!(text.contains("Student ID: S1"));
        assert!(text.contains("Programme: BSc IT"));
        assert!(text.contains("  C1:  45 [FAIL]"));
        assert!(text.contains("  C2:  80 [PASS]"));
        assert!(text.contains("Average: 62.50"));
        assert!(text.contains("Overall Result: PASS"));
    }

    #[test]
    fn test_render_threshold() {
        let record = Record::new("Ada", "S1", "BSc IT", vec!["C1".to_string()], vec![60]).unwrap();
        let text = render("x", &record, 70.0);
        assert!(text.contains("[FAIL]"));
        assert!(text.contains("Overall Result: FAIL"));
    }

    #[test]
    fn test_collect_sink_shares_records() {
        let record = Record::new("Ada", "S1", "BSc IT", vec![], vec![]).unwrap();
        let handle = CollectSink::new();
        let mut sink: Box<dyn RecordSink> = Box::new(handle.clone());

        sink.accept("a", &record);
        sink.accept("b", &record);

        assert_eq!(handle.len(), 2);
        assert_eq!(handle.records()[1], ("b".to_string(), record));
    }
}
