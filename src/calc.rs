use crate::model::{MarkRecord, SequenceId, Student, Subject, TermId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Results are normalised onto a 0–20 scale.
pub const SCALE: f64 = 20.0;

/// Default pass threshold on the 0–20 scale.
pub const PASSING_MARK: f64 = 10.0;

/// Display policy for averages: truncate (toward zero) to two decimals,
/// never round. `13.9969` shows as `"13.99"`, `-0.005` as `"-0.00"`.
pub fn truncate_2_decimals(x: f64) -> String {
    if !x.is_finite() {
        return "0.00".to_string();
    }
    // Ten fixed decimals absorb representation error (13.99 is stored as
    // 13.98999...) without carrying a true value past the cent boundary.
    let digits = format!("{:.10}", x.abs());
    let cut = match digits.find('.') {
        Some(dot) => &digits[..dot + 3],
        None => digits.as_str(),
    };
    let sign = if x < 0.0 { "-" } else { "" };
    format!("{}{}", sign, cut)
}

/// Raw mark as entered, without trailing zeros (`12`, `12.5`).
pub fn format_mark(v: f64) -> String {
    format!("{}", v)
}

/// Read-only snapshot the aggregation functions work from.
#[derive(Debug, Clone, Copy)]
pub struct Gradebook<'a> {
    pub students: &'a [Student],
    pub subjects: &'a [Subject],
    pub marks: &'a HashMap<String, MarkRecord>,
}

impl<'a> Gradebook<'a> {
    fn record(&self, student_id: &str) -> Option<&'a MarkRecord> {
        self.marks.get(student_id)
    }

    fn mark_or_zero(&self, student_id: &str, seq: SequenceId, subject: &str) -> f64 {
        self.record(student_id)
            .and_then(|r| r.mark(seq, subject))
            .unwrap_or(0.0)
    }

    /// Whether any student has at least one entered mark in `seq`.
    pub fn sequence_has_entries(&self, seq: SequenceId) -> bool {
        self.students.iter().any(|s| {
            self.record(&s.id)
                .map(|r| r.has_entries(seq))
                .unwrap_or(false)
        })
    }
}

/// Row of a sequence or term result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRow {
    pub student_id: String,
    pub student: String,
    pub total_marks: f64,
    pub average: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualRow {
    pub student_id: String,
    pub student: String,
    pub first_term_average: f64,
    pub second_term_average: f64,
    pub third_term_average: f64,
    pub final_average: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub class_average: f64,
    pub pass_percentage: f64,
    pub class_size: usize,
    pub passed_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_student: Option<String>,
}

/// Ranked rows plus the class-level statistics derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet<R> {
    pub rows: Vec<R>,
    pub stats: ClassStatistics,
}

impl<R: Ranked> ResultSet<R> {
    pub fn row_for(&self, student_id: &str) -> Option<&R> {
        self.rows.iter().find(|r| r.student_id() == student_id)
    }
}

pub trait Ranked {
    fn ranking_key(&self) -> f64;
    fn set_rank(&mut self, rank: usize);
    fn student_id(&self) -> &str;
    fn student_name(&self) -> &str;
}

impl Ranked for PerformanceRow {
    fn ranking_key(&self) -> f64 {
        self.average
    }
    fn set_rank(&mut self, rank: usize) {
        self.rank = rank;
    }
    fn student_id(&self) -> &str {
        &self.student_id
    }
    fn student_name(&self) -> &str {
        &self.student
    }
}

impl Ranked for AnnualRow {
    fn ranking_key(&self) -> f64 {
        self.final_average
    }
    fn set_rank(&mut self, rank: usize) {
        self.rank = rank;
    }
    fn student_id(&self) -> &str {
        &self.student_id
    }
    fn student_name(&self) -> &str {
        &self.student
    }
}

/// Statistics are taken over rows in roster order, then rows are stably
/// sorted by descending key and ranked 1..n. Equal keys keep roster order and
/// still get distinct sequential ranks.
fn rank_and_summarize<R: Ranked>(mut rows: Vec<R>, passing_mark: f64) -> ResultSet<R> {
    let class_size = rows.len();
    let sum: f64 = rows.iter().map(|r| r.ranking_key()).sum();
    let passed_count = rows
        .iter()
        .filter(|r| r.ranking_key() >= passing_mark)
        .count();
    let (class_average, pass_percentage) = if class_size > 0 {
        (
            sum / class_size as f64,
            100.0 * passed_count as f64 / class_size as f64,
        )
    } else {
        (0.0, 0.0)
    };

    rows.sort_by(|a, b| b.ranking_key().total_cmp(&a.ranking_key()));
    for (i, row) in rows.iter_mut().enumerate() {
        row.set_rank(i + 1);
    }
    let top_student = rows.first().map(|r| r.student_name().to_string());

    ResultSet {
        rows,
        stats: ClassStatistics {
            class_average,
            pass_percentage,
            class_size,
            passed_count,
            top_student,
        },
    }
}

fn performance_rows(book: &Gradebook<'_>, sequences: &[SequenceId]) -> Option<Vec<PerformanceRow>> {
    if book.students.is_empty() || book.subjects.is_empty() {
        return None;
    }
    let total_possible: f64 = book
        .subjects
        .iter()
        .map(|s| s.total * sequences.len() as f64)
        .sum();
    if !(total_possible > 0.0) {
        return None;
    }

    let rows = book
        .students
        .iter()
        .map(|student| {
            let mut total_marks = 0.0_f64;
            for subject in book.subjects {
                for seq in sequences {
                    total_marks += book.mark_or_zero(&student.id, *seq, &subject.name);
                }
            }
            PerformanceRow {
                student_id: student.id.clone(),
                student: student.name.clone(),
                total_marks,
                average: (total_marks / total_possible) * SCALE,
                rank: 0,
            }
        })
        .collect();
    Some(rows)
}

/// Sequence result set. `None` when there are no students or no subjects.
pub fn compute_sequence_results(
    book: &Gradebook<'_>,
    seq: SequenceId,
    passing_mark: f64,
) -> Option<ResultSet<PerformanceRow>> {
    let Some(rows) = performance_rows(book, &[seq]) else {
        tracing::debug!(sequence = seq.as_str(), "sequence aggregation skipped: empty roster or subject list");
        return None;
    };
    Some(rank_and_summarize(rows, passing_mark))
}

/// Term result set over the term's two sequences.
///
/// Skipped (`None`) unless each of the two sequences has at least one entered
/// mark somewhere in the class.
pub fn compute_term_results(
    book: &Gradebook<'_>,
    term: TermId,
    passing_mark: f64,
) -> Option<ResultSet<PerformanceRow>> {
    let seqs = term.sequences();
    if let Some(missing) = seqs.iter().find(|s| !book.sequence_has_entries(**s)) {
        tracing::debug!(
            term = term.as_str(),
            missing = missing.as_str(),
            "term aggregation skipped: sequence has no entries"
        );
        return None;
    }
    let Some(rows) = performance_rows(book, &seqs) else {
        tracing::debug!(term = term.as_str(), "term aggregation skipped: empty roster or subject list");
        return None;
    };
    Some(rank_and_summarize(rows, passing_mark))
}

/// Annual result set: mean of the three term averages per student.
///
/// Requires all three term sets to be present and non-empty. Term rows are
/// joined on student id; a student missing from a term set counts as zero
/// for that term.
pub fn compute_annual_results(
    students: &[Student],
    terms: [Option<&ResultSet<PerformanceRow>>; 3],
    passing_mark: f64,
) -> Option<ResultSet<AnnualRow>> {
    let [Some(first), Some(second), Some(third)] = terms else {
        tracing::debug!("annual aggregation skipped: term results missing");
        return None;
    };
    if first.rows.is_empty() || second.rows.is_empty() || third.rows.is_empty() || students.is_empty() {
        tracing::debug!("annual aggregation skipped: empty term results");
        return None;
    }

    let term_average = |set: &ResultSet<PerformanceRow>, term: TermId, student: &Student| {
        match set.row_for(&student.id) {
            Some(row) => row.average,
            None => {
                tracing::warn!(
                    student_id = %student.id,
                    term = term.as_str(),
                    "student missing from term results; using 0"
                );
                0.0
            }
        }
    };

    let rows = students
        .iter()
        .map(|student| {
            let a = term_average(first, TermId::First, student);
            let b = term_average(second, TermId::Second, student);
            let c = term_average(third, TermId::Third, student);
            AnnualRow {
                student_id: student.id.clone(),
                student: student.name.clone(),
                first_term_average: a,
                second_term_average: b,
                third_term_average: c,
                final_average: (a + b + c) / 3.0,
                rank: 0,
            }
        })
        .collect();
    Some(rank_and_summarize(rows, passing_mark))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

/// Entered cells for one sequence over the students × subjects grid.
pub fn sequence_completion(book: &Gradebook<'_>, seq: SequenceId) -> Completion {
    let total = book.students.len() * book.subjects.len();
    let completed = book
        .students
        .iter()
        .map(|st| {
            book.subjects
                .iter()
                .filter(|sub| {
                    book.record(&st.id)
                        .and_then(|r| r.mark(seq, &sub.name))
                        .is_some()
                })
                .count()
        })
        .sum();
    let percentage = if total > 0 {
        100.0 * completed as f64 / total as f64
    } else {
        0.0
    };
    Completion {
        completed,
        total,
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MarkValue;

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.into(),
            name: name.into(),
            sort_order: 0,
            created_at: None,
        }
    }

    fn subject(name: &str, total: f64) -> Subject {
        Subject {
            id: name.to_ascii_lowercase(),
            name: name.into(),
            total,
            sort_order: 0,
            created_at: None,
        }
    }

    fn set(marks: &mut HashMap<String, MarkRecord>, sid: &str, seq: SequenceId, subject: &str, v: f64) {
        marks
            .entry(sid.to_string())
            .or_default()
            .slot_mut(seq)
            .insert(subject.to_string(), MarkValue::Score(v));
    }

    fn scenario() -> (Vec<Student>, Vec<Subject>, HashMap<String, MarkRecord>) {
        let students = vec![student("s1", "S1"), student("s2", "S2"), student("s3", "S3")];
        let subjects = vec![subject("Math", 20.0), subject("Eng", 20.0)];
        let mut marks = HashMap::new();
        for (sid, m, e) in [("s1", 18.0, 14.0), ("s2", 10.0, 8.0), ("s3", 5.0, 4.0)] {
            set(&mut marks, sid, SequenceId::First, "Math", m);
            set(&mut marks, sid, SequenceId::First, "Eng", e);
        }
        (students, subjects, marks)
    }

    #[test]
    fn truncation_never_rounds() {
        assert_eq!(truncate_2_decimals(13.9969), "13.99");
        assert_eq!(truncate_2_decimals(13.996), "13.99");
        assert_eq!(truncate_2_decimals(-0.005), "-0.00");
        assert_eq!(truncate_2_decimals(13.99), "13.99");
        assert_eq!(truncate_2_decimals(9.8333333), "9.83");
        assert_eq!(truncate_2_decimals(16.0), "16.00");
        assert_eq!(truncate_2_decimals(-2.759), "-2.75");
        assert_eq!(truncate_2_decimals(f64::NAN), "0.00");
        assert_eq!(truncate_2_decimals(13.9999999995), "13.99");
        assert_eq!(truncate_2_decimals(19.999999999), "19.99");
        assert_eq!(truncate_2_decimals(0.29), "0.29");
        assert_eq!(truncate_2_decimals(20.0), "20.00");
        // Standard rounding would show 14.00 here.
        assert_eq!(format!("{:.2}", 13.9969_f64), "14.00");
    }

    #[test]
    fn sequence_example_scenario() {
        let (students, subjects, marks) = scenario();
        let book = Gradebook {
            students: &students,
            subjects: &subjects,
            marks: &marks,
        };
        let res = compute_sequence_results(&book, SequenceId::First, PASSING_MARK).expect("computed");

        let got: Vec<(&str, f64, usize)> = res
            .rows
            .iter()
            .map(|r| (r.student.as_str(), r.average, r.rank))
            .collect();
        assert_eq!(got, vec![("S1", 16.0, 1), ("S2", 9.0, 2), ("S3", 4.5, 3)]);
        assert_eq!(res.rows[0].total_marks, 32.0);
        assert!((res.stats.class_average - 29.5 / 3.0).abs() < 1e-12);
        assert!((res.stats.pass_percentage - 100.0 / 3.0).abs() < 1e-12);
        assert_eq!(res.stats.passed_count, 1);
        assert_eq!(res.stats.class_size, 3);
        assert_eq!(res.stats.top_student.as_deref(), Some("S1"));
    }

    #[test]
    fn ranks_are_monotonic_and_ties_stay_sequential() {
        let students = vec![
            student("a", "A"),
            student("b", "B"),
            student("c", "C"),
            student("d", "D"),
        ];
        let subjects = vec![subject("Math", 20.0)];
        let mut marks = HashMap::new();
        set(&mut marks, "a", SequenceId::Third, "Math", 7.0);
        set(&mut marks, "b", SequenceId::Third, "Math", 15.0);
        set(&mut marks, "c", SequenceId::Third, "Math", 7.0);
        // d has no record at all: counts as zero.
        let book = Gradebook {
            students: &students,
            subjects: &subjects,
            marks: &marks,
        };
        let res = compute_sequence_results(&book, SequenceId::Third, PASSING_MARK).expect("computed");

        for (i, row) in res.rows.iter().enumerate() {
            assert_eq!(row.rank, i + 1);
            if i > 0 {
                assert!(res.rows[i - 1].average >= row.average);
            }
            assert!((0.0..=SCALE).contains(&row.average));
        }
        let order: Vec<&str> = res.rows.iter().map(|r| r.student.as_str()).collect();
        assert_eq!(order, vec!["B", "A", "C", "D"]);
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let (students, subjects, marks) = scenario();
        let book = Gradebook {
            students: &students,
            subjects: &subjects,
            marks: &marks,
        };
        let a = compute_sequence_results(&book, SequenceId::First, PASSING_MARK);
        let b = compute_sequence_results(&book, SequenceId::First, PASSING_MARK);
        assert_eq!(a, b);
    }

    #[test]
    fn sequence_needs_subjects_and_students() {
        let (students, _, marks) = scenario();
        let book = Gradebook {
            students: &students,
            subjects: &[],
            marks: &marks,
        };
        assert!(compute_sequence_results(&book, SequenceId::First, PASSING_MARK).is_none());

        let subjects = vec![subject("Math", 20.0)];
        let empty = Gradebook {
            students: &[],
            subjects: &subjects,
            marks: &marks,
        };
        assert!(compute_sequence_results(&empty, SequenceId::First, PASSING_MARK).is_none());
    }

    #[test]
    fn term_is_skipped_when_one_sequence_is_empty() {
        let students = vec![student("s1", "S1"), student("s2", "S2")];
        let subjects = vec![subject("Math", 20.0), subject("Eng", 10.0)];
        let mut marks = HashMap::new();
        for sid in ["s1", "s2"] {
            set(&mut marks, sid, SequenceId::Second, "Math", 12.0);
            set(&mut marks, sid, SequenceId::Second, "Eng", 6.0);
            marks
                .get_mut(sid)
                .expect("record")
                .slot_mut(SequenceId::First)
                .insert("Math".into(), MarkValue::Empty);
        }
        let book = Gradebook {
            students: &students,
            subjects: &subjects,
            marks: &marks,
        };
        assert!(compute_term_results(&book, TermId::First, PASSING_MARK).is_none());

        set(&mut marks, "s1", SequenceId::First, "Math", 20.0);
        let book = Gradebook {
            students: &students,
            subjects: &subjects,
            marks: &marks,
        };
        let res = compute_term_results(&book, TermId::First, PASSING_MARK).expect("term computed");
        // s1: (20 + 12 + 6) / (2 * 30) * 20
        let s1 = res.row_for("s1").expect("s1 row");
        assert_eq!(s1.total_marks, 38.0);
        assert!((s1.average - 38.0 / 60.0 * 20.0).abs() < 1e-12);
        assert_eq!(s1.rank, 1);
    }

    fn term_set(rows: &[(&str, f64)]) -> ResultSet<PerformanceRow> {
        let rows = rows
            .iter()
            .map(|(id, avg)| PerformanceRow {
                student_id: id.to_string(),
                student: id.to_ascii_uppercase(),
                total_marks: 0.0,
                average: *avg,
                rank: 0,
            })
            .collect();
        rank_and_summarize(rows, PASSING_MARK)
    }

    #[test]
    fn annual_mean_of_three_terms() {
        let students = vec![student("s1", "S1")];
        let t1 = term_set(&[("s1", 16.0)]);
        let t2 = term_set(&[("s1", 12.0)]);
        let t3 = term_set(&[("s1", 8.0)]);
        let res = compute_annual_results(&students, [Some(&t1), Some(&t2), Some(&t3)], PASSING_MARK)
            .expect("annual computed");
        assert_eq!(res.rows[0].final_average, 12.0);
        assert_eq!(res.rows[0].rank, 1);
        assert_eq!(res.stats.pass_percentage, 100.0);
    }

    #[test]
    fn annual_joins_by_id_not_position() {
        let students = vec![student("s1", "S1"), student("s2", "S2")];
        // Ranking reorders s2 ahead of s1 in term one.
        let t1 = term_set(&[("s1", 4.0), ("s2", 18.0)]);
        let t2 = term_set(&[("s1", 10.0), ("s2", 12.0)]);
        let t3 = term_set(&[("s2", 15.0)]);
        assert_eq!(t1.rows[0].student_id, "s2");

        let res = compute_annual_results(&students, [Some(&t1), Some(&t2), Some(&t3)], PASSING_MARK)
            .expect("annual computed");
        let s1 = res.row_for("s1").expect("s1");
        assert_eq!(s1.first_term_average, 4.0);
        assert_eq!(s1.third_term_average, 0.0);
        assert_eq!(s1.final_average, 14.0 / 3.0);
        assert_eq!(res.rows[0].student_id, "s2");
    }

    #[test]
    fn annual_requires_all_terms() {
        let students = vec![student("s1", "S1")];
        let t1 = term_set(&[("s1", 16.0)]);
        assert!(compute_annual_results(&students, [Some(&t1), Some(&t1), None], PASSING_MARK).is_none());
        let empty = term_set(&[]);
        assert!(
            compute_annual_results(&students, [Some(&t1), Some(&empty), Some(&t1)], PASSING_MARK)
                .is_none()
        );
    }

    #[test]
    fn completion_counts_only_present_cells() {
        let (students, subjects, mut marks) = scenario();
        marks
            .get_mut("s3")
            .expect("s3")
            .slot_mut(SequenceId::First)
            .insert("Eng".into(), MarkValue::Empty);
        let book = Gradebook {
            students: &students,
            subjects: &subjects,
            marks: &marks,
        };
        let c = sequence_completion(&book, SequenceId::First);
        assert_eq!((c.completed, c.total), (5, 6));
        assert_eq!(sequence_completion(&book, SequenceId::Second).completed, 0);
    }
}
