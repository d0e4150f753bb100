use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// One of the six grading periods of a school year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SequenceId {
    #[serde(rename = "firstSequence")]
    First,
    #[serde(rename = "secondSequence")]
    Second,
    #[serde(rename = "thirdSequence")]
    Third,
    #[serde(rename = "fourthSequence")]
    Fourth,
    #[serde(rename = "fifthSequence")]
    Fifth,
    #[serde(rename = "sixthSequence")]
    Sixth,
}

impl SequenceId {
    pub const ALL: [SequenceId; 6] = [
        SequenceId::First,
        SequenceId::Second,
        SequenceId::Third,
        SequenceId::Fourth,
        SequenceId::Fifth,
        SequenceId::Sixth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SequenceId::First => "firstSequence",
            SequenceId::Second => "secondSequence",
            SequenceId::Third => "thirdSequence",
            SequenceId::Fourth => "fourthSequence",
            SequenceId::Fifth => "fifthSequence",
            SequenceId::Sixth => "sixthSequence",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// Terms are fixed pairs: {1,2}, {3,4}, {5,6}.
    pub fn term(self) -> TermId {
        match self {
            SequenceId::First | SequenceId::Second => TermId::First,
            SequenceId::Third | SequenceId::Fourth => TermId::Second,
            SequenceId::Fifth | SequenceId::Sixth => TermId::Third,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TermId {
    #[serde(rename = "firstTerm")]
    First,
    #[serde(rename = "secondTerm")]
    Second,
    #[serde(rename = "thirdTerm")]
    Third,
}

impl TermId {
    pub const ALL: [TermId; 3] = [TermId::First, TermId::Second, TermId::Third];

    pub fn as_str(self) -> &'static str {
        match self {
            TermId::First => "firstTerm",
            TermId::Second => "secondTerm",
            TermId::Third => "thirdTerm",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == raw)
    }

    pub fn index(self) -> usize {
        match self {
            TermId::First => 0,
            TermId::Second => 1,
            TermId::Third => 2,
        }
    }

    pub fn sequences(self) -> [SequenceId; 2] {
        match self {
            TermId::First => [SequenceId::First, SequenceId::Second],
            TermId::Second => [SequenceId::Third, SequenceId::Fourth],
            TermId::Third => [SequenceId::Fifth, SequenceId::Sixth],
        }
    }
}

/// A single cell of a sequence map. `Empty` is the "not yet entered" state,
/// stored as `""` and never confused with a score of zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkValue {
    Empty,
    Score(f64),
}

impl MarkValue {
    pub fn score(self) -> Option<f64> {
        match self {
            MarkValue::Empty => None,
            MarkValue::Score(v) => Some(v),
        }
    }

    pub fn is_present(self) -> bool {
        matches!(self, MarkValue::Score(_))
    }
}

impl Serialize for MarkValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MarkValue::Empty => serializer.serialize_str(""),
            MarkValue::Score(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for MarkValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Number(f64),
            Text(String),
        }

        Ok(match Option::<Stored>::deserialize(deserializer)? {
            Some(Stored::Number(v)) if v.is_finite() => MarkValue::Score(v),
            Some(Stored::Text(t)) => match t.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => MarkValue::Score(v),
                _ => MarkValue::Empty,
            },
            _ => MarkValue::Empty,
        })
    }
}

/// Validate an edit coming from the marks grid.
///
/// Returns `None` when the edit must be ignored: non-numeric input, a value
/// that is not finite, negative, or above `max_total`. Blank input is always
/// accepted and clears the cell.
pub fn parse_mark_input(raw: &str, max_total: f64) -> Option<MarkValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(MarkValue::Empty);
    }
    let v: f64 = trimmed.parse().ok()?;
    if !v.is_finite() || v < 0.0 || !(v <= max_total) {
        return None;
    }
    Some(MarkValue::Score(v))
}

pub type SequenceMarks = BTreeMap<String, MarkValue>;

/// Per-student marks, one subject map per sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkRecord {
    pub first_sequence: SequenceMarks,
    pub second_sequence: SequenceMarks,
    pub third_sequence: SequenceMarks,
    pub fourth_sequence: SequenceMarks,
    pub fifth_sequence: SequenceMarks,
    pub sixth_sequence: SequenceMarks,
}

impl MarkRecord {
    pub fn slot(&self, seq: SequenceId) -> &SequenceMarks {
        match seq {
            SequenceId::First => &self.first_sequence,
            SequenceId::Second => &self.second_sequence,
            SequenceId::Third => &self.third_sequence,
            SequenceId::Fourth => &self.fourth_sequence,
            SequenceId::Fifth => &self.fifth_sequence,
            SequenceId::Sixth => &self.sixth_sequence,
        }
    }

    pub fn slot_mut(&mut self, seq: SequenceId) -> &mut SequenceMarks {
        match seq {
            SequenceId::First => &mut self.first_sequence,
            SequenceId::Second => &mut self.second_sequence,
            SequenceId::Third => &mut self.third_sequence,
            SequenceId::Fourth => &mut self.fourth_sequence,
            SequenceId::Fifth => &mut self.fifth_sequence,
            SequenceId::Sixth => &mut self.sixth_sequence,
        }
    }

    /// Present score for a subject, `None` for missing or empty cells.
    pub fn mark(&self, seq: SequenceId, subject: &str) -> Option<f64> {
        self.slot(seq).get(subject).and_then(|v| v.score())
    }

    pub fn has_entries(&self, seq: SequenceId) -> bool {
        self.slot(seq).values().any(|v| v.is_present())
    }

    /// Drop a subject from all six sequences. Returns whether anything changed.
    pub fn strip_subject(&mut self, subject: &str) -> bool {
        let mut changed = false;
        for seq in SequenceId::ALL {
            changed |= self.slot_mut(seq).remove(subject).is_some();
        }
        changed
    }

    pub fn rename_subject(&mut self, from: &str, to: &str) -> bool {
        let mut changed = false;
        for seq in SequenceId::ALL {
            let slot = self.slot_mut(seq);
            if let Some(v) = slot.remove(from) {
                slot.insert(to.to_string(), v);
                changed = true;
            }
        }
        changed
    }

    pub fn highest_score(&self, subject: &str) -> Option<f64> {
        SequenceId::ALL
            .into_iter()
            .filter_map(|seq| self.mark(seq, subject))
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
    }
}

/// Free-text remarks of one student, keyed by sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentRecord(pub BTreeMap<SequenceId, String>);

impl CommentRecord {
    pub fn get(&self, seq: SequenceId) -> Option<&str> {
        self.0.get(&seq).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub total: f64,
    #[serde(default)]
    pub sort_order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mark_input_validation() {
        assert_eq!(parse_mark_input("", 20.0), Some(MarkValue::Empty));
        assert_eq!(parse_mark_input("  ", 20.0), Some(MarkValue::Empty));
        assert_eq!(parse_mark_input("12.5", 20.0), Some(MarkValue::Score(12.5)));
        assert_eq!(parse_mark_input("0", 20.0), Some(MarkValue::Score(0.0)));
        assert_eq!(parse_mark_input("20", 20.0), Some(MarkValue::Score(20.0)));
        assert_eq!(parse_mark_input("20.01", 20.0), None);
        assert_eq!(parse_mark_input("-1", 20.0), None);
        assert_eq!(parse_mark_input("abc", 20.0), None);
        assert_eq!(parse_mark_input("NaN", 20.0), None);
        assert_eq!(parse_mark_input("inf", 20.0), None);
    }

    #[test]
    fn mark_record_keeps_empty_sentinel_distinct_from_zero() {
        let rec: MarkRecord = serde_json::from_value(json!({
            "firstSequence": { "Math": 0, "Eng": "", "Bio": "14" }
        }))
        .expect("decode");
        assert_eq!(rec.mark(SequenceId::First, "Math"), Some(0.0));
        assert_eq!(rec.mark(SequenceId::First, "Eng"), None);
        assert_eq!(rec.mark(SequenceId::First, "Bio"), Some(14.0));
        assert!(rec.second_sequence.is_empty());

        let back = serde_json::to_value(&rec).expect("encode");
        assert_eq!(back["firstSequence"]["Eng"], json!(""));
        assert_eq!(back["firstSequence"]["Math"], json!(0.0));
    }

    #[test]
    fn strip_and_rename_touch_every_sequence() {
        let mut rec = MarkRecord::default();
        rec.slot_mut(SequenceId::First)
            .insert("Math".into(), MarkValue::Score(3.0));
        rec.slot_mut(SequenceId::Sixth)
            .insert("Math".into(), MarkValue::Score(17.0));

        assert_eq!(rec.highest_score("Math"), Some(17.0));
        assert!(rec.rename_subject("Math", "Maths"));
        assert_eq!(rec.mark(SequenceId::Sixth, "Maths"), Some(17.0));
        assert!(rec.strip_subject("Maths"));
        assert!(!rec.has_entries(SequenceId::First));
        assert!(!rec.strip_subject("Maths"));
    }

    #[test]
    fn sequences_map_onto_fixed_terms() {
        assert_eq!(SequenceId::Second.term(), TermId::First);
        assert_eq!(SequenceId::Third.term(), TermId::Second);
        assert_eq!(SequenceId::Sixth.term(), TermId::Third);
        assert_eq!(
            TermId::Second.sequences(),
            [SequenceId::Third, SequenceId::Fourth]
        );
        assert_eq!(SequenceId::parse("fifthSequence"), Some(SequenceId::Fifth));
        assert_eq!(SequenceId::parse("seventhSequence"), None);
    }
}
