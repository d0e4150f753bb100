use crate::calc::{
    compute_annual_results, compute_sequence_results, compute_term_results, sequence_completion,
    AnnualRow, ClassStatistics, Completion, Gradebook, PerformanceRow, ResultSet,
};
use crate::config::{ConfigPatch, EngineConfig};
use crate::debounce::Debouncer;
use crate::model::{
    parse_mark_input, CommentRecord, MarkRecord, SequenceId, Student, Subject, TermId,
};
use crate::report::{build_payload, PayloadInputs, ReportExtras, ReportPayload, ReportView, Standing};
use crate::store::{Collection, DocKey, DocumentStore, StoreError, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

const QUICK_STATS_ID: &str = "quickStats";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Record whose persistence is deferred.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum WriteKey {
    Marks(String),
    Comments(String),
    QuickStats,
}

impl WriteKey {
    pub fn doc_key(&self) -> DocKey {
        match self {
            WriteKey::Marks(id) => DocKey::new(Collection::Marks, id.as_str()),
            WriteKey::Comments(id) => DocKey::new(Collection::Comments, id.as_str()),
            WriteKey::QuickStats => DocKey::new(Collection::Results, QUICK_STATS_ID),
        }
    }
}

impl fmt::Display for WriteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.doc_key())
    }
}

/// Latest result sets. Each slot is replaced wholesale by a successful
/// computation and left alone by a skipped one.
#[derive(Debug, Clone, Default)]
pub struct CalcResults {
    pub sequence: Option<(SequenceId, ResultSet<PerformanceRow>)>,
    pub terms: [Option<ResultSet<PerformanceRow>>; 3],
    pub annual: Option<ResultSet<AnnualRow>>,
}

impl CalcResults {
    pub fn term(&self, term: TermId) -> Option<&ResultSet<PerformanceRow>> {
        self.terms[term.index()].as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickStat {
    pub class_average: f64,
    pub pass_percentage: f64,
    pub class_size: usize,
}

impl From<&ClassStatistics> for QuickStat {
    fn from(s: &ClassStatistics) -> Self {
        Self {
            class_average: s.class_average,
            pass_percentage: s.pass_percentage,
            class_size: s.class_size,
        }
    }
}

/// Denormalised per-view summary cached for a fast first render. Keys are
/// sequence ids, term ids or `annual`.
pub type QuickStats = BTreeMap<String, QuickStat>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalcOutcome {
    pub computed: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushReport {
    pub written: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeardownReport {
    pub flushed: FlushReport,
    pub dropped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    pub total_students: usize,
    pub total_subjects: usize,
    pub average_subject_total: f64,
}

/// One open workspace: the authoritative in-memory gradebook, its pending
/// writes and the latest computed results.
pub struct Session<S: DocumentStore> {
    store: S,
    config: EngineConfig,
    students: Vec<Student>,
    subjects: Vec<Subject>,
    marks: HashMap<String, MarkRecord>,
    comments: HashMap<String, CommentRecord>,
    active_sequence: SequenceId,
    results: CalcResults,
    quick_stats: QuickStats,
    writes: Debouncer<WriteKey>,
}

fn load_collection<S: DocumentStore, T: DeserializeOwned>(
    store: &S,
    collection: Collection,
) -> Result<Vec<(String, T)>, StoreError> {
    let mut out = Vec::new();
    for (id, body) in store.list(collection)? {
        match serde_json::from_value::<T>(body) {
            Ok(v) => out.push((id, v)),
            Err(e) => warn!(collection = collection.as_str(), %id, error = %e, "skipping unreadable document"),
        }
    }
    Ok(out)
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl<S: DocumentStore> Session<S> {
    pub fn open(store: S) -> Result<Self, StoreError> {
        let config = EngineConfig::load(&store)?;

        let mut students: Vec<Student> = load_collection::<_, Student>(&store, Collection::Students)?
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        students.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));

        let mut subjects: Vec<Subject> = load_collection::<_, Subject>(&store, Collection::Subjects)?
            .into_iter()
            .map(|(_, s)| s)
            .collect();
        subjects.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));

        let marks: HashMap<String, MarkRecord> =
            load_collection::<_, MarkRecord>(&store, Collection::Marks)?
                .into_iter()
                .collect();
        let comments: HashMap<String, CommentRecord> =
            load_collection::<_, CommentRecord>(&store, Collection::Comments)?
                .into_iter()
                .collect();

        let quick_stats = match store.get(&WriteKey::QuickStats.doc_key())? {
            Some(v) => serde_json::from_value(v).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable quick stats");
                QuickStats::new()
            }),
            None => QuickStats::new(),
        };

        info!(
            students = students.len(),
            subjects = subjects.len(),
            "gradebook loaded"
        );

        Ok(Self {
            store,
            config,
            students,
            subjects,
            marks,
            comments,
            active_sequence: SequenceId::First,
            results: CalcResults::default(),
            quick_stats,
            writes: Debouncer::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn update_config(&mut self, patch: &ConfigPatch) -> Result<EngineConfig, SessionError> {
        let next = self.config.apply(patch).map_err(SessionError::InvalidInput)?;
        self.store
            .put(&EngineConfig::doc_key(), &serde_json::to_value(&next).map_err(StoreError::from)?)?;
        self.config = next.clone();
        Ok(next)
    }

    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn student_index(&self, student_id: &str) -> Option<usize> {
        self.students.iter().position(|s| s.id == student_id)
    }

    fn student_at(&self, index: usize) -> Result<&Student, SessionError> {
        self.students
            .get(index)
            .ok_or_else(|| SessionError::NotFound(format!("student #{}", index)))
    }

    fn subject_named(&self, name: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.name == name)
    }

    pub fn create_student(&mut self, name: &str) -> Result<Student, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("student name must not be empty".into()));
        }
        let student = Student {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            sort_order: self.students.iter().map(|s| s.sort_order + 1).max().unwrap_or(0),
            created_at: Some(now_rfc3339()),
        };
        self.store.put(
            &DocKey::new(Collection::Students, student.id.as_str()),
            &serde_json::to_value(&student).map_err(StoreError::from)?,
        )?;
        self.students.push(student.clone());
        Ok(student)
    }

    pub fn rename_student(&mut self, student_id: &str, name: &str) -> Result<Student, SessionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::InvalidInput("student name must not be empty".into()));
        }
        let idx = self
            .student_index(student_id)
            .ok_or_else(|| SessionError::NotFound("student".into()))?;
        let mut next = self.students[idx].clone();
        next.name = name.to_string();
        self.store.put(
            &DocKey::new(Collection::Students, student_id),
            &serde_json::to_value(&next).map_err(StoreError::from)?,
        )?;
        self.students[idx] = next.clone();
        Ok(next)
    }

    /// Removes the student together with its marks and comments documents.
    pub fn delete_student(&mut self, student_id: &str) -> Result<(), SessionError> {
        let idx = self
            .student_index(student_id)
            .ok_or_else(|| SessionError::NotFound("student".into()))?;
        let mut batch = WriteBatch::new();
        batch
            .delete(DocKey::new(Collection::Students, student_id))
            .delete(DocKey::new(Collection::Marks, student_id))
            .delete(DocKey::new(Collection::Comments, student_id));
        self.store.commit(batch)?;

        self.students.remove(idx);
        self.marks.remove(student_id);
        self.comments.remove(student_id);
        self.writes.cancel(&WriteKey::Marks(student_id.to_string()));
        self.writes.cancel(&WriteKey::Comments(student_id.to_string()));
        debug!(student_id, "student deleted");
        Ok(())
    }

    fn check_subject_name(&self, name: &str, except_id: Option<&str>) -> Result<(), SessionError> {
        if name.is_empty() {
            return Err(SessionError::InvalidInput("subject name must not be empty".into()));
        }
        if self
            .subjects
            .iter()
            .any(|s| s.name == name && Some(s.id.as_str()) != except_id)
        {
            return Err(SessionError::Conflict(format!("subject '{}' already exists", name)));
        }
        Ok(())
    }

    fn check_subject_total(total: f64) -> Result<(), SessionError> {
        if !total.is_finite() || total <= 0.0 {
            return Err(SessionError::InvalidInput("subject total must be a positive number".into()));
        }
        Ok(())
    }

    pub fn create_subject(&mut self, name: &str, total: f64) -> Result<Subject, SessionError> {
        let name = name.trim();
        self.check_subject_name(name, None)?;
        Self::check_subject_total(total)?;
        let subject = Subject {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            total,
            sort_order: self.subjects.iter().map(|s| s.sort_order + 1).max().unwrap_or(0),
            created_at: Some(now_rfc3339()),
        };
        self.store.put(
            &DocKey::new(Collection::Subjects, subject.id.as_str()),
            &serde_json::to_value(&subject).map_err(StoreError::from)?,
        )?;
        self.subjects.push(subject.clone());
        Ok(subject)
    }

    /// Rename and/or re-total a subject. A rename moves the subject's key in
    /// every mark record; the subject document and touched mark records are
    /// committed together.
    pub fn update_subject(
        &mut self,
        subject_id: &str,
        name: Option<&str>,
        total: Option<f64>,
    ) -> Result<Subject, SessionError> {
        let idx = self
            .subjects
            .iter()
            .position(|s| s.id == subject_id)
            .ok_or_else(|| SessionError::NotFound("subject".into()))?;
        let current = self.subjects[idx].clone();
        let mut next = current.clone();

        if let Some(name) = name.map(str::trim) {
            self.check_subject_name(name, Some(subject_id))?;
            next.name = name.to_string();
        }
        if let Some(total) = total {
            Self::check_subject_total(total)?;
            let highest = self
                .marks
                .values()
                .filter_map(|r| r.highest_score(&current.name))
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));
            if let Some(highest) = highest {
                if highest > total {
                    return Err(SessionError::Conflict(format!(
                        "existing mark {} exceeds new total {}",
                        highest, total
                    )));
                }
            }
            next.total = total;
        }

        let mut batch = WriteBatch::new();
        batch.put(
            DocKey::new(Collection::Subjects, subject_id),
            serde_json::to_value(&next).map_err(StoreError::from)?,
        );
        let mut migrated: Vec<(String, MarkRecord)> = Vec::new();
        if next.name != current.name {
            for (sid, record) in &self.marks {
                let mut record = record.clone();
                if record.rename_subject(&current.name, &next.name) {
                    batch.put(
                        DocKey::new(Collection::Marks, sid.as_str()),
                        serde_json::to_value(&record).map_err(StoreError::from)?,
                    );
                    migrated.push((sid.clone(), record));
                }
            }
        }
        self.store.commit(batch)?;

        for (sid, record) in migrated {
            // The batch carried the latest record.
            self.writes.cancel(&WriteKey::Marks(sid.clone()));
            self.marks.insert(sid, record);
        }
        self.subjects[idx] = next.clone();
        Ok(next)
    }

    /// Removes the subject and strips its key from all six sequences of every
    /// mark record, committing every mark record in the same batch.
    pub fn delete_subject(&mut self, subject_id: &str) -> Result<(), SessionError> {
        let idx = self
            .subjects
            .iter()
            .position(|s| s.id == subject_id)
            .ok_or_else(|| SessionError::NotFound("subject".into()))?;
        let name = self.subjects[idx].name.clone();

        let mut stripped = self.marks.clone();
        let mut batch = WriteBatch::new();
        batch.delete(DocKey::new(Collection::Subjects, subject_id));
        for (sid, record) in stripped.iter_mut() {
            record.strip_subject(&name);
            batch.put(
                DocKey::new(Collection::Marks, sid.as_str()),
                serde_json::to_value(&*record).map_err(StoreError::from)?,
            );
        }
        self.store.commit(batch)?;

        for sid in stripped.keys() {
            self.writes.cancel(&WriteKey::Marks(sid.clone()));
        }
        self.marks = stripped;
        self.subjects.remove(idx);
        debug!(subject = %name, "subject deleted");
        Ok(())
    }

    /// Deletes every gradebook document except settings.
    pub fn reset(&mut self) -> Result<usize, SessionError> {
        let mut keys: BTreeSet<DocKey> = BTreeSet::new();
        for collection in Collection::ALL
            .into_iter()
            .filter(|c| *c != Collection::Settings)
        {
            for (id, _) in self.store.list(collection)? {
                keys.insert(DocKey::new(collection, id));
            }
        }
        let mut batch = WriteBatch::new();
        for key in &keys {
            batch.delete(key.clone());
        }
        self.store.commit(batch)?;

        let cancelled = self.writes.cancel_all();
        self.students.clear();
        self.subjects.clear();
        self.marks.clear();
        self.comments.clear();
        self.results = CalcResults::default();
        self.quick_stats.clear();
        info!(documents = keys.len(), cancelled, "gradebook reset");
        Ok(keys.len())
    }

    pub fn roster_summary(&self) -> RosterSummary {
        let average_subject_total = if self.subjects.is_empty() {
            0.0
        } else {
            self.subjects.iter().map(|s| s.total).sum::<f64>() / self.subjects.len() as f64
        };
        RosterSummary {
            total_students: self.students.len(),
            total_subjects: self.subjects.len(),
            average_subject_total,
        }
    }

    pub fn active_sequence(&self) -> SequenceId {
        self.active_sequence
    }

    pub fn select_sequence(&mut self, seq: SequenceId) {
        self.active_sequence = seq;
    }

    pub fn mark_record(&self, student_id: &str) -> Option<&MarkRecord> {
        self.marks.get(student_id)
    }

    pub fn comment_record(&self, student_id: &str) -> Option<&CommentRecord> {
        self.comments.get(student_id)
    }

    /// Apply one grid edit to the active sequence.
    ///
    /// Returns `Ok(false)` when the value is rejected; nothing changes and no
    /// write is scheduled. The effective ceiling is the subject total, lowered
    /// further by `max_total` when given.
    pub fn set_mark(
        &mut self,
        student_index: usize,
        subject: &str,
        raw: &str,
        max_total: Option<f64>,
        now: Instant,
    ) -> Result<bool, SessionError> {
        let student_id = self.student_at(student_index)?.id.clone();
        let subject_total = self
            .subject_named(subject)
            .map(|s| s.total)
            .ok_or_else(|| SessionError::NotFound(format!("subject '{}'", subject)))?;
        let ceiling = max_total.map_or(subject_total, |m| m.min(subject_total));

        let Some(value) = parse_mark_input(raw, ceiling) else {
            debug!(%student_id, subject, raw, "mark rejected");
            return Ok(false);
        };
        self.marks
            .entry(student_id.clone())
            .or_default()
            .slot_mut(self.active_sequence)
            .insert(subject.to_string(), value);
        self.writes
            .schedule(WriteKey::Marks(student_id), now, self.config.debounce());
        Ok(true)
    }

    pub fn set_comment(
        &mut self,
        student_index: usize,
        seq: SequenceId,
        text: &str,
        now: Instant,
    ) -> Result<(), SessionError> {
        let student_id = self.student_at(student_index)?.id.clone();
        let record = self.comments.entry(student_id.clone()).or_default();
        if text.trim().is_empty() {
            record.0.remove(&seq);
            if record.0.is_empty() {
                self.comments.remove(&student_id);
            }
        } else {
            record.0.insert(seq, text.to_string());
        }
        self.writes
            .schedule(WriteKey::Comments(student_id), now, self.config.debounce());
        Ok(())
    }

    pub fn completion(&self, seq: SequenceId) -> Completion {
        sequence_completion(&self.book(), seq)
    }

    fn book(&self) -> Gradebook<'_> {
        Gradebook {
            students: &self.students,
            subjects: &self.subjects,
            marks: &self.marks,
        }
    }

    pub fn results(&self) -> &CalcResults {
        &self.results
    }

    pub fn quick_stats(&self) -> &QuickStats {
        &self.quick_stats
    }

    fn attempt_term(&mut self, term: TermId, outcome: &mut CalcOutcome) {
        match compute_term_results(&self.book(), term, self.config.passing_mark) {
            Some(set) => {
                self.results.terms[term.index()] = Some(set);
                outcome.computed.push(term.as_str().to_string());
            }
            None => outcome.skipped.push(term.as_str().to_string()),
        }
    }

    fn attempt_annual(&mut self, outcome: &mut CalcOutcome) {
        let terms = [
            self.results.terms[0].as_ref(),
            self.results.terms[1].as_ref(),
            self.results.terms[2].as_ref(),
        ];
        match compute_annual_results(&self.students, terms, self.config.passing_mark) {
            Some(set) => {
                self.results.annual = Some(set);
                outcome.computed.push("annual".to_string());
            }
            None => outcome.skipped.push("annual".to_string()),
        }
    }

    /// Overwrites the cached summary of each computed view. Views not
    /// recomputed keep the entry loaded from the workspace.
    fn refresh_quick_stats(&mut self, outcome: &CalcOutcome, now: Instant) {
        for view in &outcome.computed {
            let stat = if let Some(term) = TermId::parse(view) {
                self.results.term(term).map(|set| QuickStat::from(&set.stats))
            } else if view == "annual" {
                self.results.annual.as_ref().map(|set| QuickStat::from(&set.stats))
            } else {
                self.results
                    .sequence
                    .as_ref()
                    .filter(|(seq, _)| seq.as_str() == view)
                    .map(|(_, set)| QuickStat::from(&set.stats))
            };
            if let Some(stat) = stat {
                self.quick_stats.insert(view.clone(), stat);
            }
        }
        if outcome.computed.is_empty() {
            return;
        }
        self.writes
            .schedule(WriteKey::QuickStats, now, self.config.debounce());
    }

    /// Sequence results, then the owning term, then annual. Each level that
    /// lacks data is skipped and keeps its previous result set.
    pub fn calculate_sequence(&mut self, seq: SequenceId, now: Instant) -> CalcOutcome {
        let mut outcome = CalcOutcome::default();
        match compute_sequence_results(&self.book(), seq, self.config.passing_mark) {
            Some(set) => {
                self.results.sequence = Some((seq, set));
                outcome.computed.push(seq.as_str().to_string());
            }
            None => outcome.skipped.push(seq.as_str().to_string()),
        }
        self.attempt_term(seq.term(), &mut outcome);
        self.attempt_annual(&mut outcome);
        self.refresh_quick_stats(&outcome, now);
        outcome
    }

    pub fn calculate_terms(&mut self, now: Instant) -> CalcOutcome {
        let mut outcome = CalcOutcome::default();
        for term in TermId::ALL {
            self.attempt_term(term, &mut outcome);
        }
        self.attempt_annual(&mut outcome);
        self.refresh_quick_stats(&outcome, now);
        outcome
    }

    pub fn calculate_annual(&mut self, now: Instant) -> CalcOutcome {
        let mut outcome = CalcOutcome::default();
        self.attempt_annual(&mut outcome);
        self.refresh_quick_stats(&outcome, now);
        outcome
    }

    fn standing(&self, student_id: &str, view: ReportView) -> Option<Standing> {
        match view {
            ReportView::Term(term) => {
                let set = self.results.term(term)?;
                let row = set.row_for(student_id)?;
                Some(Standing {
                    total_marks: Some(row.total_marks),
                    average: row.average,
                    position: row.rank,
                    class_average: set.stats.class_average,
                    pass_percentage: set.stats.pass_percentage,
                })
            }
            ReportView::Annual => {
                let set = self.results.annual.as_ref()?;
                let row = set.row_for(student_id)?;
                Some(Standing {
                    total_marks: None,
                    average: row.final_average,
                    position: row.rank,
                    class_average: set.stats.class_average,
                    pass_percentage: set.stats.pass_percentage,
                })
            }
        }
    }

    pub fn build_report(
        &self,
        student_index: usize,
        view: ReportView,
        extras: &ReportExtras,
    ) -> Result<ReportPayload, SessionError> {
        let student = self.student_at(student_index)?;
        let standing = self.standing(&student.id, view);
        if standing.is_none() {
            debug!(student_id = %student.id, view = view.as_str(), "no result row; using fallback totals");
        }
        let inputs = PayloadInputs {
            student,
            subjects: &self.subjects,
            marks: self.marks.get(&student.id),
            comments: self.comments.get(&student.id),
            class_size: self.students.len(),
            standing,
        };
        Ok(build_payload(&inputs, view, extras))
    }

    pub fn next_write_deadline(&self) -> Option<Instant> {
        self.writes.next_deadline()
    }

    pub fn pending_writes(&self) -> Vec<String> {
        self.writes
            .pending_keys()
            .iter()
            .map(|k| k.to_string())
            .collect()
    }

    pub fn pending_write_count(&self) -> usize {
        self.writes.len()
    }

    /// Current in-memory body for a key, `None` when nothing is left to store.
    fn payload_for(&self, key: &WriteKey) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(match key {
            WriteKey::Marks(id) => match self.marks.get(id) {
                Some(r) => Some(serde_json::to_value(r)?),
                None => None,
            },
            WriteKey::Comments(id) => match self.comments.get(id) {
                Some(r) => Some(serde_json::to_value(r)?),
                None => None,
            },
            WriteKey::QuickStats => Some(serde_json::to_value(&self.quick_stats)?),
        })
    }

    fn write_keys(&mut self, keys: Vec<WriteKey>) -> FlushReport {
        let mut report = FlushReport::default();
        for key in keys {
            let result = match self.payload_for(&key) {
                Ok(Some(body)) => self.store.put(&key.doc_key(), &body),
                Ok(None) => self.store.delete(&key.doc_key()),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!(key = %key, error = %e, "deferred write failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn flush_due(&mut self, now: Instant) -> FlushReport {
        if self.writes.is_empty() {
            return FlushReport::default();
        }
        let due = self.writes.take_due(now);
        self.write_keys(due)
    }

    pub fn flush_all(&mut self) -> FlushReport {
        let all = self.writes.flush();
        self.write_keys(all)
    }

    /// Ends the session's write activity: pending writes are flushed when
    /// configured, anything left is cancelled.
    pub fn teardown(&mut self) -> TeardownReport {
        let flushed = if self.config.flush_on_close {
            self.flush_all()
        } else {
            FlushReport::default()
        };
        let dropped = self.writes.cancel_all();
        if dropped > 0 {
            warn!(dropped, "pending writes dropped at teardown");
        }
        TeardownReport { flushed, dropped }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
