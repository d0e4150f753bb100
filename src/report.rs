use crate::calc::{format_mark, truncate_2_decimals};
use crate::model::{CommentRecord, MarkRecord, SequenceId, Student, Subject, TermId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportView {
    Term(TermId),
    Annual,
}

impl ReportView {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "annual" {
            return Some(ReportView::Annual);
        }
        TermId::parse(raw).map(ReportView::Term)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReportView::Term(t) => t.as_str(),
            ReportView::Annual => "annual",
        }
    }

    pub fn sequences(self) -> Vec<SequenceId> {
        match self {
            ReportView::Term(t) => t.sequences().to_vec(),
            ReportView::Annual => SequenceId::ALL.to_vec(),
        }
    }

    fn default_titles(self) -> (&'static str, &'static str) {
        match self {
            ReportView::Term(TermId::First) => {
                ("FIRST TERM REPORT CARD", "BULLETIN DU PREMIER TRIMESTRE")
            }
            ReportView::Term(TermId::Second) => {
                ("SECOND TERM REPORT CARD", "BULLETIN DU DEUXIEME TRIMESTRE")
            }
            ReportView::Term(TermId::Third) => {
                ("THIRD TERM REPORT CARD", "BULLETIN DU TROISIEME TRIMESTRE")
            }
            ReportView::Annual => ("ANNUAL REPORT CARD", "BULLETIN ANNUEL"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubjectMeta {
    pub name: String,
    pub teacher: Option<String>,
    pub coefficient: Option<f64>,
    pub performance: Option<String>,
    pub remark: Option<String>,
}

/// Caller-supplied metadata that the gradebook does not own.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportExtras {
    pub matricule: Option<String>,
    pub date_of_birth: Option<String>,
    pub place_of_birth: Option<String>,
    pub class_name: Option<String>,
    pub branch_of_study: Option<String>,
    pub option: Option<String>,
    pub student_photo_url: Option<String>,

    pub school_name: Option<String>,
    pub po_box: Option<String>,
    pub telephone: Option<String>,
    pub logo_url: Option<String>,

    pub term_title_en: Option<String>,
    pub term_title_fr: Option<String>,
    pub teacher_comment: Option<String>,
    pub principal_comment: Option<String>,
    pub performance_factors: Option<String>,
    pub mention: Option<String>,

    pub subjects_meta: Vec<SubjectMeta>,
}

impl ReportExtras {
    fn subject_meta(&self, name: &str) -> Option<&SubjectMeta> {
        self.subjects_meta.iter().find(|m| m.name == name)
    }
}

/// Precomputed standing of the student in the view's result set.
#[derive(Debug, Clone, PartialEq)]
pub struct Standing {
    pub total_marks: Option<f64>,
    pub average: f64,
    pub position: usize,
    pub class_average: f64,
    pub pass_percentage: f64,
}

#[derive(Debug, Clone)]
pub struct PayloadInputs<'a> {
    pub student: &'a Student,
    pub subjects: &'a [Subject],
    pub marks: Option<&'a MarkRecord>,
    pub comments: Option<&'a CommentRecord>,
    pub class_size: usize,
    pub standing: Option<Standing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentData {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matricule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_of_birth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_of_study: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po_box: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRow {
    pub name: String,
    pub teacher: String,
    pub coefficient: f64,
    pub seq1: String,
    pub seq2: String,
    /// Present only for the annual view: all six sequences in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<String>,
    /// Empty string when no sequence of the view has a mark.
    pub average: String,
    pub performance: String,
    pub remark: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadSource {
    Results,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TermData {
    pub view: String,
    pub title: String,
    pub title_fr: String,
    pub total_marks: String,
    pub position: Option<usize>,
    pub average: String,
    pub class_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_average: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_percentage: Option<String>,
    pub teacher_comment: String,
    pub principal_comment: String,
    pub performance_factors: String,
    pub mention: String,
    pub source: PayloadSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPayload {
    pub student_data: StudentData,
    pub school_data: SchoolData,
    pub subjects_data: Vec<SubjectRow>,
    pub term_data: TermData,
}

fn coefficient_of(meta: Option<&SubjectMeta>) -> f64 {
    match meta.and_then(|m| m.coefficient) {
        Some(c) if c.is_finite() && c > 0.0 => c,
        _ => 1.0,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn cell(v: Option<f64>) -> String {
    v.map(format_mark).unwrap_or_default()
}

/// Shape one student's marks and standing into the flat structure consumed
/// by the document renderer.
pub fn build_payload(
    inputs: &PayloadInputs<'_>,
    view: ReportView,
    extras: &ReportExtras,
) -> ReportPayload {
    let seqs = view.sequences();
    let mark = |seq: SequenceId, subject: &str| inputs.marks.and_then(|m| m.mark(seq, subject));

    let mut weighted_total = 0.0_f64;
    let mut coefficient_sum = 0.0_f64;
    let mut subjects_data = Vec::with_capacity(inputs.subjects.len());

    for subject in inputs.subjects {
        let meta = extras.subject_meta(&subject.name);
        let coefficient = coefficient_of(meta);
        let present: Vec<f64> = seqs
            .iter()
            .filter_map(|seq| mark(*seq, &subject.name))
            .collect();
        let average = mean(&present);
        if let Some(avg) = average {
            weighted_total += avg * coefficient;
            coefficient_sum += coefficient;
        }

        let (seq1, seq2, sequences) = match view {
            ReportView::Term(t) => {
                let [a, b] = t.sequences();
                (
                    cell(mark(a, &subject.name)),
                    cell(mark(b, &subject.name)),
                    Vec::new(),
                )
            }
            ReportView::Annual => (
                String::new(),
                String::new(),
                seqs.iter().map(|seq| cell(mark(*seq, &subject.name))).collect(),
            ),
        };

        subjects_data.push(SubjectRow {
            name: subject.name.clone(),
            teacher: meta.and_then(|m| m.teacher.clone()).unwrap_or_default(),
            coefficient,
            seq1,
            seq2,
            sequences,
            average: average.map(truncate_2_decimals).unwrap_or_default(),
            performance: meta.and_then(|m| m.performance.clone()).unwrap_or_default(),
            remark: meta.and_then(|m| m.remark.clone()).unwrap_or_default(),
        });
    }

    let fallback_average = if coefficient_sum > 0.0 {
        weighted_total / coefficient_sum
    } else {
        0.0
    };

    let (total_marks, position, average, class_average, pass_percentage, source) =
        match &inputs.standing {
            Some(st) => (
                st.total_marks.unwrap_or(weighted_total),
                Some(st.position),
                st.average,
                Some(truncate_2_decimals(st.class_average)),
                Some(truncate_2_decimals(st.pass_percentage)),
                PayloadSource::Results,
            ),
            None => (
                weighted_total,
                None,
                fallback_average,
                None,
                None,
                PayloadSource::Fallback,
            ),
        };

    let (default_en, default_fr) = view.default_titles();
    let teacher_comment = extras
        .teacher_comment
        .clone()
        .or_else(|| latest_comment(inputs.comments, &seqs))
        .unwrap_or_default();

    ReportPayload {
        student_data: StudentData {
            id: inputs.student.id.clone(),
            name: inputs.student.name.clone(),
            matricule: extras.matricule.clone(),
            date_of_birth: extras.date_of_birth.clone(),
            place_of_birth: extras.place_of_birth.clone(),
            class_name: extras.class_name.clone(),
            branch_of_study: extras.branch_of_study.clone(),
            option: extras.option.clone(),
            photo_url: extras.student_photo_url.clone(),
        },
        school_data: SchoolData {
            name: extras.school_name.clone(),
            po_box: extras.po_box.clone(),
            telephone: extras.telephone.clone(),
            logo_url: extras.logo_url.clone(),
        },
        subjects_data,
        term_data: TermData {
            view: view.as_str().to_string(),
            title: extras
                .term_title_en
                .clone()
                .unwrap_or_else(|| default_en.to_string()),
            title_fr: extras
                .term_title_fr
                .clone()
                .unwrap_or_else(|| default_fr.to_string()),
            total_marks: truncate_2_decimals(total_marks),
            position,
            average: truncate_2_decimals(average),
            class_size: inputs.class_size,
            class_average,
            pass_percentage,
            teacher_comment,
            principal_comment: extras.principal_comment.clone().unwrap_or_default(),
            performance_factors: extras.performance_factors.clone().unwrap_or_default(),
            mention: extras.mention.clone().unwrap_or_default(),
            source,
        },
    }
}

fn latest_comment(comments: Option<&CommentRecord>, seqs: &[SequenceId]) -> Option<String> {
    let comments = comments?;
    seqs.iter()
        .rev()
        .filter_map(|seq| comments.get(*seq))
        .find(|text| !text.trim().is_empty())
        .map(|text| text.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldSection {
    Student,
    School,
    Term,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateField {
    pub key: &'static str,
    pub label: &'static str,
    pub section: FieldSection,
    pub optional: bool,
}

const fn field(key: &'static str, label: &'static str, section: FieldSection, optional: bool) -> TemplateField {
    TemplateField {
        key,
        label,
        section,
        optional,
    }
}

const CLASSIC_A4_FIELDS: &[TemplateField] = &[
    field("matricule", "Matricule", FieldSection::Student, false),
    field("dateOfBirth", "Date of Birth", FieldSection::Student, false),
    field("placeOfBirth", "Place of Birth", FieldSection::Student, false),
    field("className", "Class Name", FieldSection::Student, false),
    field("branchOfStudy", "Branch of Study", FieldSection::Student, false),
    field("option", "Option", FieldSection::Student, false),
    field("studentPhotoUrl", "Student Photo URL", FieldSection::Student, true),
    field("schoolName", "School Name", FieldSection::School, false),
    field("poBox", "P.O. Box", FieldSection::School, false),
    field("telephone", "Telephone", FieldSection::School, false),
    field("logoUrl", "Logo URL", FieldSection::School, true),
    field("termTitleEn", "Term Title (EN)", FieldSection::Term, false),
    field("termTitleFr", "Term Title (FR)", FieldSection::Term, false),
    field("performanceFactors", "Performance Factors", FieldSection::Term, true),
    field("teacherComment", "Class Teacher's Comment", FieldSection::Term, true),
    field("principalComment", "Principal's Comment", FieldSection::Term, true),
    field("mention", "Mention", FieldSection::Term, true),
];

pub fn template_fields(template_id: &str) -> Option<&'static [TemplateField]> {
    match template_id {
        "classic-a4" => Some(CLASSIC_A4_FIELDS),
        _ => None,
    }
}

/// Fields of a template whose key is absent, null or blank in `available`.
pub fn missing_template_fields(
    template_id: &str,
    available: &serde_json::Map<String, serde_json::Value>,
) -> Option<Vec<TemplateField>> {
    let fields = template_fields(template_id)?;
    Some(
        fields
            .iter()
            .filter(|f| match available.get(f.key) {
                None | Some(serde_json::Value::Null) => true,
                Some(serde_json::Value::String(s)) => s.is_empty(),
                Some(_) => false,
            })
            .copied()
            .collect(),
    )
}
