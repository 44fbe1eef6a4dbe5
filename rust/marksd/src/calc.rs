use serde::{Deserialize, Serialize};

/// Default share of the nominal exam weight that counts while progressive
/// scaling is on. Only the persistence/config layer applies it; the solver
/// always takes the factor explicitly.
pub const DEFAULT_PS_FACTOR: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeType {
    #[serde(rename = "numeric")]
    Numeric,
    #[serde(rename = "S")]
    Satisfactory,
    #[serde(rename = "U")]
    Unsatisfactory,
}

impl GradeType {
    pub fn code(self) -> &'static str {
        match self {
            GradeType::Numeric => "numeric",
            GradeType::Satisfactory => "S",
            GradeType::Unsatisfactory => "U",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let t = raw.trim();
        if t.eq_ignore_ascii_case("numeric") {
            Some(GradeType::Numeric)
        } else if t.eq_ignore_ascii_case("S") || t.eq_ignore_ascii_case("satisfactory") {
            Some(GradeType::Satisfactory)
        } else if t.eq_ignore_ascii_case("U") || t.eq_ignore_ascii_case("unsatisfactory") {
            Some(GradeType::Unsatisfactory)
        } else {
            None
        }
    }
}

/// Raw assignment values as the caller validated them. `unweighted_mark` is
/// never accepted from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentInput {
    pub assessment_name: String,
    pub grade_type: GradeType,
    pub weighted_mark: Option<f64>,
    pub mark_weight: Option<f64>,
}

/// Pass/fail marking carries no numbers at all; only the numeric variant has
/// a payload, so the "no numeric fields for S/U" rule cannot be broken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Marking {
    Numeric {
        weighted_mark: Option<f64>,
        mark_weight: Option<f64>,
        unweighted_mark: Option<f64>,
    },
    Satisfactory,
    Unsatisfactory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    pub assessment_name: String,
    pub marking: Marking,
}

impl AssignmentRecord {
    pub fn grade_type(&self) -> GradeType {
        match self.marking {
            Marking::Numeric { .. } => GradeType::Numeric,
            Marking::Satisfactory => GradeType::Satisfactory,
            Marking::Unsatisfactory => GradeType::Unsatisfactory,
        }
    }

    pub fn weighted_mark(&self) -> Option<f64> {
        match self.marking {
            Marking::Numeric { weighted_mark, .. } => weighted_mark,
            _ => None,
        }
    }

    pub fn mark_weight(&self) -> Option<f64> {
        match self.marking {
            Marking::Numeric { mark_weight, .. } => mark_weight,
            _ => None,
        }
    }

    pub fn unweighted_mark(&self) -> Option<f64> {
        match self.marking {
            Marking::Numeric {
                unweighted_mark, ..
            } => unweighted_mark,
            _ => None,
        }
    }

    pub fn figures(&self) -> AssignmentFigures {
        AssignmentFigures {
            assessment_name: self.assessment_name.clone(),
            grade_type: self.grade_type(),
            weighted_mark: self.weighted_mark(),
            mark_weight: self.mark_weight(),
            unweighted_mark: self.unweighted_mark(),
        }
    }
}

/// Flat wire shape of a derived record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentFigures {
    pub assessment_name: String,
    pub grade_type: GradeType,
    pub weighted_mark: Option<f64>,
    pub mark_weight: Option<f64>,
    pub unweighted_mark: Option<f64>,
}

pub fn derive_assignment(input: &AssignmentInput) -> AssignmentRecord {
    let marking = match input.grade_type {
        GradeType::Satisfactory => Marking::Satisfactory,
        GradeType::Unsatisfactory => Marking::Unsatisfactory,
        GradeType::Numeric => {
            let unweighted_mark = match (input.weighted_mark, input.mark_weight) {
                (Some(w), Some(mw)) if mw > 0.0 => Some(w / mw),
                _ => None,
            };
            Marking::Numeric {
                weighted_mark: input.weighted_mark,
                mark_weight: input.mark_weight,
                unweighted_mark,
            }
        }
    };
    AssignmentRecord {
        assessment_name: input.assessment_name.clone(),
        marking,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAggregate {
    pub assignment_weighted_sum: f64,
    pub assignment_weight_percent: f64,
}

pub fn aggregate<'a, I>(records: I) -> SubjectAggregate
where
    I: IntoIterator<Item = &'a AssignmentRecord>,
{
    let mut out = SubjectAggregate::default();
    for r in records {
        if let Marking::Numeric {
            weighted_mark,
            mark_weight,
            ..
        } = r.marking
        {
            out.assignment_weighted_sum += weighted_mark.unwrap_or(0.0);
            out.assignment_weight_percent += mark_weight.unwrap_or(0.0);
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamSettings {
    pub nominal_exam_weight: f64,
    pub ps_enabled: bool,
    pub ps_factor: f64,
}

impl ExamSettings {
    pub fn scoring_weight(&self) -> f64 {
        scoring_weight(self.nominal_exam_weight, self.ps_enabled, self.ps_factor)
    }
}

/// Effective exam weight used by the solver. Progressive scaling keeps only
/// `ps_factor` percent of the nominal weight.
pub fn scoring_weight(nominal_exam_weight: f64, ps_enabled: bool, ps_factor: f64) -> f64 {
    if ps_enabled {
        nominal_exam_weight * (ps_factor / 100.0)
    } else {
        nominal_exam_weight
    }
}

/// Solver output. `value` is `None` when the exam carries no effective weight;
/// otherwise it is clamped to [0, 100] and `is_achievable` tells whether
/// clamping was needed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamRequirement {
    pub value: Option<f64>,
    pub unclamped: Option<f64>,
    pub is_achievable: bool,
}

impl ExamRequirement {
    fn undefined() -> Self {
        Self {
            value: None,
            unclamped: None,
            is_achievable: false,
        }
    }
}

pub fn required_exam_mark(
    goal_percent: f64,
    assignment_weighted_sum: f64,
    assignment_weight_percent: f64,
    nominal_exam_weight: f64,
    ps_enabled: bool,
    ps_factor: f64,
) -> ExamRequirement {
    let sw = scoring_weight(nominal_exam_weight, ps_enabled, ps_factor);
    if sw == 0.0 {
        return ExamRequirement::undefined();
    }

    let needed = ((goal_percent / 100.0) * (assignment_weight_percent + sw)
        - assignment_weighted_sum)
        * 100.0
        / sw;
    if !needed.is_finite() {
        return ExamRequirement::undefined();
    }

    ExamRequirement {
        value: Some(needed.clamp(0.0, 100.0)),
        unclamped: Some(needed),
        is_achievable: (0.0..=100.0).contains(&needed),
    }
}

/// Total for a given exam mark. Not clamped: inconsistent inputs show up as a
/// total above 100 instead of being hidden.
pub fn final_total(
    assignment_weighted_sum: f64,
    exam_mark: f64,
    nominal_exam_weight: f64,
    ps_enabled: bool,
    ps_factor: f64,
) -> f64 {
    let sw = scoring_weight(nominal_exam_weight, ps_enabled, ps_factor);
    assignment_weighted_sum + exam_mark * (sw / 100.0)
}

/// Exam weight assumed when a subject has no exam row yet: whatever the
/// assignments leave over.
pub fn inferred_exam_weight(assignment_weight_percent: f64) -> f64 {
    (100.0 - assignment_weight_percent).max(0.0)
}

/// Half-away-from-zero rounding for display values.
pub fn round_to(x: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (x * f).round() / f
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeBand {
    NotSet,
    HighDistinction,
    Distinction,
    Credit,
    Pass,
    Fail,
}

pub fn grade_band(percent: Option<f64>) -> GradeBand {
    match percent {
        Some(p) if p > 0.0 => classify_percent(p),
        _ => GradeBand::NotSet,
    }
}

/// Band for a percentage that is known to count, so zero is a fail.
fn classify_percent(p: f64) -> GradeBand {
    if p >= 85.0 {
        GradeBand::HighDistinction
    } else if p >= 75.0 {
        GradeBand::Distinction
    } else if p >= 65.0 {
        GradeBand::Credit
    } else if p >= 50.0 {
        GradeBand::Pass
    } else {
        GradeBand::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Invalid,
    Achieved,
    Feasible,
    Impossible,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalRequirement {
    pub goal: f64,
    pub status: RequirementStatus,
    pub required_exam_mark: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStanding {
    pub assignment_weighted_sum: f64,
    pub assignment_weight_percent: f64,
    pub nominal_exam_weight: f64,
    pub scoring_weight: f64,
    pub ps_enabled: bool,
    pub ps_factor: Option<f64>,
    pub exam_mark: Option<f64>,
    pub exam_contribution: f64,
    pub total_weighted: f64,
    pub total_weight_percent: f64,
    pub average: Option<f64>,
    pub grade_band: GradeBand,
    pub requirement: Option<GoalRequirement>,
}

/// Everything a subject page shows: earned contribution so far, the running
/// average over the covered weight, and, when a goal is given, what the exam
/// still has to deliver.
pub fn subject_standing(
    agg: &SubjectAggregate,
    exam_mark: Option<f64>,
    settings: &ExamSettings,
    goal: Option<f64>,
) -> SubjectStanding {
    let sw = settings.scoring_weight();
    let exam_contribution = match exam_mark {
        Some(m) if sw > 0.0 => m / 100.0 * sw,
        _ => 0.0,
    };
    let total_weighted = agg.assignment_weighted_sum + exam_contribution;
    let total_weight_percent = agg.assignment_weight_percent + if sw > 0.0 { sw } else { 0.0 };
    let average = if total_weight_percent != 0.0 {
        Some(round_to(total_weighted / total_weight_percent * 100.0, 2))
    } else {
        None
    };

    let requirement = goal.map(|g| goal_requirement(g, agg, exam_mark, average, settings));

    SubjectStanding {
        assignment_weighted_sum: round_to(agg.assignment_weighted_sum, 2),
        assignment_weight_percent: round_to(agg.assignment_weight_percent, 2),
        nominal_exam_weight: settings.nominal_exam_weight,
        scoring_weight: round_to(sw, 2),
        ps_enabled: settings.ps_enabled,
        ps_factor: settings.ps_enabled.then_some(settings.ps_factor),
        exam_mark,
        exam_contribution: round_to(exam_contribution, 2),
        total_weighted: round_to(total_weighted, 2),
        total_weight_percent: round_to(total_weight_percent, 2),
        average,
        grade_band: grade_band(average),
        requirement,
    }
}

fn goal_requirement(
    goal: f64,
    agg: &SubjectAggregate,
    exam_mark: Option<f64>,
    average: Option<f64>,
    settings: &ExamSettings,
) -> GoalRequirement {
    let mut out = GoalRequirement {
        goal,
        status: RequirementStatus::Invalid,
        required_exam_mark: None,
    };
    if !goal.is_finite() || goal <= 0.0 || goal > 100.0 {
        return out;
    }
    if let (Some(avg), Some(_)) = (average, exam_mark) {
        if avg >= goal {
            out.status = RequirementStatus::Achieved;
            return out;
        }
    }
    if settings.scoring_weight() <= 0.0 {
        out.status = RequirementStatus::Impossible;
        return out;
    }

    let req = required_exam_mark(
        goal,
        agg.assignment_weighted_sum,
        agg.assignment_weight_percent,
        settings.nominal_exam_weight,
        settings.ps_enabled,
        settings.ps_factor,
    );
    out.required_exam_mark = req.value.map(|v| round_to(v, 2));
    out.status = match req.unclamped {
        None => RequirementStatus::Impossible,
        Some(u) if u < 0.0 => RequirementStatus::Achieved,
        Some(u) if u > 100.0 => RequirementStatus::Impossible,
        Some(_) => RequirementStatus::Feasible,
    };
    out
}

/// Grade thresholds a subject can be measured against, lowest first.
pub const GRADE_TARGETS: [(GradeBand, f64); 4] = [
    (GradeBand::Pass, 50.0),
    (GradeBand::Credit, 65.0),
    (GradeBand::Distinction, 75.0),
    (GradeBand::HighDistinction, 85.0),
];

/// Change between first and last mark that counts as a trend.
pub const TREND_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub average: f64,
    pub highest: f64,
    pub lowest: f64,
    pub std_dev: f64,
    pub consistency: f64,
}

/// Spread of a list of marks. The standard deviation is the sample one;
/// consistency is `100 * (1 - std_dev / mean)` and reads 100 for a single
/// mark or a non-positive mean.
pub fn performance_metrics(marks: &[f64]) -> Option<PerformanceMetrics> {
    if marks.is_empty() {
        return None;
    }
    let n = marks.len() as f64;
    let average = marks.iter().sum::<f64>() / n;
    let highest = marks.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let lowest = marks.iter().copied().fold(f64::INFINITY, f64::min);
    let std_dev = if marks.len() > 1 {
        let ss: f64 = marks.iter().map(|m| (m - average).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    let consistency = if marks.len() > 1 && average > 0.0 {
        (1.0 - std_dev / average) * 100.0
    } else {
        100.0
    };
    Some(PerformanceMetrics {
        average,
        highest,
        lowest,
        std_dev,
        consistency,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trend {
    pub first_mark: f64,
    pub last_mark: f64,
    pub change: f64,
    pub direction: TrendDirection,
}

/// First-to-last comparison over marks in entry order; needs two marks.
pub fn analyze_trend(marks: &[f64]) -> Option<Trend> {
    let (&first_mark, &last_mark) = match marks {
        [first, .., last] => (first, last),
        _ => return None,
    };
    let change = last_mark - first_mark;
    let direction = if change > TREND_THRESHOLD {
        TrendDirection::Improving
    } else if change < -TREND_THRESHOLD {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };
    Some(Trend {
        first_mark,
        last_mark,
        change,
        direction,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Achieved,
    AlmostThere,
    NeedsWork,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetProgress {
    pub band: GradeBand,
    pub target: f64,
    pub progress_percent: f64,
    pub achieved: bool,
    pub status: ProgressStatus,
}

pub fn progress_to_targets(current_mark: f64) -> Vec<TargetProgress> {
    GRADE_TARGETS
        .iter()
        .map(|&(band, target)| {
            let progress_percent = (current_mark / target * 100.0).min(100.0);
            let status = if progress_percent >= 100.0 {
                ProgressStatus::Achieved
            } else if progress_percent >= 80.0 {
                ProgressStatus::AlmostThere
            } else {
                ProgressStatus::NeedsWork
            };
            TargetProgress {
                band,
                target,
                progress_percent,
                achieved: progress_percent >= 100.0,
                status,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkingScale {
    pub max_mark: f64,
    pub scale_factor: f64,
    pub is_small_scale: bool,
}

/// Marks that never exceed 20 are taken to be on a small scale, with
/// `scale_factor = max_mark / 100`.
pub fn detect_marking_scale(marks: &[f64]) -> MarkingScale {
    if marks.is_empty() {
        return MarkingScale {
            max_mark: 100.0,
            scale_factor: 1.0,
            is_small_scale: false,
        };
    }
    let max_mark = marks.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max_mark <= 20.0 {
        MarkingScale {
            max_mark,
            scale_factor: max_mark / 100.0,
            is_small_scale: true,
        }
    } else {
        MarkingScale {
            max_mark,
            scale_factor: 1.0,
            is_small_scale: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDistribution {
    pub high_distinction: usize,
    pub distinction: usize,
    pub credit: usize,
    pub pass: usize,
    pub fail: usize,
}

/// Counts assignments per band by their own percentage
/// (`weighted_mark / mark_weight`). Records without an unweighted mark are
/// not counted.
pub fn grade_distribution<'a, I>(records: I) -> GradeDistribution
where
    I: IntoIterator<Item = &'a AssignmentRecord>,
{
    let mut out = GradeDistribution::default();
    for u in records.into_iter().filter_map(|r| r.unweighted_mark()) {
        match classify_percent(u * 100.0) {
            GradeBand::HighDistinction => out.high_distinction += 1,
            GradeBand::Distinction => out.distinction += 1,
            GradeBand::Credit => out.credit += 1,
            GradeBand::Pass => out.pass += 1,
            GradeBand::Fail | GradeBand::NotSet => out.fail += 1,
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeSource {
    FinalGrade,
    Assignments,
    NoMarks,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStatus {
    pub grade_value: f64,
    pub source: GradeSource,
    pub has_total_mark: bool,
    pub grade_band: GradeBand,
    /// Share of 100 reached, in [0, 1].
    pub progress: f64,
}

/// A recorded final total (> 0) wins; otherwise the assignments' own
/// percentage is used when there is anything to go on.
pub fn grade_status(total_mark: Option<f64>, agg: &SubjectAggregate) -> GradeStatus {
    let (grade_value, source, has_total_mark) = match total_mark {
        Some(t) if t > 0.0 => (t, GradeSource::FinalGrade, true),
        _ if agg.assignment_weighted_sum > 0.0 && agg.assignment_weight_percent > 0.0 => (
            agg.assignment_weighted_sum / agg.assignment_weight_percent * 100.0,
            GradeSource::Assignments,
            false,
        ),
        _ => (0.0, GradeSource::NoMarks, false),
    };
    GradeStatus {
        grade_value,
        source,
        has_total_mark,
        grade_band: grade_band(Some(grade_value)),
        progress: if grade_value > 0.0 {
            (grade_value / 100.0).min(1.0)
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalytics {
    pub grade_status: GradeStatus,
    pub assignment_total: f64,
    pub weight_total: f64,
    pub remaining_weight: f64,
    pub scored_count: usize,
    pub marks: Vec<f64>,
    pub marking_scale: Option<MarkingScale>,
    pub distribution: GradeDistribution,
    pub metrics: Option<PerformanceMetrics>,
    pub trend: Option<Trend>,
    pub progress_to_targets: Vec<TargetProgress>,
}

/// Statistics over a subject's entered weighted marks, in entry order.
/// Pass/fail assignments and numeric ones without a mark are left out of
/// the mark list.
pub fn subject_analytics(
    records: &[AssignmentRecord],
    total_mark: Option<f64>,
) -> SubjectAnalytics {
    let agg = aggregate(records);
    let marks: Vec<f64> = records.iter().filter_map(|r| r.weighted_mark()).collect();
    SubjectAnalytics {
        grade_status: grade_status(total_mark, &agg),
        assignment_total: agg.assignment_weighted_sum,
        weight_total: agg.assignment_weight_percent,
        remaining_weight: 100.0 - agg.assignment_weight_percent,
        scored_count: marks.len(),
        marking_scale: (!marks.is_empty()).then(|| detect_marking_scale(&marks)),
        distribution: grade_distribution(records),
        metrics: performance_metrics(&marks),
        trend: analyze_trend(&marks),
        progress_to_targets: total_mark.map(progress_to_targets).unwrap_or_default(),
        marks,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// Form-style numeric input: JSON numbers, numeric strings, and `""`/null
/// (meaning "not entered"). Anything else is rejected.
pub fn parse_optional_number(
    raw: Option<&serde_json::Value>,
    field: &str,
) -> Result<Option<f64>, CalcError> {
    let Some(v) = raw else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let parsed = if let Some(n) = v.as_f64() {
        Some(n)
    } else if let Some(s) = v.as_str() {
        let t = s.trim();
        if t.is_empty() {
            return Ok(None);
        }
        t.parse::<f64>().ok()
    } else {
        None
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(CalcError::new(
            "bad_params",
            format!("{field} must be a number, numeric string, or null"),
        )),
    }
}

pub fn parse_grade_type(raw: Option<&serde_json::Value>) -> Result<GradeType, CalcError> {
    match raw {
        None => Ok(GradeType::Numeric),
        Some(v) if v.is_null() => Ok(GradeType::Numeric),
        Some(v) => v.as_str().and_then(GradeType::parse).ok_or_else(|| {
            CalcError::new("bad_params", "gradeType must be one of 'numeric', 'S', 'U'")
        }),
    }
}
