use crate::answers::AnswerSet;
use crate::spec::funnel::FunnelSpec;
use crate::spec::id::QuestionId;
use crate::spec::question::QuestionSpec;

pub type VisibilityMap = std::collections::BTreeMap<QuestionId, bool>;

/// Whether `question` is shown given the answers collected so far.
pub fn is_visible(question: &QuestionSpec, answers: &AnswerSet) -> bool {
    question.conditional.evaluate(answers)
}

/// Resolves visibility for every question in traversal order.
///
/// Conditions only see answers of questions that are themselves visible, so an
/// answer kept for a hidden question counts as not answered downstream.
pub fn resolve_visibility(spec: &FunnelSpec, answers: &AnswerSet) -> VisibilityMap {
    let mut map = VisibilityMap::new();
    let mut effective = AnswerSet::new();

    for question in &spec.questions {
        let visible = is_visible(question, &effective);
        if visible && let Some(answer) = answers.get(question.id.as_str()) {
            effective.insert(question.id.clone(), answer.clone());
        }
        map.insert(question.id.clone(), visible);
    }

    map
}
