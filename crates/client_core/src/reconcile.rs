//! Patching the local checklist tree with responses the server returned.

use chrono::Utc;
use shared::{
    checklist::{AnswerPayload, Checklist, Question},
    domain::{CharacterId, Response, ResponseId, SourceType},
};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The question had no current response.
    Inserted,
    /// Same version, or an unsaved placeholder, was overwritten in place.
    Replaced,
    /// The previous version moved into history.
    Superseded { previous_version: u32 },
    /// The incoming response is older than what the tree holds; ignored.
    Stale { current_version: u32 },
}

pub fn apply_response(checklist: &mut Checklist, incoming: Response) -> ClientResult<ReconcileOutcome> {
    let question = checklist
        .question_mut(incoming.question_id)
        .ok_or(ClientError::UnknownQuestion(incoming.question_id))?;
    Ok(apply_to_question(question, incoming))
}

pub fn apply_to_question(question: &mut Question, incoming: Response) -> ReconcileOutcome {
    let Some(current) = question.current_response.take() else {
        question.current_response = Some(incoming);
        return ReconcileOutcome::Inserted;
    };

    if current.id.is_unsaved() || incoming.version == current.version {
        question.current_response = Some(incoming);
        return ReconcileOutcome::Replaced;
    }

    if incoming.version < current.version {
        let current_version = current.version;
        question.current_response = Some(current);
        return ReconcileOutcome::Stale { current_version };
    }

    let previous_version = current.version;
    push_history(&mut question.response_history, current);
    question.current_response = Some(incoming);
    ReconcileOutcome::Superseded { previous_version }
}

/// Clears the current response, keeping a saved value in history.
pub fn clear_response(question: &mut Question) -> Option<Response> {
    let current = question.current_response.take()?;
    if !current.id.is_unsaved() {
        push_history(&mut question.response_history, current.clone());
    }
    Some(current)
}

/// Replaces local history with the server's copy, minus the current version.
pub fn merge_history(question: &mut Question, fetched: Vec<Response>) {
    let current_version = question.current_response.as_ref().map(|r| r.version);
    question.response_history.clear();
    for response in fetched {
        if Some(response.version) == current_version {
            continue;
        }
        push_history(&mut question.response_history, response);
    }
}

/// Newest first, one entry per version.
pub fn push_history(history: &mut Vec<Response>, response: Response) {
    match history.iter_mut().find(|r| r.version == response.version) {
        Some(existing) => *existing = response,
        None => history.push(response),
    }
    history.sort_by(|a, b| b.version.cmp(&a.version));
}

pub fn next_version(question: &Question) -> u32 {
    let latest = question
        .current_response
        .iter()
        .chain(question.response_history.iter())
        .map(|response| response.version)
        .max()
        .unwrap_or(0);
    latest + 1
}

/// Placeholder shown until the server answers.
pub fn optimistic_response(
    question: &Question,
    character_id: CharacterId,
    payload: &AnswerPayload,
    source_type: SourceType,
    comment: Option<String>,
) -> Response {
    let mut response = Response {
        id: ResponseId::UNSAVED,
        question_id: question.id,
        character_id,
        answer_id: None,
        answer_ids: Vec::new(),
        answer_text: None,
        source_type,
        comment,
        version: next_version(question),
        updated_at: Utc::now(),
    };
    match payload {
        AnswerPayload::Single { answer_id } => response.answer_id = Some(*answer_id),
        AnswerPayload::Multiple { answer_ids } => response.answer_ids = answer_ids.clone(),
        AnswerPayload::Text { answer_text } => response.answer_text = Some(answer_text.clone()),
    }
    response
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
