use super::*;
use crate::test_fixtures::{answered, sample_checklist, saved_response, CHARACTER};
use shared::domain::{AnswerId, QuestionId};

fn question(checklist: &Checklist, id: i64) -> &Question {
    checklist.question(QuestionId(id)).expect("question")
}

#[test]
fn first_answer_is_inserted() {
    let mut checklist = sample_checklist();
    let incoming = saved_response(question(&checklist, 101), 1, 1);

    let outcome = apply_response(&mut checklist, incoming.clone()).expect("apply");
    assert_eq!(outcome, ReconcileOutcome::Inserted);
    assert_eq!(question(&checklist, 101).current_response, Some(incoming));
    assert!(question(&checklist, 101).response_history.is_empty());
}

#[test]
fn newer_version_moves_previous_into_history() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(101), 1);
    let mut incoming = saved_response(question(&checklist, 101), 2, 2);
    incoming.answer_id = Some(AnswerId(1012));

    let outcome = apply_response(&mut checklist, incoming).expect("apply");
    assert_eq!(outcome, ReconcileOutcome::Superseded { previous_version: 1 });

    let q = question(&checklist, 101);
    assert_eq!(q.current_response.as_ref().map(|r| r.version), Some(2));
    assert_eq!(q.response_history.len(), 1);
    assert_eq!(q.response_history[0].version, 1);
    assert_eq!(q.response_history[0].answer_id, Some(AnswerId(1011)));
}

#[test]
fn older_version_is_ignored() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(103), 3);
    let stale = saved_response(question(&checklist, 103), 9, 2);

    let outcome = apply_response(&mut checklist, stale).expect("apply");
    assert_eq!(outcome, ReconcileOutcome::Stale { current_version: 3 });
    assert_eq!(
        question(&checklist, 103)
            .current_response
            .as_ref()
            .and_then(|r| r.answer_text.as_deref()),
        Some("text v3")
    );
}

#[test]
fn optimistic_placeholder_never_reaches_history() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(103), 1);
    let q = checklist.question_mut(QuestionId(103)).expect("question");

    let placeholder = optimistic_response(
        q,
        CHARACTER,
        &AnswerPayload::Text {
            answer_text: "draft".into(),
        },
        SourceType::Imagined,
        None,
    );
    assert_eq!(placeholder.version, 2);
    assert!(placeholder.id.is_unsaved());
    assert_eq!(
        apply_to_question(q, placeholder),
        ReconcileOutcome::Superseded { previous_version: 1 }
    );

    let mut canonical = saved_response(q, 55, 2);
    canonical.answer_text = Some("draft".into());
    assert_eq!(apply_to_question(q, canonical), ReconcileOutcome::Replaced);

    let versions: Vec<u32> = q.response_history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1]);
    assert_eq!(q.current_response.as_ref().map(|r| r.id), Some(ResponseId(55)));
}

#[test]
fn clearing_keeps_saved_value_in_history() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(302), 4);
    let q = checklist.question_mut(QuestionId(302)).expect("question");

    let cleared = clear_response(q).expect("had a response");
    assert_eq!(cleared.version, 4);
    assert!(q.current_response.is_none());
    assert_eq!(q.response_history.len(), 1);
    assert_eq!(next_version(q), 5);
    assert!(clear_response(q).is_none());
}

#[test]
fn history_is_newest_first_without_duplicate_versions() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(101), 3);
    let q = checklist.question_mut(QuestionId(101)).expect("question");

    let fetched = vec![
        saved_response(q, 1, 1),
        saved_response(q, 3, 3),
        saved_response(q, 2, 2),
        saved_response(q, 22, 2),
    ];
    merge_history(q, fetched);

    let versions: Vec<u32> = q.response_history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(q.response_history[0].id, ResponseId(22));
}

#[test]
fn unknown_question_is_an_error() {
    let mut checklist = sample_checklist();
    let mut incoming = saved_response(question(&checklist, 101), 1, 1);
    incoming.question_id = QuestionId(999);
    let err = apply_response(&mut checklist, incoming).expect_err("unknown");
    assert!(matches!(err, ClientError::UnknownQuestion(QuestionId(999))));
}
