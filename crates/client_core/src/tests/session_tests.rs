use super::*;
use crate::test_fixtures::{answered, character, sample_checklist, FakeApi, CHARACTER};
use shared::{
    checklist::PayloadError,
    domain::{Gender, ResponseId},
    error::{ApiError, ErrorCode},
};

fn server_down() -> ClientError {
    ClientError::Http {
        status: 503,
        error: ApiError::new(ErrorCode::Internal, "maintenance"),
    }
}

async fn session_for(checklist: Checklist) -> (Arc<FakeApi>, ChecklistSession) {
    let api = FakeApi::new(checklist);
    let session = ChecklistSession::load(api.clone(), "portrait", character(Gender::Female))
        .await
        .expect("load session");
    (api, session)
}

#[tokio::test]
async fn walks_questions_in_display_order() {
    let (_api, mut session) = session_for(sample_checklist()).await;

    assert_eq!(
        session.current_question().map(|q| q.id),
        Some(QuestionId(101))
    );
    let mut seen = vec![101];
    while let Some(question) = session.next_question().await {
        seen.push(question.id.0);
    }
    assert_eq!(seen, vec![101, 102, 103, 302, 301]);

    let back = session.previous_question().await.expect("previous");
    assert_eq!(back.id, QuestionId(302));

    let crumb = session.breadcrumb().expect("breadcrumb");
    assert_eq!(crumb.section, "Inner world");
    assert_eq!(crumb.group, "Phobias");
}

#[tokio::test]
async fn jump_to_unknown_question_is_reported() {
    let (_api, mut session) = session_for(sample_checklist()).await;
    let question = session.jump_to("A.2.1").await.expect("jump");
    assert_eq!(question.id, QuestionId(103));

    let err = session.jump_to("Z.1").await.expect_err("unknown");
    assert!(matches!(err, ClientError::UnknownExternalId(ref id) if id == "Z.1"));
    assert_eq!(
        session.current_question().map(|q| q.id),
        Some(QuestionId(103))
    );
}

#[tokio::test]
async fn labels_follow_character_gender() {
    let (_api, session) = session_for(sample_checklist()).await;
    let question = session.question(QuestionId(102)).expect("question");
    let labels: Vec<_> = question
        .answers
        .iter()
        .map(|answer| session.label_for(answer))
        .collect();
    assert_eq!(labels, vec!["рыжая", "седая"]);
}

#[tokio::test]
async fn single_answer_is_saved_and_patched_into_tree() {
    let (api, mut session) = session_for(sample_checklist()).await;

    let outcome = session
        .answer_single(
            QuestionId(101),
            AnswerId(1012),
            SourceType::FoundInText,
            Some("chapter 1".into()),
        )
        .await
        .expect("save");
    assert_eq!(outcome, ReconcileOutcome::Inserted);

    let current = session
        .question(QuestionId(101))
        .expect("question")
        .current_response
        .clone()
        .expect("response");
    assert_eq!(current.id, ResponseId(1001));
    assert_eq!(current.version, 1);
    assert_eq!(current.answer_id, Some(AnswerId(1012)));

    let state = api.state.lock().expect("lock");
    assert_eq!(state.saves.len(), 1);
    assert_eq!(state.saves[0].comment.as_deref(), Some("chapter 1"));
    assert_eq!(state.saves[0].character_id, CHARACTER);
}

#[tokio::test]
async fn new_version_moves_old_answer_into_history() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(103), 1);
    let (_api, mut session) = session_for(checklist).await;

    let outcome = session
        .answer_text(
            QuestionId(103),
            "  wears a grey coat ",
            SourceType::LogicallyDerived,
            None,
        )
        .await
        .expect("save");
    assert_eq!(outcome, ReconcileOutcome::Superseded { previous_version: 1 });

    let question = session.question(QuestionId(103)).expect("question");
    let current = question.current_response.as_ref().expect("current");
    assert_eq!(current.version, 2);
    assert_eq!(current.answer_text.as_deref(), Some("wears a grey coat"));
    assert_eq!(question.response_history.len(), 1);
    assert_eq!(question.response_history[0].version, 1);
}

#[tokio::test]
async fn multiple_choice_uses_replace_call() {
    let (api, mut session) = session_for(sample_checklist()).await;

    session
        .answer_multiple(
            QuestionId(302),
            vec![AnswerId(3023), AnswerId(3021)],
            SourceType::Imagined,
            None,
        )
        .await
        .expect("save")
        .expect("saved, not cleared");

    let state = api.state.lock().expect("lock");
    assert!(state.saves.is_empty());
    assert_eq!(state.replaces.len(), 1);
    assert_eq!(state.replaces[0].0, QuestionId(302));
    assert_eq!(
        state.replaces[0].1.answer_ids,
        vec![AnswerId(3021), AnswerId(3023)]
    );
}

#[tokio::test]
async fn empty_selection_clears_saved_answer() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(302), 2);
    let (api, mut session) = session_for(checklist).await;

    let outcome = session
        .answer_multiple(QuestionId(302), Vec::new(), SourceType::FoundInText, None)
        .await
        .expect("clear");
    assert!(outcome.is_none());

    let question = session.question(QuestionId(302)).expect("question");
    assert!(question.current_response.is_none());
    assert_eq!(question.response_history[0].version, 2);
    assert_eq!(api.state.lock().expect("lock").deletes, vec![ResponseId(30202)]);
}

#[tokio::test]
async fn failed_save_restores_previous_state() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(101), 1);
    let (api, mut session) = session_for(checklist).await;
    let before = session.question(QuestionId(101)).expect("question").clone();

    api.fail_with(server_down());
    let err = session
        .answer_single(QuestionId(101), AnswerId(1012), SourceType::FoundInText, None)
        .await
        .expect_err("server down");
    assert!(matches!(err, ClientError::Http { status: 503, .. }));
    assert_eq!(session.question(QuestionId(101)).expect("question"), &before);

    api.recover();
    session
        .answer_single(QuestionId(101), AnswerId(1012), SourceType::FoundInText, None)
        .await
        .expect("retry succeeds");
    assert_eq!(
        session
            .question(QuestionId(101))
            .expect("question")
            .current_response
            .as_ref()
            .map(|r| r.version),
        Some(2)
    );
}

#[tokio::test]
async fn invalid_payload_never_reaches_server() {
    let (api, mut session) = session_for(sample_checklist()).await;

    let err = session
        .answer_single(QuestionId(101), AnswerId(3011), SourceType::FoundInText, None)
        .await
        .expect_err("foreign answer");
    assert!(matches!(
        err,
        ClientError::Payload(PayloadError::UnknownAnswer { .. })
    ));

    let err = session
        .answer_text(QuestionId(101), "blue", SourceType::FoundInText, None)
        .await
        .expect_err("wrong type");
    assert!(matches!(
        err,
        ClientError::Payload(PayloadError::TypeMismatch { .. })
    ));

    assert!(session
        .question(QuestionId(101))
        .expect("question")
        .current_response
        .is_none());
    assert!(api.state.lock().expect("lock").saves.is_empty());
}

#[tokio::test]
async fn delete_failure_keeps_the_answer() {
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(103), 1);
    let (api, mut session) = session_for(checklist).await;

    api.fail_with(server_down());
    session
        .delete_response(QuestionId(103))
        .await
        .expect_err("server down");
    assert!(session
        .question(QuestionId(103))
        .expect("question")
        .current_response
        .is_some());

    let err = session
        .delete_response(QuestionId(101))
        .await
        .expect_err("nothing saved");
    assert!(matches!(err, ClientError::NothingToDelete(QuestionId(101))));
}

#[tokio::test]
async fn history_is_loaded_from_server() {
    let (_api, mut session) = session_for(sample_checklist()).await;
    for text in ["first", "second", "third"] {
        session
            .answer_text(QuestionId(103), text, SourceType::FoundInText, None)
            .await
            .expect("save");
    }

    let history = session
        .load_history(QuestionId(103))
        .await
        .expect("history");
    let versions: Vec<u32> = history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![2, 1]);
    assert_eq!(history[1].answer_text.as_deref(), Some("first"));
}

#[tokio::test]
async fn progress_tracks_saved_answers() {
    let (_api, mut session) = session_for(sample_checklist()).await;
    assert_eq!(session.progress().overall.percent(), 0);

    session
        .answer_single(QuestionId(301), AnswerId(3012), SourceType::Imagined, None)
        .await
        .expect("save");
    let progress = session.progress();
    assert_eq!(progress.overall.answered, 1);
    assert_eq!(progress.overall.percent(), 20);
}

#[tokio::test]
async fn cursor_is_restored_from_the_local_store() {
    let store = Storage::new("sqlite::memory:").await.expect("db");
    let api = FakeApi::new(sample_checklist());

    let mut first = ChecklistSession::load_with_store(
        api.clone(),
        store.clone(),
        "portrait",
        character(Gender::Male),
    )
    .await
    .expect("load");
    first.jump_to("B.1.1").await.expect("jump");
    drop(first);

    let second =
        ChecklistSession::load_with_store(api, store, "portrait", character(Gender::Male))
            .await
            .expect("reload");
    assert_eq!(
        second.current_question().map(|q| q.id),
        Some(QuestionId(302))
    );
}

#[tokio::test]
async fn unknown_checklist_fails_to_load() {
    let api = FakeApi::new(sample_checklist());
    let err = ChecklistSession::load(api, "missing", character(Gender::Male))
        .await
        .err()
        .expect("not found");
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}
