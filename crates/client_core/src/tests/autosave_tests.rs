use super::*;
use crate::test_fixtures::{answered, character, sample_checklist, FakeApi, CHARACTER};
use shared::{
    domain::{Gender, ResponseId},
    error::{ApiError, ErrorCode},
};

#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<TextEdit>>,
    fail: bool,
}

impl RecordingSink {
    fn failing() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    async fn texts(&self) -> Vec<(i64, String)> {
        self.saved
            .lock()
            .await
            .iter()
            .map(|edit| (edit.question_id.0, edit.text.clone()))
            .collect()
    }
}

#[async_trait]
impl AutosaveSink for RecordingSink {
    async fn save_text(&self, edit: TextEdit) -> ClientResult<()> {
        if self.fail {
            return Err(ClientError::Http {
                status: 502,
                error: ApiError::new(ErrorCode::Internal, "bad gateway"),
            });
        }
        self.saved.lock().await.push(edit);
        Ok(())
    }
}

fn edit(question: i64, text: &str) -> TextEdit {
    TextEdit {
        question_id: QuestionId(question),
        character_id: CHARACTER,
        text: text.to_string(),
        source_type: SourceType::FoundInText,
        comment: None,
    }
}

#[tokio::test(start_paused = true)]
async fn rapid_edits_collapse_into_one_save() {
    let sink = Arc::new(RecordingSink::default());
    let autosave = Autosave::spawn(sink.clone(), None, Duration::from_millis(800));

    autosave.edit(edit(103, "g")).expect("edit");
    tokio::time::sleep(Duration::from_millis(300)).await;
    autosave.edit(edit(103, "gr")).expect("edit");
    tokio::time::sleep(Duration::from_millis(300)).await;
    autosave.edit(edit(103, "grey")).expect("edit");
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(sink.texts().await.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.texts().await, vec![(103, "grey".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn questions_are_debounced_independently() {
    let sink = Arc::new(RecordingSink::default());
    let autosave = Autosave::spawn(sink.clone(), None, Duration::from_millis(500));

    autosave.edit(edit(1, "first")).expect("edit");
    tokio::time::sleep(Duration::from_millis(400)).await;
    autosave.edit(edit(2, "second")).expect("edit");
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.texts().await, vec![(1, "first".to_string())]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        sink.texts().await,
        vec![(1, "first".to_string()), (2, "second".to_string())]
    );
}

#[tokio::test(start_paused = true)]
async fn flush_and_shutdown_do_not_wait_for_the_window() {
    let sink = Arc::new(RecordingSink::default());
    let autosave = Autosave::spawn(sink.clone(), None, Duration::from_secs(60));

    autosave.edit(edit(1, "one")).expect("edit");
    autosave.flush().await.expect("flush");
    assert_eq!(sink.texts().await, vec![(1, "one".to_string())]);

    autosave.edit(edit(2, "two")).expect("edit");
    autosave.shutdown().await.expect("shutdown");
    assert_eq!(sink.texts().await.len(), 2);
}

#[tokio::test]
async fn draft_is_dropped_only_after_a_successful_save() {
    let store = Storage::new("sqlite::memory:").await.expect("db");

    let failing = Autosave::spawn(
        Arc::new(RecordingSink::failing()),
        Some(store.clone()),
        Duration::from_secs(60),
    );
    failing.edit(edit(103, "kept locally")).expect("edit");
    failing.shutdown().await.expect("shutdown");

    let drafts = store.list_drafts(CHARACTER).await.expect("drafts");
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].answer_text, "kept locally");

    let sink = Arc::new(RecordingSink::default());
    let working = Autosave::spawn(sink.clone(), Some(store.clone()), Duration::from_secs(60));
    working.edit(edit(103, "saved")).expect("edit");
    working.flush().await.expect("flush");

    assert_eq!(sink.texts().await, vec![(103, "saved".to_string())]);
    assert!(store.list_drafts(CHARACTER).await.expect("drafts").is_empty());
    working.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn session_can_be_the_sink() {
    let api = FakeApi::new(sample_checklist());
    let session = ChecklistSession::load(api.clone(), "portrait", character(Gender::Female))
        .await
        .expect("load");
    let session = Arc::new(Mutex::new(session));

    let autosave = Autosave::spawn(session.clone(), None, Duration::from_secs(60));
    autosave.edit(edit(103, "draft one")).expect("edit");
    autosave.edit(edit(103, "draft two")).expect("edit");
    autosave.shutdown().await.expect("shutdown");

    let session = session.lock().await;
    let current = session
        .question(QuestionId(103))
        .expect("question")
        .current_response
        .clone()
        .expect("saved");
    assert_eq!(current.answer_text.as_deref(), Some("draft two"));
    assert_eq!(api.state.lock().expect("lock").saves.len(), 1);
}

#[tokio::test]
async fn clearing_a_saved_text_deletes_it_and_keeps_no_draft() {
    let store = Storage::new("sqlite::memory:").await.expect("db");
    let mut checklist = sample_checklist();
    answered(&mut checklist, QuestionId(103), 1);
    let api = FakeApi::new(checklist);
    let session = ChecklistSession::load(api.clone(), "portrait", character(Gender::Male))
        .await
        .expect("load");
    let session = Arc::new(Mutex::new(session));

    let autosave = Autosave::spawn(session.clone(), Some(store.clone()), Duration::from_secs(60));
    autosave.edit(edit(103, "grey")).expect("edit");
    autosave.edit(edit(103, "   ")).expect("edit");
    autosave.shutdown().await.expect("shutdown");

    assert!(store.list_drafts(CHARACTER).await.expect("drafts").is_empty());
    let state = api.state.lock().expect("lock");
    assert!(state.saves.is_empty());
    assert_eq!(state.deletes, vec![ResponseId(10301)]);
    drop(state);

    let session = session.lock().await;
    let question = session.question(QuestionId(103)).expect("question");
    assert!(question.current_response.is_none());
}

#[tokio::test]
async fn blank_text_on_an_unanswered_question_is_dropped() {
    let store = Storage::new("sqlite::memory:").await.expect("db");
    let api = FakeApi::new(sample_checklist());
    let session = ChecklistSession::load(api.clone(), "portrait", character(Gender::Male))
        .await
        .expect("load");
    let session = Arc::new(Mutex::new(session));

    let autosave = Autosave::spawn(session.clone(), Some(store.clone()), Duration::from_secs(60));
    autosave.edit(edit(103, "   ")).expect("edit");
    autosave.shutdown().await.expect("shutdown");

    assert!(store.list_drafts(CHARACTER).await.expect("drafts").is_empty());
    let state = api.state.lock().expect("lock");
    assert!(state.saves.is_empty());
    assert!(state.deletes.is_empty());
}

#[tokio::test]
async fn edits_after_shutdown_are_rejected() {
    let autosave = Autosave::spawn(
        Arc::new(RecordingSink::default()),
        None,
        Duration::from_millis(10),
    );
    let commands = autosave.commands.clone();
    autosave.shutdown().await.expect("shutdown");
    assert!(commands.send(Command::Edit(edit(1, "late"))).is_err());
}
