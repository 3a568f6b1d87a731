//! Debounced saving of free-text answers.
//!
//! Edits go to a background task that keeps the latest text per question and
//! flushes it once the question has been quiet for the debounce window. Each
//! edit is also written to the local draft table, and the draft is removed
//! after the save goes through. A blank edit clears the answer and is never
//! kept as a draft.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{CharacterId, QuestionId, SourceType};
use storage::{Storage, TextDraft};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, warn};

use crate::{
    error::{ClientError, ClientResult},
    session::ChecklistSession,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub question_id: QuestionId,
    pub character_id: CharacterId,
    pub text: String,
    pub source_type: SourceType,
    pub comment: Option<String>,
}

impl TextEdit {
    fn key(&self) -> (QuestionId, CharacterId) {
        (self.question_id, self.character_id)
    }

    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn to_draft(&self) -> TextDraft {
        TextDraft {
            question_id: self.question_id,
            character_id: self.character_id,
            answer_text: self.text.clone(),
            source_type: self.source_type,
            comment: self.comment.clone(),
            updated_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AutosaveSink: Send + Sync {
    async fn save_text(&self, edit: TextEdit) -> ClientResult<()>;
}

#[async_trait]
impl AutosaveSink for Mutex<ChecklistSession> {
    async fn save_text(&self, edit: TextEdit) -> ClientResult<()> {
        let mut session = self.lock().await;
        session
            .edit_text(edit.question_id, &edit.text, edit.source_type, edit.comment)
            .await
            .map(|_| ())
    }
}

enum Command {
    Edit(TextEdit),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

pub struct Autosave {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl Autosave {
    pub fn spawn(sink: Arc<dyn AutosaveSink>, drafts: Option<Storage>, debounce: Duration) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, sink, drafts, debounce));
        Self { commands, task }
    }

    pub fn edit(&self, edit: TextEdit) -> ClientResult<()> {
        self.commands
            .send(Command::Edit(edit))
            .map_err(|_| ClientError::AutosaveClosed)
    }

    /// Saves everything pending without waiting for the debounce window.
    pub async fn flush(&self) -> ClientResult<()> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::Flush(done))
            .map_err(|_| ClientError::AutosaveClosed)?;
        wait.await.map_err(|_| ClientError::AutosaveClosed)
    }

    pub async fn shutdown(self) -> ClientResult<()> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(done))
            .map_err(|_| ClientError::AutosaveClosed)?;
        wait.await.map_err(|_| ClientError::AutosaveClosed)?;
        self.task
            .await
            .map_err(|_| ClientError::AutosaveClosed)
    }
}

struct Pending {
    edit: TextEdit,
    due: Instant,
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Command>,
    sink: Arc<dyn AutosaveSink>,
    drafts: Option<Storage>,
    debounce: Duration,
) {
    let mut pending: HashMap<(QuestionId, CharacterId), Pending> = HashMap::new();

    loop {
        let next_due = pending.values().map(|p| p.due).min();
        let wake = async {
            match next_due {
                Some(due) => sleep_until(due).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Edit(edit)) => {
                    if let Some(store) = &drafts {
                        let stored = if edit.is_blank() {
                            store
                                .remove_draft(edit.question_id, edit.character_id)
                                .await
                                .map(|_| ())
                        } else {
                            store.upsert_draft(&edit.to_draft()).await
                        };
                        if let Err(err) = stored {
                            warn!("autosave: failed to store draft question={} error={err:#}", edit.question_id);
                        }
                    }
                    debug!("autosave: edit queued question={}", edit.question_id);
                    pending.insert(edit.key(), Pending { edit, due: Instant::now() + debounce });
                }
                Some(Command::Flush(done)) => {
                    save_all(&mut pending, sink.as_ref(), drafts.as_ref()).await;
                    let _ = done.send(());
                }
                Some(Command::Shutdown(done)) => {
                    save_all(&mut pending, sink.as_ref(), drafts.as_ref()).await;
                    let _ = done.send(());
                    break;
                }
                None => {
                    save_all(&mut pending, sink.as_ref(), drafts.as_ref()).await;
                    break;
                }
            },
            _ = wake => {
                let now = Instant::now();
                let due: Vec<_> = pending
                    .iter()
                    .filter(|(_, p)| p.due <= now)
                    .map(|(key, _)| *key)
                    .collect();
                for key in due {
                    if let Some(entry) = pending.remove(&key) {
                        save_one(entry.edit, sink.as_ref(), drafts.as_ref()).await;
                    }
                }
            }
        }
    }
}

async fn save_all(
    pending: &mut HashMap<(QuestionId, CharacterId), Pending>,
    sink: &dyn AutosaveSink,
    drafts: Option<&Storage>,
) {
    let mut edits: Vec<_> = pending.drain().map(|(_, p)| p).collect();
    edits.sort_by_key(|p| p.due);
    for entry in edits {
        save_one(entry.edit, sink, drafts).await;
    }
}

/// A failed save leaves the draft in place for a later sync.
async fn save_one(edit: TextEdit, sink: &dyn AutosaveSink, drafts: Option<&Storage>) {
    let (question_id, character_id) = edit.key();
    match sink.save_text(edit).await {
        Ok(()) => {
            debug!("autosave: saved question={question_id}");
            if let Some(store) = drafts {
                if let Err(err) = store.remove_draft(question_id, character_id).await {
                    warn!("autosave: failed to drop draft question={question_id} error={err:#}");
                }
            }
        }
        Err(err) => {
            warn!("autosave: save failed question={question_id} error={err}");
        }
    }
}

#[cfg(test)]
#[path = "tests/autosave_tests.rs"]
mod tests;
