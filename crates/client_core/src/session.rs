use std::sync::Arc;

use shared::{
    checklist::{AnswerPayload, Checklist, Question},
    domain::{Answer, AnswerId, Character, CharacterId, QuestionId, Response, SourceType},
    protocol::{ReplaceAnswersRequest, SaveResponseRequest},
};
use storage::Storage;
use tracing::{info, warn};

use crate::{
    error::{ClientError, ClientResult},
    navigator::{Breadcrumb, Navigator},
    progress::{checklist_progress, ChecklistProgress},
    reconcile::{apply_to_question, clear_response, merge_history, optimistic_response, ReconcileOutcome},
    ChecklistApi,
};

/// One checklist being filled in for one character.
pub struct ChecklistSession {
    api: Arc<dyn ChecklistApi>,
    store: Option<Storage>,
    character: Character,
    checklist: Checklist,
    navigator: Navigator,
}

enum Outbound {
    Save(SaveResponseRequest),
    Replace(ReplaceAnswersRequest),
}

impl ChecklistSession {
    pub async fn load(
        api: Arc<dyn ChecklistApi>,
        slug: &str,
        character: Character,
    ) -> ClientResult<Self> {
        let checklist = api.fetch_checklist(slug, character.id).await?;
        let navigator = Navigator::from_checklist(&checklist);
        info!(
            "checklist: loaded slug={} character={} questions={}",
            checklist.slug,
            character.id,
            navigator.len()
        );
        Ok(Self {
            api,
            store: None,
            character,
            checklist,
            navigator,
        })
    }

    /// Like [`ChecklistSession::load`], and restores the cursor saved by the
    /// previous session for this checklist and character.
    pub async fn load_with_store(
        api: Arc<dyn ChecklistApi>,
        store: Storage,
        slug: &str,
        character: Character,
    ) -> ClientResult<Self> {
        let mut session = Self::load(api, slug, character).await?;
        if let Some(question_id) = store.load_cursor(slug, session.character.id).await? {
            if session.navigator.jump_to_question(question_id).is_none() {
                warn!("checklist: saved cursor question={question_id} no longer exists slug={slug}");
            }
        }
        session.store = Some(store);
        Ok(session)
    }

    pub fn checklist(&self) -> &Checklist {
        &self.checklist
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn current_question(&self) -> Option<&Question> {
        let entry = self.navigator.current()?;
        self.checklist.question_at(entry.path)
    }

    pub fn question(&self, question_id: QuestionId) -> ClientResult<&Question> {
        self.checklist
            .question(question_id)
            .ok_or(ClientError::UnknownQuestion(question_id))
    }

    pub async fn next_question(&mut self) -> Option<&Question> {
        self.navigator.advance()?;
        self.persist_cursor().await;
        self.current_question()
    }

    pub async fn previous_question(&mut self) -> Option<&Question> {
        self.navigator.retreat()?;
        self.persist_cursor().await;
        self.current_question()
    }

    pub async fn jump_to(&mut self, external_id: &str) -> ClientResult<&Question> {
        if self.navigator.jump_to_external(external_id).is_none() {
            return Err(ClientError::UnknownExternalId(external_id.trim().to_string()));
        }
        self.persist_cursor().await;
        let entry = self
            .navigator
            .current()
            .ok_or_else(|| ClientError::UnknownExternalId(external_id.to_string()))?;
        let question_id = entry.question_id;
        self.question(question_id)
    }

    pub fn breadcrumb(&self) -> Option<Breadcrumb> {
        self.navigator.breadcrumb(&self.checklist)
    }

    pub fn progress(&self) -> ChecklistProgress {
        checklist_progress(&self.checklist)
    }

    pub fn label_for<'a>(&self, answer: &'a Answer) -> &'a str {
        answer.label_for(self.character.gender)
    }

    pub async fn answer_single(
        &mut self,
        question_id: QuestionId,
        answer_id: AnswerId,
        source_type: SourceType,
        comment: Option<String>,
    ) -> ClientResult<ReconcileOutcome> {
        self.save(
            question_id,
            AnswerPayload::Single { answer_id },
            source_type,
            comment,
        )
        .await
    }

    /// Replaces the whole selection. An empty selection clears the question
    /// and returns `None`.
    pub async fn answer_multiple(
        &mut self,
        question_id: QuestionId,
        answer_ids: Vec<AnswerId>,
        source_type: SourceType,
        comment: Option<String>,
    ) -> ClientResult<Option<ReconcileOutcome>> {
        if answer_ids.is_empty() {
            self.clear_if_saved(question_id).await?;
            return Ok(None);
        }
        self.save(
            question_id,
            AnswerPayload::Multiple { answer_ids },
            source_type,
            comment,
        )
        .await
        .map(Some)
    }

    pub async fn answer_text(
        &mut self,
        question_id: QuestionId,
        answer_text: &str,
        source_type: SourceType,
        comment: Option<String>,
    ) -> ClientResult<ReconcileOutcome> {
        self.save(
            question_id,
            AnswerPayload::Text {
                answer_text: answer_text.to_string(),
            },
            source_type,
            comment,
        )
        .await
    }

    /// Applies the content of a text field as typed. A blank field clears a
    /// saved answer and is otherwise a no-op, returning `None` either way.
    pub async fn edit_text(
        &mut self,
        question_id: QuestionId,
        answer_text: &str,
        source_type: SourceType,
        comment: Option<String>,
    ) -> ClientResult<Option<ReconcileOutcome>> {
        if answer_text.trim().is_empty() {
            self.clear_if_saved(question_id).await?;
            return Ok(None);
        }
        self.answer_text(question_id, answer_text, source_type, comment)
            .await
            .map(Some)
    }

    /// Validates, applies an optimistic placeholder, sends, and then either
    /// patches in the server's canonical response or restores the question.
    pub async fn save(
        &mut self,
        question_id: QuestionId,
        payload: AnswerPayload,
        source_type: SourceType,
        comment: Option<String>,
    ) -> ClientResult<ReconcileOutcome> {
        let character_id = self.character.id;
        let question = self.question(question_id)?;
        let payload = question.validate_payload(payload)?;
        let snapshot = question.clone();
        let placeholder =
            optimistic_response(question, character_id, &payload, source_type, comment.clone());
        let outbound = outbound(question_id, character_id, payload, source_type, comment);

        let outcome = apply_to_question(self.question_mut(question_id)?, placeholder);

        let result = match outbound {
            Outbound::Save(request) => self.api.save_response(request).await,
            Outbound::Replace(request) => {
                self.api
                    .replace_answers(question_id, character_id, request)
                    .await
            }
        };

        let question = self.question_mut(question_id)?;
        match result {
            Ok(saved) => {
                let version = saved.version;
                apply_to_question(question, saved);
                info!(
                    "checklist: saved question={question_id} character={character_id} version={version}"
                );
                self.api
                    .remember_checklist(character_id, &self.checklist)
                    .await;
                Ok(outcome)
            }
            Err(err) => {
                *question = snapshot;
                warn!("checklist: save failed question={question_id} character={character_id} error={err}");
                Err(err)
            }
        }
    }

    /// Clears the current answer; the server keeps it in history.
    pub async fn delete_response(&mut self, question_id: QuestionId) -> ClientResult<Response> {
        let character_id = self.character.id;
        let question = self.question_mut(question_id)?;
        let response_id = match &question.current_response {
            Some(current) if !current.id.is_unsaved() => current.id,
            _ => return Err(ClientError::NothingToDelete(question_id)),
        };
        let snapshot = question.clone();
        let cleared = clear_response(question).ok_or(ClientError::NothingToDelete(question_id))?;

        if let Err(err) = self.api.delete_response(response_id, character_id).await {
            *self.question_mut(question_id)? = snapshot;
            warn!("checklist: delete failed question={question_id} response={response_id} error={err}");
            return Err(err);
        }
        info!("checklist: cleared question={question_id} response={response_id}");
        self.api
            .remember_checklist(character_id, &self.checklist)
            .await;
        Ok(cleared)
    }

    pub async fn load_history(&mut self, question_id: QuestionId) -> ClientResult<&[Response]> {
        let history = self
            .api
            .response_history(question_id, self.character.id)
            .await?;
        merge_history(self.question_mut(question_id)?, history);
        self.api
            .remember_checklist(self.character.id, &self.checklist)
            .await;
        Ok(&self.question(question_id)?.response_history)
    }

    async fn clear_if_saved(&mut self, question_id: QuestionId) -> ClientResult<()> {
        let has_saved = self
            .question(question_id)?
            .current_response
            .as_ref()
            .is_some_and(|response| !response.id.is_unsaved());
        if has_saved {
            self.delete_response(question_id).await?;
        }
        Ok(())
    }

    fn question_mut(&mut self, question_id: QuestionId) -> ClientResult<&mut Question> {
        self.checklist
            .question_mut(question_id)
            .ok_or(ClientError::UnknownQuestion(question_id))
    }

    async fn persist_cursor(&self) {
        let (Some(store), Some(entry)) = (&self.store, self.navigator.current()) else {
            return;
        };
        if let Err(err) = store
            .save_cursor(&self.checklist.slug, self.character.id, entry.question_id)
            .await
        {
            warn!("checklist: failed to persist cursor error={err:#}");
        }
    }
}

fn outbound(
    question_id: QuestionId,
    character_id: CharacterId,
    payload: AnswerPayload,
    source_type: SourceType,
    comment: Option<String>,
) -> Outbound {
    match payload {
        AnswerPayload::Multiple { answer_ids } => Outbound::Replace(ReplaceAnswersRequest {
            answer_ids,
            source_type,
            comment,
        }),
        AnswerPayload::Single { answer_id } => Outbound::Save(SaveResponseRequest {
            question_id,
            character_id,
            answer_id: Some(answer_id),
            answer_text: None,
            source_type,
            comment,
        }),
        AnswerPayload::Text { answer_text } => Outbound::Save(SaveResponseRequest {
            question_id,
            character_id,
            answer_id: None,
            answer_text: Some(answer_text),
            source_type,
            comment,
        }),
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
