//! Checklist tree: section → subsection → question group → question.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    Answer, AnswerId, AnswerType, QuestionGroupId, QuestionId, Response, SectionId, SubsectionId,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsection {
    pub id: SubsectionId,
    pub title: String,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub question_groups: Vec<QuestionGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionGroup {
    pub id: QuestionGroupId,
    pub title: String,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub external_id: String,
    pub text: String,
    pub answer_type: AnswerType,
    #[serde(default)]
    pub order_index: i32,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub current_response: Option<Response>,
    #[serde(default)]
    pub response_history: Vec<Response>,
}

/// Index path of a question inside the tree as delivered by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuestionPath {
    pub section: usize,
    pub subsection: usize,
    pub group: usize,
    pub question: usize,
}

/// Value half of a save request; the question decides which variant is legal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerPayload {
    Single { answer_id: AnswerId },
    Multiple { answer_ids: Vec<AnswerId> },
    Text { answer_text: String },
}

impl AnswerPayload {
    pub fn answer_type(&self) -> AnswerType {
        match self {
            AnswerPayload::Single { .. } => AnswerType::Single,
            AnswerPayload::Multiple { .. } => AnswerType::Multiple,
            AnswerPayload::Text { .. } => AnswerType::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("question {question} expects a {expected} answer, got {actual}")]
    TypeMismatch {
        question: QuestionId,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("answer {answer} is not an option of question {question}")]
    UnknownAnswer {
        question: QuestionId,
        answer: AnswerId,
    },
    #[error("question {0} needs at least one selected answer")]
    EmptySelection(QuestionId),
    #[error("question {0} needs a non-empty text answer")]
    BlankText(QuestionId),
}

impl Question {
    pub fn answer(&self, answer_id: AnswerId) -> Option<&Answer> {
        self.answers.iter().find(|answer| answer.id == answer_id)
    }

    pub fn is_answered(&self) -> bool {
        self.current_response
            .as_ref()
            .is_some_and(Response::has_value)
    }

    /// Checks a payload against this question and returns it in canonical
    /// form: multiple selections de-duplicated in option order, text trimmed.
    pub fn validate_payload(&self, payload: AnswerPayload) -> Result<AnswerPayload, PayloadError> {
        let actual = payload.answer_type();
        if actual != self.answer_type {
            return Err(PayloadError::TypeMismatch {
                question: self.id,
                expected: self.answer_type.as_str(),
                actual: actual.as_str(),
            });
        }

        match payload {
            AnswerPayload::Single { answer_id } => {
                self.ensure_option(answer_id)?;
                Ok(AnswerPayload::Single { answer_id })
            }
            AnswerPayload::Multiple { answer_ids } => {
                if answer_ids.is_empty() {
                    return Err(PayloadError::EmptySelection(self.id));
                }
                for answer_id in &answer_ids {
                    self.ensure_option(*answer_id)?;
                }
                let selected: HashSet<AnswerId> = answer_ids.into_iter().collect();
                let mut options: Vec<&Answer> = self.answers.iter().collect();
                options.sort_by_key(|answer| answer.order_index);
                let answer_ids = options
                    .into_iter()
                    .map(|answer| answer.id)
                    .filter(|id| selected.contains(id))
                    .collect();
                Ok(AnswerPayload::Multiple { answer_ids })
            }
            AnswerPayload::Text { answer_text } => {
                let trimmed = answer_text.trim();
                if trimmed.is_empty() {
                    return Err(PayloadError::BlankText(self.id));
                }
                Ok(AnswerPayload::Text {
                    answer_text: trimmed.to_string(),
                })
            }
        }
    }

    fn ensure_option(&self, answer_id: AnswerId) -> Result<(), PayloadError> {
        if self.answer(answer_id).is_none() {
            return Err(PayloadError::UnknownAnswer {
                question: self.id,
                answer: answer_id,
            });
        }
        Ok(())
    }
}

impl Checklist {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.sections.iter().flat_map(Section::questions)
    }

    pub fn question_count(&self) -> usize {
        self.questions().count()
    }

    pub fn path_of(&self, question_id: QuestionId) -> Option<QuestionPath> {
        for (si, section) in self.sections.iter().enumerate() {
            for (ssi, subsection) in section.subsections.iter().enumerate() {
                for (gi, group) in subsection.question_groups.iter().enumerate() {
                    for (qi, question) in group.questions.iter().enumerate() {
                        if question.id == question_id {
                            return Some(QuestionPath {
                                section: si,
                                subsection: ssi,
                                group: gi,
                                question: qi,
                            });
                        }
                    }
                }
            }
        }
        None
    }

    pub fn question(&self, question_id: QuestionId) -> Option<&Question> {
        self.questions().find(|question| question.id == question_id)
    }

    pub fn question_mut(&mut self, question_id: QuestionId) -> Option<&mut Question> {
        let path = self.path_of(question_id)?;
        self.question_at_mut(path)
    }

    pub fn question_at(&self, path: QuestionPath) -> Option<&Question> {
        self.sections
            .get(path.section)?
            .subsections
            .get(path.subsection)?
            .question_groups
            .get(path.group)?
            .questions
            .get(path.question)
    }

    pub fn question_at_mut(&mut self, path: QuestionPath) -> Option<&mut Question> {
        self.sections
            .get_mut(path.section)?
            .subsections
            .get_mut(path.subsection)?
            .question_groups
            .get_mut(path.group)?
            .questions
            .get_mut(path.question)
    }
}

impl Section {
    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.subsections
            .iter()
            .flat_map(|subsection| subsection.question_groups.iter())
            .flat_map(|group| group.questions.iter())
    }
}

#[cfg(test)]
#[path = "tests/checklist_tests.rs"]
mod tests;
