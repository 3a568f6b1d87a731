use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ProjectId);
id_newtype!(TextId);
id_newtype!(CharacterId);
id_newtype!(SectionId);
id_newtype!(SubsectionId);
id_newtype!(QuestionGroupId);
id_newtype!(QuestionId);
id_newtype!(AnswerId);
id_newtype!(ResponseId);

impl ResponseId {
    /// Placeholder carried by an optimistic response until the server assigns an id.
    pub const UNSAVED: ResponseId = ResponseId(0);

    pub fn is_unsaved(self) -> bool {
        self == Self::UNSAVED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Single,
    Multiple,
    Text,
}

impl AnswerType {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerType::Single => "single",
            AnswerType::Multiple => "multiple",
            AnswerType::Text => "text",
        }
    }
}

/// Provenance of an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    FoundInText,
    LogicallyDerived,
    Imagined,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::FoundInText => "found_in_text",
            SourceType::LogicallyDerived => "logically_derived",
            SourceType::Imagined => "imagined",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "found_in_text" | "found" | "text" => Some(SourceType::FoundInText),
            "logically_derived" | "derived" | "logic" => Some(SourceType::LogicallyDerived),
            "imagined" | "imagination" => Some(SourceType::Imagined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectText {
    pub id: TextId,
    pub project_id: ProjectId,
    pub title: String,
    pub filename: String,
    pub status: TextStatus,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub text_id: TextId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub gender: Gender,
}

/// One selectable option of a choice question, with both grammatical forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub id: AnswerId,
    pub value_male: String,
    pub value_female: String,
    #[serde(default)]
    pub order_index: i32,
}

impl Answer {
    pub fn label_for(&self, gender: Gender) -> &str {
        let (preferred, fallback) = match gender {
            Gender::Female => (&self.value_female, &self.value_male),
            Gender::Male | Gender::Unknown => (&self.value_male, &self.value_female),
        };
        if preferred.trim().is_empty() {
            fallback
        } else {
            preferred
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub id: ResponseId,
    pub question_id: QuestionId,
    pub character_id: CharacterId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_id: Option<AnswerId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer_ids: Vec<AnswerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub version: u32,
    pub updated_at: DateTime<Utc>,
}

impl Response {
    /// A response counts towards progress only when it carries a value.
    pub fn has_value(&self) -> bool {
        self.answer_id.is_some()
            || !self.answer_ids.is_empty()
            || self
                .answer_text
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty())
    }
}
