use anyhow::{bail, Context, Result};
use client_core::{progress::Progress, Breadcrumb, Navigator};
use shared::{
    checklist::{Checklist, Question},
    domain::{Answer, AnswerId, AnswerType, Gender, Response},
};

/// Options in the order they are numbered on screen.
pub fn ordered_answers(question: &Question) -> Vec<&Answer> {
    let mut answers: Vec<_> = question.answers.iter().collect();
    answers.sort_by_key(|answer| answer.order_index);
    answers
}

/// Maps 1-based option numbers as printed by `show` to answer ids.
pub fn pick_answers(question: &Question, numbers: &[String]) -> Result<Vec<AnswerId>> {
    let answers = ordered_answers(question);
    numbers
        .iter()
        .map(|raw| -> Result<AnswerId> {
            let number: usize = raw
                .trim()
                .parse()
                .with_context(|| format!("'{raw}' is not an option number"))?;
            match number.checked_sub(1).and_then(|index| answers.get(index)) {
                Some(answer) => Ok(answer.id),
                None => bail!("option {number} does not exist (1..={})", answers.len()),
            }
        })
        .collect()
}

pub fn progress_line(progress: &Progress) -> String {
    format!(
        "{}/{} ({}%)",
        progress.answered,
        progress.total,
        progress.percent()
    )
}

pub fn question_block(
    question: &Question,
    breadcrumb: Option<&Breadcrumb>,
    navigator: &Navigator,
    gender: Gender,
) -> String {
    let mut lines = Vec::new();
    if let Some(crumb) = breadcrumb {
        lines.push(crumb.trail());
    }
    let counter = navigator
        .position()
        .map(|(index, len)| format!(" [{}/{}]", index + 1, len))
        .unwrap_or_default();
    let edge = match (navigator.is_first(), navigator.is_last()) {
        (true, false) => " (first)",
        (false, true) => " (last)",
        _ => "",
    };
    lines.push(format!(
        "{} {}{}{}",
        question.external_id, question.text, counter, edge
    ));

    if question.answer_type != AnswerType::Text {
        for (index, answer) in ordered_answers(question).into_iter().enumerate() {
            lines.push(format!("  {}. {}", index + 1, answer.label_for(gender)));
        }
    }

    match &question.current_response {
        Some(response) => lines.push(format!(
            "  answer: {}",
            response_summary(question, response, gender)
        )),
        None => lines.push("  answer: -".to_string()),
    }
    lines.join("\n")
}

/// One line per question in display order. `>` marks the cursor and `*` an
/// answered question.
pub fn outline(checklist: &Checklist, navigator: &Navigator) -> String {
    let current = navigator.current().map(|entry| entry.question_id);
    navigator
        .entries()
        .iter()
        .filter_map(|entry| {
            let question = checklist.question_at(entry.path)?;
            let cursor = if current == Some(entry.question_id) { '>' } else { ' ' };
            let answered = if question.current_response.is_some() { '*' } else { ' ' };
            Some(format!(
                "{cursor}{answered} {} {}",
                entry.external_id, question.text
            ))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn response_summary(question: &Question, response: &Response, gender: Gender) -> String {
    let label = |id: AnswerId| {
        question
            .answer(id)
            .map(|answer| answer.label_for(gender).to_string())
            .unwrap_or_else(|| format!("#{id}"))
    };
    let value = match question.answer_type {
        AnswerType::Single => response.answer_id.map(label).unwrap_or_default(),
        AnswerType::Multiple => response
            .answer_ids
            .iter()
            .map(|id| label(*id))
            .collect::<Vec<_>>()
            .join(", "),
        AnswerType::Text => response.answer_text.clone().unwrap_or_default(),
    };
    let mut summary = format!("{value} [{}] v{}", response.source_type.as_str(), response.version);
    if let Some(comment) = response.comment.as_deref().filter(|c| !c.trim().is_empty()) {
        summary.push_str(&format!(" ({comment})"));
    }
    summary
}
