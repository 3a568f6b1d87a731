use shared::{checklist::Checklist, domain::SectionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
}

impl Progress {
    /// Rounded half up; an empty checklist reports 0.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let answered = self.answered.min(self.total);
        let rounded = (answered * 200 + self.total) / (self.total * 2);
        rounded as u8
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.answered >= self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionProgress {
    pub section_id: SectionId,
    pub title: String,
    pub progress: Progress,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChecklistProgress {
    pub overall: Progress,
    pub sections: Vec<SectionProgress>,
}

pub fn checklist_progress(checklist: &Checklist) -> ChecklistProgress {
    let mut sections: Vec<_> = checklist.sections.iter().collect();
    sections.sort_by_key(|section| section.order_index);

    let mut overall = Progress::default();
    let sections = sections
        .into_iter()
        .map(|section| {
            let mut progress = Progress::default();
            for question in section.questions() {
                progress.total += 1;
                if question.is_answered() {
                    progress.answered += 1;
                }
            }
            overall.total += progress.total;
            overall.answered += progress.answered;
            SectionProgress {
                section_id: section.id,
                title: section.title.clone(),
                progress,
            }
        })
        .collect();

    ChecklistProgress { overall, sections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{answered, sample_checklist};
    use shared::domain::QuestionId;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Progress { answered: 1, total: 3 }.percent(), 33);
        assert_eq!(Progress { answered: 2, total: 3 }.percent(), 67);
        assert_eq!(Progress { answered: 1, total: 8 }.percent(), 13);
        assert_eq!(Progress { answered: 0, total: 0 }.percent(), 0);
        assert_eq!(Progress { answered: 4, total: 4 }.percent(), 100);
    }

    #[test]
    fn counts_answers_per_section_in_display_order() {
        let mut checklist = sample_checklist();
        answered(&mut checklist, QuestionId(101), 1);
        answered(&mut checklist, QuestionId(301), 2);

        let progress = checklist_progress(&checklist);
        assert_eq!(progress.overall, Progress { answered: 2, total: 5 });
        assert_eq!(progress.overall.percent(), 40);

        let titles: Vec<_> = progress.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Appearance", "Inner world"]);
        assert_eq!(progress.sections[0].progress, Progress { answered: 1, total: 3 });
        assert_eq!(progress.sections[1].progress.remaining(), 1);
        assert!(!progress.overall.is_complete());
    }

    #[test]
    fn blank_text_response_does_not_count() {
        let mut checklist = sample_checklist();
        answered(&mut checklist, QuestionId(103), 1);
        if let Some(question) = checklist.question_mut(QuestionId(103)) {
            if let Some(response) = question.current_response.as_mut() {
                response.answer_text = Some("   ".into());
            }
        }
        assert_eq!(checklist_progress(&checklist).overall.answered, 0);
    }
}
