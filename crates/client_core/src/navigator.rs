//! Linear walk over a checklist tree.
//!
//! Every level is sorted by `order_index` (stable, so ties keep server order)
//! and flattened depth-first. Entries keep their path into the tree as the
//! server delivered it, so the tree itself is never reordered.

use shared::{
    checklist::{Checklist, QuestionPath},
    domain::QuestionId,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavEntry {
    pub question_id: QuestionId,
    pub external_id: String,
    pub path: QuestionPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breadcrumb {
    pub section: String,
    pub subsection: String,
    pub group: String,
    pub question: String,
}

impl Breadcrumb {
    pub fn trail(&self) -> String {
        format!("{} › {} › {}", self.section, self.subsection, self.group)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Navigator {
    entries: Vec<NavEntry>,
    cursor: usize,
}

impl Navigator {
    pub fn from_checklist(checklist: &Checklist) -> Self {
        let mut entries = Vec::with_capacity(checklist.question_count());
        for si in sorted_by_order(&checklist.sections, |s| s.order_index) {
            let section = &checklist.sections[si];
            for ssi in sorted_by_order(&section.subsections, |s| s.order_index) {
                let subsection = &section.subsections[ssi];
                for gi in sorted_by_order(&subsection.question_groups, |g| g.order_index) {
                    let group = &subsection.question_groups[gi];
                    for qi in sorted_by_order(&group.questions, |q| q.order_index) {
                        let question = &group.questions[qi];
                        entries.push(NavEntry {
                            question_id: question.id,
                            external_id: question.external_id.clone(),
                            path: QuestionPath {
                                section: si,
                                subsection: ssi,
                                group: gi,
                                question: qi,
                            },
                        });
                    }
                }
            }
        }
        Self { entries, cursor: 0 }
    }

    pub fn entries(&self) -> &[NavEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Zero-based cursor and total count; `None` for an empty checklist.
    pub fn position(&self) -> Option<(usize, usize)> {
        if self.entries.is_empty() {
            None
        } else {
            Some((self.cursor, self.entries.len()))
        }
    }

    pub fn current(&self) -> Option<&NavEntry> {
        self.entries.get(self.cursor)
    }

    pub fn is_first(&self) -> bool {
        self.cursor == 0
    }

    pub fn is_last(&self) -> bool {
        self.cursor + 1 >= self.entries.len()
    }

    /// Moves to the next question. At the end the cursor stays put.
    pub fn advance(&mut self) -> Option<&NavEntry> {
        if self.cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    /// Moves to the previous question. At the start the cursor stays put.
    pub fn retreat(&mut self) -> Option<&NavEntry> {
        if self.cursor == 0 || self.entries.is_empty() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    pub fn jump_to_external(&mut self, external_id: &str) -> Option<&NavEntry> {
        let wanted = external_id.trim();
        let index = self
            .entries
            .iter()
            .position(|entry| entry.external_id.trim().eq_ignore_ascii_case(wanted))?;
        self.cursor = index;
        self.entries.get(index)
    }

    pub fn jump_to_question(&mut self, question_id: QuestionId) -> Option<&NavEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.question_id == question_id)?;
        self.cursor = index;
        self.entries.get(index)
    }

    pub fn breadcrumb(&self, checklist: &Checklist) -> Option<Breadcrumb> {
        let path = self.current()?.path;
        let section = checklist.sections.get(path.section)?;
        let subsection = section.subsections.get(path.subsection)?;
        let group = subsection.question_groups.get(path.group)?;
        let question = group.questions.get(path.question)?;
        Some(Breadcrumb {
            section: section.title.clone(),
            subsection: subsection.title.clone(),
            group: group.title.clone(),
            question: question.text.clone(),
        })
    }
}

fn sorted_by_order<T>(items: &[T], order: impl Fn(&T) -> i32) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..items.len()).collect();
    indices.sort_by_key(|&index| order(&items[index]));
    indices
}

#[cfg(test)]
#[path = "tests/navigator_tests.rs"]
mod tests;
