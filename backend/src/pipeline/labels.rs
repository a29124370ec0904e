use shared::Label;

use super::error::PipelineError;

/// Fixed index -> label mapping. Built once at startup, never mutated.
#[derive(Debug, Clone)]
pub struct LabelRegistry {
    labels: Vec<Label>,
}

impl LabelRegistry {
    pub fn new(labels: Vec<Label>) -> Self {
        Self { labels }
    }

    pub fn resolve(&self, index: usize) -> Result<&Label, PipelineError> {
        self.labels.get(index).ok_or(PipelineError::UnknownLabel {
            index,
            count: self.labels.len(),
        })
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }
}

/// Index of the highest score; ties go to the first occurrence. NaN never wins.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}
